//! Block graph data model
//!
//! A [`Program`] is what the editor hands to the compiler: an ordered list of
//! chains plus the user-defined blockdefs referenced by `define_block` chains.
//! Programs are stored as JSON:
//!
//! ```text
//! { "chains":    [ { "blocks": [ { "id": "print", "args": [ { "text": "hi" } ] } ] } ],
//!   "blockdefs": [ { "id": "add", "inputs": [ { "text": "add" }, { "arg": "add_a" } ] } ] }
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading a program file
#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid program file: {0}")]
    Json(#[from] serde_json::Error),
}

/// A whole program
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub chains: Vec<Chain>,
    #[serde(default)]
    pub blockdefs: Vec<Blockdef>,
}

impl Program {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a program from its JSON form
    pub fn from_json(text: &str) -> Result<Self, ProgramError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load a program file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProgramError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ProgramError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String, ProgramError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    #[must_use]
    pub fn chain(mut self, chain: Chain) -> Self {
        self.chains.push(chain);
        self
    }

    #[must_use]
    pub fn blockdef(mut self, blockdef: Blockdef) -> Self {
        self.blockdefs.push(blockdef);
        self
    }

    /// Look up a user-defined blockdef by id
    #[must_use]
    pub fn find_blockdef(&self, id: &str) -> Option<&Blockdef> {
        self.blockdefs.iter().find(|def| def.id == id)
    }
}

/// An ordered sequence of blocks anchored by a hat block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    pub blocks: Vec<Block>,
}

impl Chain {
    #[must_use]
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    /// `on_start` followed by `body`
    #[must_use]
    pub fn on_start(body: Vec<Block>) -> Self {
        let mut blocks = vec![Block::new("on_start")];
        blocks.extend(body);
        Self { blocks }
    }

    /// `define_block` for `blockdef_id` followed by `body`
    #[must_use]
    pub fn define(blockdef_id: impl Into<String>, body: Vec<Block>) -> Self {
        let mut blocks = vec![Block::new("define_block").blockdef(blockdef_id)];
        blocks.extend(body);
        Self { blocks }
    }

    #[must_use]
    pub fn head(&self) -> Option<&Block> {
        self.blocks.first()
    }
}

/// One block instance: a blockdef id and its filled arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    #[serde(default)]
    pub args: Vec<Argument>,
}

impl Block {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: Argument) -> Self {
        self.args.push(arg);
        self
    }

    /// Append a free-text argument
    #[must_use]
    pub fn text(self, text: impl Into<String>) -> Self {
        self.arg(Argument::Text(text.into()))
    }

    /// Append a constant (dropdown) argument
    #[must_use]
    pub fn constant(self, text: impl Into<String>) -> Self {
        self.arg(Argument::Const(text.into()))
    }

    /// Append a nested block argument
    #[must_use]
    pub fn block(self, block: Block) -> Self {
        self.arg(Argument::Block(block))
    }

    #[must_use]
    pub fn blockdef(self, id: impl Into<String>) -> Self {
        self.arg(Argument::Blockdef(id.into()))
    }

    #[must_use]
    pub fn color(self, color: impl Into<String>) -> Self {
        self.arg(Argument::Color(color.into()))
    }
}

/// One filled slot of a block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Argument {
    Text(String),
    #[serde(rename = "const")]
    Const(String),
    Block(Block),
    Blockdef(String),
    /// `#rrggbb` or `#rrggbbaa`
    Color(String),
}

/// Template of a user-defined block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blockdef {
    pub id: String,
    #[serde(default)]
    pub inputs: Vec<Input>,
}

impl Blockdef {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            inputs: Vec::new(),
        }
    }

    /// Append a label
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.inputs.push(Input::Text(text.into()));
        self
    }

    /// Append a parameter slot; `param_id` is the id of its `arg` block
    #[must_use]
    pub fn arg(mut self, param_id: impl Into<String>) -> Self {
        self.inputs.push(Input::Arg(param_id.into()));
        self
    }

    /// Parameter block ids in declaration order
    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().filter_map(|input| match input {
            Input::Arg(id) => Some(id.as_str()),
            Input::Text(_) => None,
        })
    }
}

/// One input descriptor of a user-defined blockdef
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Input {
    Text(String),
    Arg(String),
}

/// Location of a block: chain index plus the argument path below the chain block
///
/// `path[0]` is the block's index in its chain, each further entry is the
/// argument index of a nested block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockRef {
    pub chain: usize,
    pub path: Vec<usize>,
}

impl BlockRef {
    #[must_use]
    pub fn new(chain: usize, index: usize) -> Self {
        Self {
            chain,
            path: vec![index],
        }
    }

    /// Reference to the block nested in argument `arg`
    #[must_use]
    pub fn child(&self, arg: usize) -> Self {
        let mut path = self.path.clone();
        path.push(arg);
        Self {
            chain: self.chain,
            path,
        }
    }

    /// True for blocks nested inside another block's argument
    #[must_use]
    pub fn has_parent(&self) -> bool {
        self.path.len() > 1
    }

    /// Resolve the reference against a program
    #[must_use]
    pub fn resolve<'p>(&self, program: &'p Program) -> Option<&'p Block> {
        let chain = program.chains.get(self.chain)?;
        let (first, rest) = self.path.split_first()?;
        let mut block = chain.blocks.get(*first)?;
        for index in rest {
            match block.args.get(*index)? {
                Argument::Block(inner) => block = inner,
                _ => return None,
            }
        }
        Some(block)
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chain {}", self.chain)?;
        if let Some((first, rest)) = self.path.split_first() {
            write!(f, ", block {}", first)?;
            for index in rest {
                write!(f, " > arg {}", index)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"{
        "chains": [
            { "blocks": [
                { "id": "on_start" },
                { "id": "print", "args": [ { "block": {
                    "id": "plus", "args": [ { "text": "1" }, { "text": "2" } ]
                } } ] },
                { "id": "set_fg_color", "args": [ { "color": "#ff0000ff" } ] },
                { "id": "math", "args": [ { "const": "sqrt" }, { "text": "4" } ] }
            ] },
            { "blocks": [
                { "id": "define_block", "args": [ { "blockdef": "twice" } ] },
                { "id": "return", "args": [ { "block": { "id": "twice_x" } } ] }
            ] }
        ],
        "blockdefs": [ { "id": "twice", "inputs": [ { "text": "twice" }, { "arg": "twice_x" } ] } ]
    }"##;

    #[test]
    fn parses_json_form() {
        let program = Program::from_json(SAMPLE).unwrap();
        assert_eq!(program.chains.len(), 2);
        assert_eq!(program.chains[0].blocks[1].id, "print");
        assert_eq!(
            program.chains[0].blocks[2].args[0],
            Argument::Color("#ff0000ff".to_string())
        );
        assert_eq!(program.chains[0].blocks[3].args[0], Argument::Const("sqrt".to_string()));

        let def = program.find_blockdef("twice").unwrap();
        assert_eq!(def.params().collect::<Vec<_>>(), vec!["twice_x"]);
    }

    #[test]
    fn builders_match_json() {
        let built = Program::new()
            .chain(Chain::on_start(vec![
                Block::new("print").block(Block::new("plus").text("1").text("2")),
                Block::new("set_fg_color").color("#ff0000ff"),
                Block::new("math").constant("sqrt").text("4"),
            ]))
            .chain(Chain::define("twice", vec![Block::new("return").block(Block::new("twice_x"))]))
            .blockdef(Blockdef::new("twice").text("twice").arg("twice_x"));

        assert_eq!(built, Program::from_json(SAMPLE).unwrap());
        let reparsed = Program::from_json(&built.to_json().unwrap()).unwrap();
        assert_eq!(reparsed, built);
    }

    #[test]
    fn block_refs_resolve_nested_arguments() {
        let program = Program::from_json(SAMPLE).unwrap();
        let print = BlockRef::new(0, 1);
        assert!(!print.has_parent());
        assert_eq!(print.resolve(&program).unwrap().id, "print");

        let plus = print.child(0);
        assert!(plus.has_parent());
        assert_eq!(plus.resolve(&program).unwrap().id, "plus");
        assert_eq!(plus.to_string(), "chain 0, block 1 > arg 0");
        assert!(plus.child(0).resolve(&program).is_none());
    }

    #[test]
    fn load_reports_missing_file_and_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(Program::load(&missing), Err(ProgramError::Io { .. })));

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{ \"chains\": [ { \"blocks\": 3 } ] }").unwrap();
        assert!(matches!(Program::load(&bad), Err(ProgramError::Json(_))));
    }
}
