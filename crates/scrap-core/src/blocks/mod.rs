//! Built-in block catalog
//!
//! Every built-in block id maps to a [`BlockSpec`]: how the chain walker
//! treats it, how many arguments it needs, and the generation callback that
//! lowers it. User-defined blocks are not registered here; the compiler
//! resolves them from the program's `define_block` chains.

mod control;
mod data;
mod logic;
mod math;
mod misc;
mod term;
mod text;

use std::collections::HashMap;

use cranelift_module::Module;

use crate::compiler::{BlockOutput, Codegen, CompileResult, ControlState, FuncArg};

/// How a block takes part in chain structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    /// Plain statement or value
    Normal,
    /// Opens a scope closed by `end`
    Control,
    /// Closes the previous scope and opens its own
    ControlEnd,
    /// Closes the innermost scope
    End,
    /// Starts a chain
    Hat,
}

/// Lowers one block
///
/// `argv` holds the evaluated arguments, preceded by the result of the
/// previous scope for CONTROLEND blocks. During `End` it holds only that
/// leading value, if any.
pub type BlockCallback<M> =
    fn(&mut Codegen<'_, M>, &[FuncArg], ControlState) -> CompileResult<BlockOutput>;

pub struct BlockSpec<M: Module> {
    pub ty: BlockType,
    pub min_args: usize,
    pub callback: BlockCallback<M>,
}

/// Block id to generation callback
pub struct Registry<M: Module> {
    blocks: HashMap<&'static str, BlockSpec<M>>,
}

impl<M: Module> Default for Registry<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Module> Registry<M> {
    /// An empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            blocks: HashMap::new(),
        }
    }

    /// Registry holding every built-in block
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        control::register(&mut registry);
        term::register(&mut registry);
        math::register(&mut registry);
        logic::register(&mut registry);
        misc::register(&mut registry);
        data::register(&mut registry);
        text::register(&mut registry);
        registry
    }

    pub fn register(
        &mut self,
        id: &'static str,
        ty: BlockType,
        min_args: usize,
        callback: BlockCallback<M>,
    ) {
        self.blocks.insert(
            id,
            BlockSpec {
                ty,
                min_args,
                callback,
            },
        );
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&BlockSpec<M>> {
        self.blocks.get(id)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Value of the first argument, or nothing
fn first(argv: &[FuncArg]) -> FuncArg {
    argv.first().cloned().unwrap_or(FuncArg::Nothing)
}

fn value(arg: FuncArg) -> CompileResult<BlockOutput> {
    Ok(BlockOutput::Value(arg))
}

#[cfg(test)]
mod tests {
    use cranelift_object::ObjectModule;

    use super::*;

    const CATALOG: &[&str] = &[
        "on_start", "define_block", "end", "if", "loop", "repeat", "while", "do_nothing",
        "else_if", "else", "return", "print", "println", "input", "get_char", "set_fg_color",
        "set_bg_color", "reset_color", "term_clear", "term_set_clear", "set_cursor", "cursor_x",
        "cursor_y", "cursor_max_x", "cursor_max_y", "plus",
        "minus", "mult", "div", "rem", "pow", "math", "pi", "less", "less_eq", "eq", "not_eq",
        "more_eq", "more", "not", "and", "or", "true", "false", "bit_not", "bit_and", "bit_or",
        "bit_xor", "sleep", "random", "unix_time", "convert_int", "convert_float", "convert_str",
        "convert_bool", "convert_color", "typeof", "nothing", "comment", "gc_collect", "decl_var",
        "get_var", "set_var", "create_list", "list_add", "list_get", "list_set", "list_length",
        "join", "letter_in", "substring", "length", "ord", "chr",
    ];

    #[test]
    fn builtin_covers_catalog() {
        let registry = Registry::<ObjectModule>::builtin();
        for id in CATALOG {
            assert!(registry.get(id).is_some(), "missing block {}", id);
        }
        assert_eq!(registry.len(), CATALOG.len());
    }

    #[test]
    fn block_types() {
        let registry = Registry::<ObjectModule>::builtin();
        let ty = |id: &str| registry.get(id).map(|spec| spec.ty);

        assert_eq!(ty("on_start"), Some(BlockType::Hat));
        assert_eq!(ty("define_block"), Some(BlockType::Hat));
        assert_eq!(ty("end"), Some(BlockType::End));
        assert_eq!(ty("while"), Some(BlockType::Control));
        assert_eq!(ty("else_if"), Some(BlockType::ControlEnd));
        assert_eq!(ty("else"), Some(BlockType::ControlEnd));
        assert_eq!(ty("return"), Some(BlockType::Normal));
        assert_eq!(ty("arg"), None);
    }

    #[test]
    fn minimum_arguments() {
        let registry = Registry::<ObjectModule>::builtin();
        let min = |id: &str| registry.get(id).map(|spec| spec.min_args);

        assert_eq!(min("plus"), Some(2));
        assert_eq!(min("define_block"), Some(1));
        assert_eq!(min("substring"), Some(3));
        assert_eq!(min("list_set"), Some(3));
        assert_eq!(min("pi"), Some(0));
    }
}
