//! Block-graph to Cranelift IR compiler
//!
//! Walks every chain of a [`Program`] and lowers it into native functions:
//! one exported `scrap_main` holding all `on_start` chains, plus one local
//! function per `define_block` chain.
//!
//! # Architecture
//!
//! ```text
//! Program → ProgramCompiler → Codegen (per function) → Registry callbacks → Cranelift IR
//!                                  │
//!                                  └──> CompilationContext (control, variable and GC-block stacks)
//! ```
//!
//! The compiler is generic over [`cranelift_module::Module`]: the JIT back
//! end drives it with a `JITModule`, the build back end with an
//! `ObjectModule`, and the emitted IR is the same in both cases.
//!
//! # Calling Convention
//!
//! Every generated function takes the running program's `ExecContext`
//! pointer as its first parameter. User functions take one `any` pointer per
//! parameter and return an `any` pointer.

pub mod casts;
pub mod codegen;
pub mod context;
pub mod signatures;
pub mod types;

use std::collections::HashMap;

use cranelift_codegen::ir::{AbiParam, Function, Signature, UserFuncName, Value};
use cranelift_codegen::Context;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_module::{DataId, FuncId, Linkage, Module};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::ast::{Argument, BlockRef, Program};
use crate::blocks::Registry;

pub use codegen::{Codegen, FunctionKind};
pub use context::{CompilationContext, ControlFrame};
pub use types::CraneliftTypes;

/// Symbol of the program entry point
pub const MAIN_SYMBOL: &str = "scrap_main";

/// Upper bound on parameters of a user-defined block
pub const MAX_FUNCTION_PARAMS: usize = 32;

/// Category of a compile error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    /// The program is wrong: bad argument, invalid cast, unknown variable
    User,
    /// The block graph broke a structural invariant
    Internal,
    /// Cranelift or the module rejected the generated code
    Backend,
}

/// A compile error, attributed to the offending block when known
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub block: Option<BlockRef>,
    pub message: String,
}

impl CompileError {
    pub fn user(block: &BlockRef, message: impl Into<String>) -> Self {
        Self {
            kind: CompileErrorKind::User,
            block: Some(block.clone()),
            message: message.into(),
        }
    }

    pub fn internal(block: Option<&BlockRef>, message: impl Into<String>) -> Self {
        Self {
            kind: CompileErrorKind::Internal,
            block: block.cloned(),
            message: message.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self {
            kind: CompileErrorKind::Backend,
            block: None,
            message: message.into(),
        }
    }

    /// Message prefixed with the block location
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.block {
            Some(block) => format!("{}: {}", block, self.message),
            None => self.message.clone(),
        }
    }
}

/// Result type for compile operations
pub type CompileResult<T> = Result<T, CompileError>;

/// Static type of a value flowing between blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Nothing,
    Integer,
    Float,
    Literal,
    String,
    Bool,
    List,
    Any,
    Blockdef,
    Color,
}

impl DataType {
    /// Name used in error messages and by `typeof`
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            DataType::Nothing => "nothing",
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::Literal => "literal",
            DataType::String => "string",
            DataType::Bool => "bool",
            DataType::List => "list",
            DataType::Any => "any",
            DataType::Blockdef => "blockdef",
            DataType::Color => "color",
        }
    }

    /// Whether values of this type are GC chunk pointers
    #[must_use]
    pub const fn is_gc(self) -> bool {
        matches!(self, DataType::String | DataType::List | DataType::Any)
    }
}

/// A compiled argument or block result
#[derive(Debug, Clone, PartialEq)]
pub enum FuncArg {
    Nothing,
    /// Compile-time text, materialised only when cast
    Literal(String),
    /// Blockdef id, only meaningful to `define_block`
    Blockdef(String),
    Integer(Value),
    Float(Value),
    Bool(Value),
    Color(Value),
    String(Value),
    List(Value),
    Any(Value),
}

impl FuncArg {
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            FuncArg::Nothing => DataType::Nothing,
            FuncArg::Literal(_) => DataType::Literal,
            FuncArg::Blockdef(_) => DataType::Blockdef,
            FuncArg::Integer(_) => DataType::Integer,
            FuncArg::Float(_) => DataType::Float,
            FuncArg::Bool(_) => DataType::Bool,
            FuncArg::Color(_) => DataType::Color,
            FuncArg::String(_) => DataType::String,
            FuncArg::List(_) => DataType::List,
            FuncArg::Any(_) => DataType::Any,
        }
    }

    /// The SSA value, for runtime-typed arguments
    #[must_use]
    pub fn value(&self) -> Option<Value> {
        match self {
            FuncArg::Integer(v)
            | FuncArg::Float(v)
            | FuncArg::Bool(v)
            | FuncArg::Color(v)
            | FuncArg::String(v)
            | FuncArg::List(v)
            | FuncArg::Any(v) => Some(*v),
            FuncArg::Nothing | FuncArg::Literal(_) | FuncArg::Blockdef(_) => None,
        }
    }

    /// Wrap an SSA value of a runtime type
    #[must_use]
    pub fn from_value(ty: DataType, value: Value) -> Option<Self> {
        Some(match ty {
            DataType::Integer => FuncArg::Integer(value),
            DataType::Float => FuncArg::Float(value),
            DataType::Bool => FuncArg::Bool(value),
            DataType::Color => FuncArg::Color(value),
            DataType::String => FuncArg::String(value),
            DataType::List => FuncArg::List(value),
            DataType::Any => FuncArg::Any(value),
            DataType::Nothing | DataType::Literal | DataType::Blockdef => return None,
        })
    }
}

/// What a generation callback hands back
#[derive(Debug, Clone, PartialEq)]
pub enum BlockOutput {
    Value(FuncArg),
    /// The block is a statement and produced no value
    Omit,
}

impl BlockOutput {
    #[must_use]
    pub fn into_arg(self) -> FuncArg {
        match self {
            BlockOutput::Value(arg) => arg,
            BlockOutput::Omit => FuncArg::Nothing,
        }
    }
}

/// Phase in which a block is being lowered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Normal,
    /// Opening a CONTROL or CONTROLEND scope
    Begin,
    /// Closing the scope opened at `Begin`
    End,
}

/// A user-defined block bound to a native function
#[derive(Debug, Clone)]
pub struct UserFunction {
    pub id: FuncId,
    pub blockdef: String,
    /// Parameter block ids in declaration order
    pub params: Vec<String>,
}

/// Module-level symbols shared by every function of one compile
#[derive(Debug, Default)]
pub struct Symbols {
    pub(crate) runtime: HashMap<&'static str, FuncId>,
    pub(crate) literals: HashMap<String, DataId>,
    pub(crate) functions: HashMap<String, UserFunction>,
    /// Parameter block id to the blockdef declaring it
    pub(crate) param_owners: HashMap<String, String>,
    pub(crate) globals: Vec<context::Variable>,
}

/// Lowers whole programs into a Cranelift module
pub struct ProgramCompiler<M: Module> {
    module: M,
    ctx: Context,
    builder_ctx: FunctionBuilderContext,
    symbols: Symbols,
    registry: Registry<M>,
    errors: Vec<CompileError>,
}

impl<M: Module> ProgramCompiler<M> {
    pub fn new(module: M) -> Self {
        Self {
            ctx: module.make_context(),
            module,
            builder_ctx: FunctionBuilderContext::new(),
            symbols: Symbols::default(),
            registry: Registry::builtin(),
            errors: Vec::new(),
        }
    }

    /// Every error recorded by the last [`compile`](Self::compile)
    pub fn errors(&self) -> &[CompileError] {
        &self.errors
    }

    pub fn into_module(self) -> M {
        self.module
    }

    /// Compile every chain; returns the id of `scrap_main`
    ///
    /// A failing chain stops lowering of that chain only, so the remaining
    /// chains are still checked. The first error is returned.
    #[instrument(skip(self, program), level = "debug", fields(chains = program.chains.len()))]
    pub fn compile(&mut self, program: &Program) -> CompileResult<FuncId> {
        self.errors.clear();

        let main = self.declare_main()?;
        let definitions = self.declare_functions(program)?;

        self.compile_main(program, main);
        for (chain, blockdef) in definitions {
            self.compile_function(program, chain, &blockdef);
        }

        match self.errors.first() {
            Some(err) => Err(err.clone()),
            None => Ok(main),
        }
    }

    fn declare_main(&mut self) -> CompileResult<FuncId> {
        let sig = self.main_signature();
        self.module
            .declare_function(MAIN_SYMBOL, Linkage::Export, &sig)
            .map_err(|e| CompileError::backend(e.to_string()))
    }

    fn main_signature(&self) -> Signature {
        let mut sig = self.module.make_signature();
        sig.params.push(AbiParam::new(CraneliftTypes::POINTER));
        sig
    }

    fn function_signature(&self, params: usize) -> Signature {
        let mut sig = self.module.make_signature();
        for _ in 0..=params {
            sig.params.push(AbiParam::new(CraneliftTypes::POINTER));
        }
        sig.returns.push(AbiParam::new(CraneliftTypes::POINTER));
        sig
    }

    /// Declare one function per `define_block` chain before any body is lowered
    fn declare_functions(&mut self, program: &Program) -> CompileResult<Vec<(usize, String)>> {
        for def in &program.blockdefs {
            for param in def.params() {
                self.symbols
                    .param_owners
                    .insert(param.to_string(), def.id.clone());
            }
        }

        let mut definitions = Vec::new();
        for (index, chain) in program.chains.iter().enumerate() {
            let Some(head) = chain.head() else { continue };
            if head.id != "define_block" {
                continue;
            }
            let at = BlockRef::new(index, 0);
            let Some(Argument::Blockdef(id)) = head.args.first() else {
                // Reported when the chain is lowered
                definitions.push((index, String::new()));
                continue;
            };
            let def = program
                .find_blockdef(id)
                .ok_or_else(|| CompileError::user(&at, format!("Unknown blockdef \"{}\"", id)))?;
            if self.symbols.functions.contains_key(id) {
                return Err(CompileError::user(
                    &at,
                    format!("Block \"{}\" is defined more than once", id),
                ));
            }

            let params: Vec<String> = def.params().map(str::to_string).collect();
            if params.len() > MAX_FUNCTION_PARAMS {
                return Err(CompileError::user(
                    &at,
                    format!(
                        "Too many parameters passed into function. Got {}/{}",
                        params.len(),
                        MAX_FUNCTION_PARAMS
                    ),
                ));
            }

            let sig = self.function_signature(params.len());
            let name = format!("scrap_fn_{}", self.symbols.functions.len());
            let func_id = self
                .module
                .declare_function(&name, Linkage::Local, &sig)
                .map_err(|e| CompileError::backend(e.to_string()))?;

            debug!(blockdef = %id, symbol = %name, params = params.len(), "declared function");
            self.symbols.functions.insert(
                id.clone(),
                UserFunction {
                    id: func_id,
                    blockdef: id.clone(),
                    params,
                },
            );
            definitions.push((index, id.clone()));
        }
        Ok(definitions)
    }

    fn compile_main(&mut self, program: &Program, main: FuncId) {
        let chains: Vec<usize> = program
            .chains
            .iter()
            .enumerate()
            .filter(|(_, chain)| chain.head().is_some_and(|head| head.id == "on_start"))
            .map(|(index, _)| index)
            .collect();

        self.ctx.func.signature = self.main_signature();
        self.ctx.func.name = UserFuncName::user(0, main.as_u32());

        let mut cx = CompilationContext::new();
        let builder = FunctionBuilder::new(&mut self.ctx.func, &mut self.builder_ctx);
        let mut gen = Codegen::new(
            builder,
            &mut self.module,
            &mut self.symbols,
            &mut cx,
            &self.registry,
            program,
            FunctionKind::Main,
        );

        let mut lowered = 0;
        let result = gen.begin_main().and_then(|()| {
            for &index in &chains {
                let blocks = program.chains[index].blocks.len();
                debug!(chain = index, blocks, "lowering chain");
                gen.compile_chain(index)?;
                lowered += 1;
            }
            gen.finish()
        });
        let failed = result.is_err() && lowered < chains.len();
        self.define(main, result, "main");

        if failed {
            for &index in &chains[lowered + 1..] {
                self.check_chain(program, index);
            }
        }
    }

    /// Lower an `on_start` chain into a scratch body that is never defined
    ///
    /// Used once `scrap_main` is lost, so later chains still report errors.
    fn check_chain(&mut self, program: &Program, index: usize) {
        let signature = self.main_signature();
        let mut func = Function::with_name_signature(UserFuncName::default(), signature);
        let mut builder_ctx = FunctionBuilderContext::new();
        let mut cx = CompilationContext::new();
        let builder = FunctionBuilder::new(&mut func, &mut builder_ctx);
        let mut gen = Codegen::new(
            builder,
            &mut self.module,
            &mut self.symbols,
            &mut cx,
            &self.registry,
            program,
            FunctionKind::Main,
        );

        debug!(chain = index, "checking chain");
        if let Err(err) = gen.begin_main().and_then(|()| gen.compile_chain(index)) {
            warn!(chain = index, error = %err.describe(), "chain failed to compile");
            self.errors.push(err);
        }
    }

    fn compile_function(&mut self, program: &Program, chain: usize, blockdef: &str) {
        let func = self.symbols.functions.get(blockdef).cloned();
        let (func_id, params) = match &func {
            Some(func) => (func.id, func.params.len()),
            None => {
                // `define_block` without a blockdef argument: lower it into a
                // throwaway function so the callback reports the error
                let sig = self.function_signature(0);
                match self.module.declare_anonymous_function(&sig) {
                    Ok(id) => (id, 0),
                    Err(e) => {
                        self.errors.push(CompileError::backend(e.to_string()));
                        return;
                    }
                }
            }
        };

        self.ctx.func.signature = self.function_signature(params);
        self.ctx.func.name = UserFuncName::user(0, func_id.as_u32());

        let mut cx = CompilationContext::new();
        let builder = FunctionBuilder::new(&mut self.ctx.func, &mut self.builder_ctx);
        let mut gen = Codegen::new(
            builder,
            &mut self.module,
            &mut self.symbols,
            &mut cx,
            &self.registry,
            program,
            FunctionKind::User {
                blockdef: blockdef.to_string(),
            },
        );

        debug!(chain, blockdef, "lowering function");
        let result = gen.compile_chain(chain).and_then(|()| gen.finish());
        self.define(func_id, result, blockdef);
    }

    /// Hand a finished body to the module, or record why it failed
    fn define(&mut self, func_id: FuncId, result: CompileResult<()>, what: &str) {
        let result = result.and_then(|()| {
            self.module
                .define_function(func_id, &mut self.ctx)
                .map_err(|e| CompileError::backend(format!("{:?}", e)))
        });

        if let Err(err) = result {
            warn!(function = what, error = %err.describe(), "chain failed to compile");
            // An abandoned builder leaves its context dirty
            self.builder_ctx = FunctionBuilderContext::new();
            self.errors.push(err);
        }
        self.module.clear_context(&mut self.ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_names() {
        assert_eq!(DataType::Nothing.name(), "nothing");
        assert_eq!(DataType::Literal.name(), "literal");
        assert_eq!(DataType::Blockdef.name(), "blockdef");
        assert!(DataType::Any.is_gc());
        assert!(!DataType::Color.is_gc());
    }

    #[test]
    fn omitted_output_reads_as_nothing() {
        assert_eq!(BlockOutput::Omit.into_arg(), FuncArg::Nothing);
        let literal = BlockOutput::Value(FuncArg::Literal("x".into())).into_arg();
        assert_eq!(literal.data_type(), DataType::Literal);
        assert_eq!(literal.value(), None);
    }

    #[test]
    fn describe_includes_block_path() {
        let err = CompileError::user(&BlockRef::new(2, 1).child(0), "Division by zero");
        assert_eq!(err.describe(), "chain 2, block 1 > arg 0: Division by zero");
        assert_eq!(CompileError::backend("bad").describe(), "bad");
    }
}
