//! JIT back end used by "run"
//!
//! Lowers a whole program into a `JITModule` whose runtime imports resolve to
//! the `scrap_*` functions linked into this process, then hands back the
//! address of `scrap_main`.
//!
//! ```text
//! Program → ProgramCompiler<JITModule> → finalize_definitions → CompiledProgram
//! ```

mod compiler;

pub use compiler::{runtime_symbols, CompiledProgram, JitCompiler};

use thiserror::Error;

use crate::compiler::CompileError;

/// Errors that can occur during JIT compilation
#[derive(Debug, Error)]
pub enum JitError {
    /// The program failed to lower
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Cranelift compilation error
    #[error("Cranelift compilation error: {0}")]
    Cranelift(String),

    /// Internal compiler error
    #[error("Internal JIT compiler error: {0}")]
    Internal(String),
}

/// Result type for JIT operations
pub type JitResult<T> = Result<T, JitError>;
