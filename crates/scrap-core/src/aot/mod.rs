//! Build back end: standalone executables
//!
//! Lowers a program into an object file and links it with a small C `main`
//! and the runtime static library:
//!
//! ```text
//! Program → AotCompiler → ObjectProduct → Linker (+ wrapper.c, libscrap_runtime.a) → Executable
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let product = AotCompiler::new()?.compile(&program)?;
//! Linker::with_output("hello").link(product)?;
//! ```

mod compiler;
mod linker;

pub use compiler::{build_executable, AotCompiler, AotResult};
pub use linker::{Linker, LinkerConfig};

use thiserror::Error;

use crate::compiler::CompileError;

/// Errors that can occur during AOT compilation
#[derive(Debug, Error)]
pub enum AotError {
    /// The program failed to lower
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Cranelift compilation error
    #[error("Cranelift compilation error: {0}")]
    Cranelift(String),

    /// Linking error
    #[error("Linking error: {0}")]
    LinkError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Build error
    #[error("Build error: {0}")]
    BuildError(String),
}
