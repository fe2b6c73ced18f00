//! Scrap Core - Block-graph compiler for Scrap programs
//!
//! This crate provides:
//! - AST: programs as chains of blocks, loaded from JSON or built in code
//! - Blocks: the built-in block catalog and its generation callbacks
//! - Compiler: lowering of chains into Cranelift IR
//! - JIT: in-process native code for "run"
//! - AOT: object files and linking for "build"
//! - Exec: running compiled programs on a worker thread

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Program data model
pub mod ast;

/// Built-in blocks
pub mod blocks;

/// Code generator and compiler state
pub mod compiler;

/// Configuration file and defaults
pub mod config;

/// JIT compilation module (Cranelift-based)
/// JIT requires unsafe code for function pointers and executable memory
#[allow(unsafe_code, clippy::missing_safety_doc)]
pub mod jit;

/// AOT (Ahead-of-Time) compilation module (Cranelift-based)
pub mod aot;

/// Worker-thread executor
pub mod exec;

pub use ast::{Block, BlockRef, Chain, Program, ProgramError};
pub use compiler::{CompileError, CompileErrorKind, CompileResult};
pub use config::{ConfigError, ScrapConfig};
pub use exec::{run_blocking, ExecError, ExecHandle, ExecReport, ExecResult, Executor, OutputBuffer};
