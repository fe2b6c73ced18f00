//! Scrap Runtime - Value library and garbage collector for compiled programs
//!
//! This crate provides everything compiled Scrap code calls at run time:
//! - GC: chunk allocator with a root-scope stack and mark-sweep collection
//! - Values: `#[repr(C)]` layouts of strings, lists and `any` values
//! - Context: per-run state (GC, stop flag, abort slot, terminal I/O)
//! - FFI: the `extern "C"` `scrap_*` entry points
//!
//! # Architecture
//!
//! ```text
//! generated code ──ctx──> ffi::scrap_* ──> ExecContext ──> Gc
//!                                               │
//!                                               └──> output / input / rng
//! ```
//!
//! The same code is linked in two ways: the JIT registers the address of
//! every `scrap_*` symbol, and built executables link `libscrap_runtime.a`.

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Garbage collector - chunk allocation, root stack, mark and sweep
#[allow(unsafe_code, clippy::missing_safety_doc)]
pub mod gc;

/// Memory layouts shared with generated code
#[allow(unsafe_code, clippy::missing_safety_doc)]
pub mod value;

/// Text helpers used by conversions and string blocks
pub mod text;

/// Per-run execution context
#[allow(unsafe_code, clippy::missing_safety_doc)]
pub mod context;

/// `extern "C"` entry points called by compiled programs
#[allow(unsafe_code, clippy::missing_safety_doc)]
pub mod ffi;

pub use context::{Cursor, ExecContext, TermSize};
pub use ffi::{MathOp, ProgramEntry};
pub use gc::{Gc, GcError, GcStats, DEFAULT_MAX_MEMORY, DEFAULT_MIN_MEMORY, MAX_ROOT_DEPTH};
pub use value::{AnyKind, AnyValue, ScrList, ScrString};
