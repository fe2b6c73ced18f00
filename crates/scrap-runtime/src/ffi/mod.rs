//! Entry points called from compiled programs
//!
//! Every function here uses the C calling convention and an unmangled
//! `scrap_*` symbol, so the same code serves two purposes:
//! - the JIT registers each function's address under its symbol name
//! - standalone executables resolve the symbols from `libscrap_runtime.a`
//!
//! The compiler's signature table must match these definitions exactly.
//! Conventions:
//! - `ctx` is the running program's [`ExecContext`]
//! - integers and colors are `i64`, floats `f64`, booleans `bool` (i8)
//! - strings, lists and `any` values are chunk payload pointers
//! - a null `any` is treated as nothing

mod any;
mod gc;
mod list;
mod misc;
mod standalone;
mod string;
mod term;

pub use any::*;
pub use gc::*;
pub use list::*;
pub use misc::*;
pub use standalone::*;
pub use string::*;
pub use term::*;

use crate::context::ExecContext;
use crate::value::AnyValue;

/// Borrow the context behind the pointer passed in by generated code
///
/// # Safety
/// `ctx` must be the live context of the running program, and no other
/// reference to it may be in use for the duration of the call.
pub(crate) unsafe fn context<'a>(ctx: *mut ExecContext) -> &'a mut ExecContext {
    &mut *ctx
}

/// Read an `any` value, treating null as nothing
///
/// # Safety
/// A non-null `value` must point at a valid `AnyValue`.
pub(crate) unsafe fn read_any(value: *const AnyValue) -> AnyValue {
    if value.is_null() {
        AnyValue::NOTHING
    } else {
        *value
    }
}
