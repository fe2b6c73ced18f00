//! Entry point used by built executables

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::context::{ExecContext, TermSize};
use crate::gc::{Gc, DEFAULT_MAX_MEMORY, DEFAULT_MIN_MEMORY};

/// Signature of the exported `scrap_main` of a built program
pub type ProgramEntry = unsafe extern "C" fn(*mut ExecContext);

/// Run a compiled program against stdin/stdout; returns the exit code
///
/// # Safety
/// `entry` must be a `scrap_main` produced by the compiler.
#[no_mangle]
pub unsafe extern "C" fn scrap_run_standalone(entry: ProgramEntry) -> i32 {
    let gc = Gc::new(DEFAULT_MIN_MEMORY, DEFAULT_MAX_MEMORY);
    let mut ctx =
        ExecContext::new(gc, Arc::new(AtomicBool::new(false))).with_term_size(TermSize::from_env());
    entry(&mut ctx);

    match ctx.abort_message() {
        Some(message) => {
            eprintln!("{}", message);
            1
        }
        None => 0,
    }
}
