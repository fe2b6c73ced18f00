//! Root-scope protocol and cancellation polling

use crate::context::ExecContext;

use super::context;

/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_gc_root_begin(ctx: *mut ExecContext) {
    let ctx = context(ctx);
    let result = ctx.gc_mut().root_begin();
    ctx.check(result);
}

/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_gc_root_end(ctx: *mut ExecContext) {
    let ctx = context(ctx);
    let result = ctx.gc_mut().root_end();
    ctx.check(result);
}

/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_gc_root_save(ctx: *mut ExecContext) {
    context(ctx).gc_mut().root_save();
}

/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_gc_root_restore(ctx: *mut ExecContext) {
    let ctx = context(ctx);
    let result = ctx.gc_mut().root_restore();
    ctx.check(result);
}

/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_gc_flush(ctx: *mut ExecContext) {
    context(ctx).gc_mut().flush();
}

/// Register a variable slot as a named root
///
/// # Safety
/// `slot` must stay valid until the innermost root frame closes.
#[no_mangle]
pub unsafe extern "C" fn scrap_gc_add_root(ctx: *mut ExecContext, slot: *const *mut u8) {
    context(ctx).gc_mut().add_root(slot);
}

/// # Safety
/// `payload` must be a chunk payload or null.
#[no_mangle]
pub unsafe extern "C" fn scrap_gc_add_temp_root(ctx: *mut ExecContext, payload: *mut u8) {
    context(ctx).gc_mut().add_temp_root(payload);
}

/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_gc_collect(ctx: *mut ExecContext) {
    context(ctx).gc_mut().collect();
}

/// Whether generated code must leave through its exit path
///
/// One atomic load plus a check of the pending abort; never blocks.
///
/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_poll_stop(ctx: *mut ExecContext) -> bool {
    context(ctx).should_exit()
}
