//! List construction and element access
//!
//! Elements are passed as a raw `(kind, bits)` pair so generated code can
//! store scalars without boxing them first.

use crate::context::ExecContext;
use crate::value::{AnyValue, ScrList};

use super::context;

/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_list_new(ctx: *mut ExecContext) -> *mut ScrList {
    context(ctx).alloc_list()
}

/// # Safety
/// `list` must be a rooted list payload; heap elements must be rooted too.
#[no_mangle]
pub unsafe extern "C" fn scrap_list_add(
    ctx: *mut ExecContext,
    list: *mut ScrList,
    kind: u64,
    bits: u64,
) {
    context(ctx).list_push(list, AnyValue::from_parts(kind, bits));
}

/// Element at a 0-based index, boxed; nothing when out of range
///
/// # Safety
/// `list` must be a rooted list payload or null.
#[no_mangle]
pub unsafe extern "C" fn scrap_list_get(
    ctx: *mut ExecContext,
    list: *const ScrList,
    index: i64,
) -> *mut AnyValue {
    let item = usize::try_from(index)
        .ok()
        .and_then(|index| ScrList::items(list).get(index).copied())
        .unwrap_or(AnyValue::NOTHING);
    context(ctx).alloc_any(item)
}

/// # Safety
/// `list` must be a rooted list payload; heap elements must be rooted too.
#[no_mangle]
pub unsafe extern "C" fn scrap_list_set(
    ctx: *mut ExecContext,
    list: *mut ScrList,
    index: i64,
    kind: u64,
    bits: u64,
) {
    context(ctx).list_set(list, index, AnyValue::from_parts(kind, bits));
}

/// # Safety
/// `list` must be a list payload or null.
#[no_mangle]
pub unsafe extern "C" fn scrap_list_length(list: *const ScrList) -> i64 {
    if list.is_null() {
        0
    } else {
        (*list).len as i64
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use super::*;
    use crate::gc::Gc;
    use crate::value::AnyKind;

    fn context() -> ExecContext {
        let mut ctx = ExecContext::new(Gc::new(4096, 1 << 20), Arc::new(AtomicBool::new(false)));
        ctx.gc_mut().root_begin().unwrap();
        ctx
    }

    #[test]
    fn add_get_set() {
        let mut ctx = context();
        let ctx_ptr: *mut ExecContext = &mut ctx;
        unsafe {
            let list = scrap_list_new(ctx_ptr);
            scrap_list_add(ctx_ptr, list, AnyKind::Integer as u64, 10);
            scrap_list_add(ctx_ptr, list, AnyKind::Float as u64, 1.5f64.to_bits());
            scrap_list_add(ctx_ptr, list, AnyKind::Bool as u64, 1);
            assert_eq!(scrap_list_length(list), 3);

            let first = scrap_list_get(ctx_ptr, list, 0);
            assert_eq!((*first).as_integer(), 10);
            let second = scrap_list_get(ctx_ptr, list, 1);
            assert_eq!((*second).kind(), AnyKind::Float);

            scrap_list_set(ctx_ptr, list, 0, AnyKind::Integer as u64, 99);
            assert_eq!((*scrap_list_get(ctx_ptr, list, 0)).as_integer(), 99);
        }
    }

    #[test]
    fn out_of_range_access_is_harmless() {
        let mut ctx = context();
        let ctx_ptr: *mut ExecContext = &mut ctx;
        unsafe {
            let list = scrap_list_new(ctx_ptr);
            scrap_list_add(ctx_ptr, list, AnyKind::Integer as u64, 1);
            assert_eq!((*scrap_list_get(ctx_ptr, list, 5)).kind(), AnyKind::Nothing);
            assert_eq!((*scrap_list_get(ctx_ptr, list, -1)).kind(), AnyKind::Nothing);
            scrap_list_set(ctx_ptr, list, 3, AnyKind::Integer as u64, 7);
            assert_eq!(scrap_list_length(list), 1);
            assert_eq!(scrap_list_length(std::ptr::null()), 0);
        }
    }
}
