//! Boxing and unboxing of dynamically typed values

use crate::context::ExecContext;
use crate::text;
use crate::value::{static_nothing, AnyKind, AnyValue, ScrList, ScrString};

use super::{context, read_any};

/// The shared nothing value; never allocates
#[no_mangle]
pub extern "C" fn scrap_any_nothing() -> *mut AnyValue {
    static_nothing()
}

/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_any_from_integer(
    ctx: *mut ExecContext,
    value: i64,
) -> *mut AnyValue {
    context(ctx).alloc_any(AnyValue::integer(value))
}

/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_any_from_float(ctx: *mut ExecContext, value: f64) -> *mut AnyValue {
    context(ctx).alloc_any(AnyValue::float(value))
}

/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_any_from_bool(ctx: *mut ExecContext, value: bool) -> *mut AnyValue {
    context(ctx).alloc_any(AnyValue::bool(value))
}

/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_any_from_color(ctx: *mut ExecContext, value: i64) -> *mut AnyValue {
    context(ctx).alloc_any(AnyValue::color(value))
}

/// # Safety
/// `value` must be a rooted string payload.
#[no_mangle]
pub unsafe extern "C" fn scrap_any_from_string(
    ctx: *mut ExecContext,
    value: *mut ScrString,
) -> *mut AnyValue {
    context(ctx).alloc_any(AnyValue::string(value))
}

/// # Safety
/// `value` must be a rooted list payload.
#[no_mangle]
pub unsafe extern "C" fn scrap_any_from_list(
    ctx: *mut ExecContext,
    value: *mut ScrList,
) -> *mut AnyValue {
    context(ctx).alloc_any(AnyValue::list(value))
}

/// # Safety
/// `value` must be an `any` payload or null.
#[no_mangle]
pub unsafe extern "C" fn scrap_integer_from_any(value: *const AnyValue) -> i64 {
    let value = read_any(value);
    match value.kind() {
        AnyKind::Integer | AnyKind::Bool | AnyKind::Color => value.as_integer(),
        AnyKind::Float => value.as_float() as i64,
        AnyKind::String => text::parse_leading_int(ScrString::bytes(value.as_string())),
        AnyKind::List | AnyKind::Nothing => 0,
    }
}

/// # Safety
/// `value` must be an `any` payload or null.
#[no_mangle]
pub unsafe extern "C" fn scrap_float_from_any(value: *const AnyValue) -> f64 {
    let value = read_any(value);
    match value.kind() {
        AnyKind::Integer | AnyKind::Bool | AnyKind::Color => value.as_integer() as f64,
        AnyKind::Float => value.as_float(),
        AnyKind::String => text::parse_leading_float(ScrString::bytes(value.as_string())),
        AnyKind::List | AnyKind::Nothing => 0.0,
    }
}

/// # Safety
/// `value` must be an `any` payload or null.
#[no_mangle]
pub unsafe extern "C" fn scrap_bool_from_any(value: *const AnyValue) -> bool {
    let value = read_any(value);
    match value.kind() {
        AnyKind::Integer | AnyKind::Bool | AnyKind::Color => value.as_integer() != 0,
        AnyKind::Float => value.as_float() != 0.0,
        AnyKind::String => !ScrString::bytes(value.as_string()).is_empty(),
        AnyKind::List | AnyKind::Nothing => false,
    }
}

/// # Safety
/// `value` must be an `any` payload or null.
#[no_mangle]
pub unsafe extern "C" fn scrap_color_from_any(value: *const AnyValue) -> i64 {
    let value = read_any(value);
    match value.kind() {
        AnyKind::String => {
            let bytes = ScrString::bytes(value.as_string());
            text::parse_color(&String::from_utf8_lossy(bytes)).unwrap_or(0)
        }
        _ => scrap_integer_from_any(&value),
    }
}

/// Render any value as a string; strings are returned as-is
///
/// # Safety
/// `value` must be an `any` payload or null.
#[no_mangle]
pub unsafe extern "C" fn scrap_string_from_any(
    ctx: *mut ExecContext,
    value: *const AnyValue,
) -> *mut ScrString {
    let ctx = context(ctx);
    let value = read_any(value);
    match value.kind() {
        AnyKind::String => value.as_string(),
        AnyKind::Integer => ctx.alloc_string(value.as_integer().to_string().as_bytes()),
        AnyKind::Float => ctx.alloc_string(text::format_float(value.as_float()).as_bytes()),
        AnyKind::Bool => ctx.alloc_string(text::format_bool(value.as_bool()).as_bytes()),
        AnyKind::Color => ctx.alloc_string(text::format_color(value.as_integer()).as_bytes()),
        AnyKind::List => {
            let len = (*value.as_list()).len;
            ctx.alloc_string(text::format_list(len).as_bytes())
        }
        AnyKind::Nothing => ctx.alloc_string(b""),
    }
}

/// The list inside an `any`, or a fresh empty list for anything else
///
/// # Safety
/// `value` must be an `any` payload or null.
#[no_mangle]
pub unsafe extern "C" fn scrap_list_from_any(
    ctx: *mut ExecContext,
    value: *const AnyValue,
) -> *mut ScrList {
    let value = read_any(value);
    match value.kind() {
        AnyKind::List => value.as_list(),
        _ => context(ctx).alloc_list(),
    }
}

/// Structural equality for scalars and strings, identity for lists
///
/// # Safety
/// Both values must be `any` payloads or null.
#[no_mangle]
pub unsafe extern "C" fn scrap_any_is_eq(left: *const AnyValue, right: *const AnyValue) -> bool {
    let (left, right) = (read_any(left), read_any(right));
    if left.kind != right.kind {
        return false;
    }
    match left.kind() {
        AnyKind::Nothing => true,
        AnyKind::Integer | AnyKind::Bool | AnyKind::Color => left.data == right.data,
        AnyKind::Float => left.as_float() == right.as_float(),
        AnyKind::String => {
            ScrString::bytes(left.as_string()) == ScrString::bytes(right.as_string())
        }
        AnyKind::List => left.data == right.data,
    }
}

/// Type name of the value held by an `any`
///
/// # Safety
/// `value` must be an `any` payload or null.
#[no_mangle]
pub unsafe extern "C" fn scrap_any_type_name(
    ctx: *mut ExecContext,
    value: *const AnyValue,
) -> *mut ScrString {
    let name = read_any(value).kind().name();
    context(ctx).alloc_string(name.as_bytes())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use super::*;
    use crate::gc::Gc;

    fn context() -> ExecContext {
        let mut ctx = ExecContext::new(Gc::new(4096, 1 << 20), Arc::new(AtomicBool::new(false)));
        ctx.gc_mut().root_begin().unwrap();
        ctx
    }

    #[test]
    fn unboxing_converts_between_kinds() {
        let mut ctx = context();
        let ctx_ptr: *mut ExecContext = &mut ctx;
        unsafe {
            let float = scrap_any_from_float(ctx_ptr, 3.75);
            assert_eq!(scrap_integer_from_any(float), 3);
            assert!(scrap_bool_from_any(float));

            let string = scrap_string_from_literal_for_test(ctx_ptr, "12.5kg");
            let boxed = scrap_any_from_string(ctx_ptr, string);
            assert_eq!(scrap_integer_from_any(boxed), 12);
            assert!((scrap_float_from_any(boxed) - 12.5).abs() < 1e-12);

            assert_eq!(scrap_integer_from_any(scrap_any_nothing()), 0);
            assert!(!scrap_bool_from_any(std::ptr::null()));
        }
    }

    #[test]
    fn strings_render_any_kind() {
        let mut ctx = context();
        let ctx_ptr: *mut ExecContext = &mut ctx;
        unsafe {
            let rendered = scrap_string_from_any(ctx_ptr, scrap_any_from_bool(ctx_ptr, true));
            assert_eq!(ScrString::bytes(rendered), b"true");

            let rendered = scrap_string_from_any(ctx_ptr, scrap_any_from_float(ctx_ptr, 0.5));
            assert_eq!(ScrString::bytes(rendered), b"0.500000");

            let list = context_list(ctx_ptr);
            let rendered = scrap_string_from_any(ctx_ptr, scrap_any_from_list(ctx_ptr, list));
            assert_eq!(ScrString::bytes(rendered), b"*LIST (2)*");

            let name = scrap_any_type_name(ctx_ptr, scrap_any_from_list(ctx_ptr, list));
            assert_eq!(ScrString::bytes(name), b"list");
        }
    }

    #[test]
    fn equality_requires_same_kind() {
        let mut ctx = context();
        let ctx_ptr: *mut ExecContext = &mut ctx;
        unsafe {
            let one = scrap_any_from_integer(ctx_ptr, 1);
            let also_one = scrap_any_from_integer(ctx_ptr, 1);
            let true_value = scrap_any_from_bool(ctx_ptr, true);
            assert!(scrap_any_is_eq(one, also_one));
            assert!(!scrap_any_is_eq(one, true_value));
            assert!(scrap_any_is_eq(scrap_any_nothing(), std::ptr::null()));

            let x = scrap_string_from_literal_for_test(ctx_ptr, "x");
            let a = scrap_any_from_string(ctx_ptr, x);
            let y = scrap_string_from_literal_for_test(ctx_ptr, "x");
            let b = scrap_any_from_string(ctx_ptr, y);
            assert!(scrap_any_is_eq(a, b));
        }
    }

    unsafe fn scrap_string_from_literal_for_test(
        ctx: *mut ExecContext,
        text: &str,
    ) -> *mut ScrString {
        (*ctx).alloc_string(text.as_bytes())
    }

    unsafe fn context_list(ctx: *mut ExecContext) -> *mut ScrList {
        let list = (*ctx).alloc_list();
        (*ctx).list_push(list, AnyValue::integer(1));
        (*ctx).list_push(list, AnyValue::integer(2));
        list
    }
}
