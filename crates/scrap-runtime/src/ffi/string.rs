//! String construction, conversion and code-point operations

use std::slice;

use crate::context::ExecContext;
use crate::text;
use crate::value::ScrString;

use super::context;

/// Copy a literal baked into the program's data section
///
/// # Safety
/// `data` must point at `len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn scrap_string_from_literal(
    ctx: *mut ExecContext,
    data: *const u8,
    len: u64,
) -> *mut ScrString {
    let bytes = if data.is_null() || len == 0 {
        &[][..]
    } else {
        slice::from_raw_parts(data, len as usize)
    };
    context(ctx).alloc_string(bytes)
}

/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_string_from_integer(
    ctx: *mut ExecContext,
    value: i64,
) -> *mut ScrString {
    context(ctx).alloc_string(value.to_string().as_bytes())
}

/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_string_from_float(
    ctx: *mut ExecContext,
    value: f64,
) -> *mut ScrString {
    context(ctx).alloc_string(text::format_float(value).as_bytes())
}

/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_string_from_bool(
    ctx: *mut ExecContext,
    value: bool,
) -> *mut ScrString {
    context(ctx).alloc_string(text::format_bool(value).as_bytes())
}

/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_string_from_color(
    ctx: *mut ExecContext,
    value: i64,
) -> *mut ScrString {
    context(ctx).alloc_string(text::format_color(value).as_bytes())
}

/// # Safety
/// `string` must be a string payload or null.
#[no_mangle]
pub unsafe extern "C" fn scrap_string_to_integer(string: *const ScrString) -> i64 {
    text::parse_leading_int(ScrString::bytes(string))
}

/// # Safety
/// `string` must be a string payload or null.
#[no_mangle]
pub unsafe extern "C" fn scrap_string_to_float(string: *const ScrString) -> f64 {
    text::parse_leading_float(ScrString::bytes(string))
}

/// # Safety
/// Both strings must be rooted string payloads.
#[no_mangle]
pub unsafe extern "C" fn scrap_string_join(
    ctx: *mut ExecContext,
    left: *const ScrString,
    right: *const ScrString,
) -> *mut ScrString {
    let (left, right) = (ScrString::bytes(left), ScrString::bytes(right));
    let mut joined = Vec::with_capacity(left.len() + right.len());
    joined.extend_from_slice(left);
    joined.extend_from_slice(right);
    context(ctx).alloc_string(&joined)
}

/// Length in code points
///
/// # Safety
/// `string` must be a string payload or null.
#[no_mangle]
pub unsafe extern "C" fn scrap_string_length(string: *const ScrString) -> i64 {
    text::length(ScrString::bytes(string))
}

/// # Safety
/// `string` must be a rooted string payload.
#[no_mangle]
pub unsafe extern "C" fn scrap_string_letter_in(
    ctx: *mut ExecContext,
    index: i64,
    string: *const ScrString,
) -> *mut ScrString {
    let letter = text::letter_in(ScrString::bytes(string), index).to_vec();
    context(ctx).alloc_string(&letter)
}

/// # Safety
/// `string` must be a rooted string payload.
#[no_mangle]
pub unsafe extern "C" fn scrap_string_substring(
    ctx: *mut ExecContext,
    begin: i64,
    end: i64,
    string: *const ScrString,
) -> *mut ScrString {
    let part = text::substring(ScrString::bytes(string), begin, end).to_vec();
    context(ctx).alloc_string(&part)
}

/// # Safety
/// `string` must be a string payload or null.
#[no_mangle]
pub unsafe extern "C" fn scrap_string_ord(string: *const ScrString) -> i64 {
    text::ord(ScrString::bytes(string))
}

/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_string_chr(ctx: *mut ExecContext, code: i64) -> *mut ScrString {
    context(ctx).alloc_string(text::chr(code).as_bytes())
}

/// # Safety
/// Both strings must be string payloads or null.
#[no_mangle]
pub unsafe extern "C" fn scrap_string_is_eq(
    left: *const ScrString,
    right: *const ScrString,
) -> bool {
    ScrString::bytes(left) == ScrString::bytes(right)
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

    fn literal(ctx: *mut ExecContext, text: &str) -> *mut ScrString {
        unsafe { scrap_string_from_literal(ctx, text.as_ptr(), text.len() as u64) }
    }

    #[test]
    fn literal_and_join() {
        let mut ctx = context();
        let ctx_ptr: *mut ExecContext = &mut ctx;
        let hello = literal(ctx_ptr, "hello, ");
        let world = literal(ctx_ptr, "world");
        unsafe {
            let joined = scrap_string_join(ctx_ptr, hello, world);
            assert_eq!(ScrString::bytes(joined), b"hello, world");
            assert_eq!(scrap_string_length(joined), 12);
            let empty = scrap_string_from_literal(ctx_ptr, std::ptr::null(), 0);
            assert_eq!(ScrString::bytes(empty), b"");
        }
    }

    #[test]
    fn number_conversions() {
        let mut ctx = context();
        let ctx_ptr: *mut ExecContext = &mut ctx;
        unsafe {
            assert_eq!(ScrString::bytes(scrap_string_from_integer(ctx_ptr, -42)), b"-42");
            assert_eq!(ScrString::bytes(scrap_string_from_float(ctx_ptr, 2.0)), b"2.000000");
            assert_eq!(ScrString::bytes(scrap_string_from_bool(ctx_ptr, false)), b"false");
            let color = scrap_string_from_color(ctx_ptr, 0xff00_00ff);
            assert_eq!(ScrString::bytes(color), b"#ff0000ff");
            assert_eq!(scrap_string_to_integer(literal(ctx_ptr, "17 apples")), 17);
            assert_eq!(scrap_string_to_integer(literal(ctx_ptr, "apples")), 0);
            assert!((scrap_string_to_float(literal(ctx_ptr, "0.25")) - 0.25).abs() < 1e-12);
        }
    }

    #[test]
    fn code_point_operations() {
        let mut ctx = context();
        let ctx_ptr: *mut ExecContext = &mut ctx;
        let word = literal(ctx_ptr, "naïve");
        unsafe {
            assert_eq!(scrap_string_length(word), 5);
            assert_eq!(ScrString::bytes(scrap_string_letter_in(ctx_ptr, 3, word)), "ï".as_bytes());
            assert_eq!(ScrString::bytes(scrap_string_letter_in(ctx_ptr, 9, word)), b"");
            let sub = scrap_string_substring(ctx_ptr, 2, 4, word);
            assert_eq!(ScrString::bytes(sub), "aïv".as_bytes());
            assert_eq!(scrap_string_ord(word), i64::from(b'n'));
            assert_eq!(ScrString::bytes(scrap_string_chr(ctx_ptr, 0x41)), b"A");
        }
    }

    #[test]
    fn equality_compares_contents() {
        let mut ctx = context();
        let ctx_ptr: *mut ExecContext = &mut ctx;
        let a = literal(ctx_ptr, "same");
        let b = literal(ctx_ptr, "same");
        let c = literal(ctx_ptr, "other");
        unsafe {
            assert!(scrap_string_is_eq(a, b));
            assert!(!scrap_string_is_eq(a, c));
        }
    }
}
