//! Terminal output, input and cursor control
//!
//! Print helpers return the number of bytes written. Colors and cursor moves
//! are ANSI escape sequences; the runtime tracks the cursor itself so the
//! cursor blocks never have to query the terminal.

use std::slice;

use crate::context::{Cursor, ExecContext};
use crate::text;
use crate::value::{AnyKind, AnyValue, ScrList, ScrString};

use super::{context, read_any};

/// # Safety
/// `data` must point at `len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn scrap_term_print_literal(
    ctx: *mut ExecContext,
    data: *const u8,
    len: u64,
) -> i64 {
    if data.is_null() || len == 0 {
        return 0;
    }
    context(ctx).write_bytes(slice::from_raw_parts(data, len as usize))
}

/// # Safety
/// `string` must be a string payload or null.
#[no_mangle]
pub unsafe extern "C" fn scrap_term_print_string(
    ctx: *mut ExecContext,
    string: *const ScrString,
) -> i64 {
    context(ctx).write_bytes(ScrString::bytes(string))
}

/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_term_print_integer(ctx: *mut ExecContext, value: i64) -> i64 {
    context(ctx).write_bytes(value.to_string().as_bytes())
}

/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_term_print_float(ctx: *mut ExecContext, value: f64) -> i64 {
    context(ctx).write_bytes(text::format_float(value).as_bytes())
}

/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_term_print_bool(ctx: *mut ExecContext, value: bool) -> i64 {
    context(ctx).write_bytes(text::format_bool(value).as_bytes())
}

/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_term_print_color(ctx: *mut ExecContext, value: i64) -> i64 {
    context(ctx).write_bytes(text::format_color(value).as_bytes())
}

/// # Safety
/// `list` must be a list payload or null.
#[no_mangle]
pub unsafe extern "C" fn scrap_term_print_list(ctx: *mut ExecContext, list: *const ScrList) -> i64 {
    let len = if list.is_null() { 0 } else { (*list).len };
    context(ctx).write_bytes(text::format_list(len).as_bytes())
}

/// # Safety
/// `value` must be an `any` payload or null.
#[no_mangle]
pub unsafe extern "C" fn scrap_term_print_any(
    ctx: *mut ExecContext,
    value: *const AnyValue,
) -> i64 {
    let value = read_any(value);
    match value.kind() {
        AnyKind::Nothing => 0,
        AnyKind::Integer => scrap_term_print_integer(ctx, value.as_integer()),
        AnyKind::Float => scrap_term_print_float(ctx, value.as_float()),
        AnyKind::Bool => scrap_term_print_bool(ctx, value.as_bool()),
        AnyKind::Color => scrap_term_print_color(ctx, value.as_integer()),
        AnyKind::String => scrap_term_print_string(ctx, value.as_string()),
        AnyKind::List => scrap_term_print_list(ctx, value.as_list()),
    }
}

/// Read one line from program input, without the line terminator
///
/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_term_input(ctx: *mut ExecContext) -> *mut ScrString {
    let ctx = context(ctx);
    let line = ctx.read_line();
    ctx.alloc_string(&line)
}

/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_term_get_char(ctx: *mut ExecContext) -> *mut ScrString {
    let ctx = context(ctx);
    let letter = ctx.read_char();
    ctx.alloc_string(&letter)
}

/// Split a packed `0xRRGGBBAA` color into its RGB components
fn rgb(color: i64) -> (u8, u8, u8) {
    let [r, g, b, _] = (color as u32).to_be_bytes();
    (r, g, b)
}

/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_term_set_fg_color(ctx: *mut ExecContext, color: i64) {
    let (r, g, b) = rgb(color);
    context(ctx).write_control(format!("\x1b[38;2;{};{};{}m", r, g, b).as_bytes());
}

fn bg_escape(color: i64) -> String {
    let (r, g, b) = rgb(color);
    format!("\x1b[48;2;{};{};{}m", r, g, b)
}

/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_term_set_bg_color(ctx: *mut ExecContext, color: i64) {
    let ctx = context(ctx);
    ctx.write_control(bg_escape(color).as_bytes());
    ctx.set_bg_color(Some(color));
}

/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_term_reset_color(ctx: *mut ExecContext) {
    let ctx = context(ctx);
    ctx.write_control(b"\x1b[0m");
    ctx.set_bg_color(None);
}

/// Background the next `term_clear` fills the screen with
///
/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_term_set_clear_color(ctx: *mut ExecContext, color: i64) {
    context(ctx).set_clear_color(color);
}

/// Clear the screen and home the cursor
///
/// With a clear color set, the screen is filled with it and the program's
/// own background is restored afterwards.
///
/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_term_clear(ctx: *mut ExecContext) {
    let ctx = context(ctx);
    match ctx.clear_color() {
        Some(clear) => {
            ctx.write_control(bg_escape(clear).as_bytes());
            ctx.write_control(b"\x1b[2J\x1b[H");
            let restore = ctx.bg_color().map_or_else(|| "\x1b[49m".to_string(), bg_escape);
            ctx.write_control(restore.as_bytes());
        }
        None => ctx.write_control(b"\x1b[2J\x1b[H"),
    }
    ctx.set_cursor(Cursor::default());
}

/// Move the cursor to a 0-based column and row; negatives clamp to 0
///
/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_term_set_cursor(ctx: *mut ExecContext, x: i64, y: i64) {
    let ctx = context(ctx);
    let cursor = Cursor { x: x.max(0), y: y.max(0) };
    ctx.write_control(format!("\x1b[{};{}H", cursor.y + 1, cursor.x + 1).as_bytes());
    ctx.set_cursor(cursor);
}

/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_term_cursor_x(ctx: *mut ExecContext) -> i64 {
    context(ctx).cursor().x
}

/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_term_cursor_y(ctx: *mut ExecContext) -> i64 {
    context(ctx).cursor().y
}

/// Terminal width in columns
///
/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_term_cursor_max_x(ctx: *mut ExecContext) -> i64 {
    context(ctx).term_size().columns
}

/// Terminal height in rows
///
/// # Safety
/// `ctx` must be the running program's context.
#[no_mangle]
pub unsafe extern "C" fn scrap_term_cursor_max_y(ctx: *mut ExecContext) -> i64 {
    context(ctx).term_size().rows
}
