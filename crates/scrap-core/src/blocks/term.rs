//! Terminal output, input and cursor blocks
//!
//! Print blocks evaluate to the number of bytes written.

use cranelift_codegen::ir::{InstBuilder, Value};
use cranelift_module::Module;

use crate::compiler::{BlockOutput, Codegen, CompileResult, ControlState, FuncArg};

use super::{value, BlockType, Registry};

pub(super) fn register<M: Module>(registry: &mut Registry<M>) {
    registry.register("print", BlockType::Normal, 1, print::<M>);
    registry.register("println", BlockType::Normal, 1, println::<M>);
    registry.register("input", BlockType::Normal, 0, input::<M>);
    registry.register("get_char", BlockType::Normal, 0, get_char::<M>);
    registry.register("set_fg_color", BlockType::Normal, 1, set_fg_color::<M>);
    registry.register("set_bg_color", BlockType::Normal, 1, set_bg_color::<M>);
    registry.register("reset_color", BlockType::Normal, 0, reset_color::<M>);
    registry.register("term_clear", BlockType::Normal, 0, term_clear::<M>);
    registry.register("term_set_clear", BlockType::Normal, 1, term_set_clear::<M>);
    registry.register("set_cursor", BlockType::Normal, 2, set_cursor::<M>);
    registry.register("cursor_x", BlockType::Normal, 0, cursor_x::<M>);
    registry.register("cursor_y", BlockType::Normal, 0, cursor_y::<M>);
    registry.register("cursor_max_x", BlockType::Normal, 0, cursor_max_x::<M>);
    registry.register("cursor_max_y", BlockType::Normal, 0, cursor_max_y::<M>);
}

fn print_literal<M: Module>(gen: &mut Codegen<'_, M>, text: &str) -> CompileResult<Value> {
    if text.is_empty() {
        return Ok(gen.int_const(0));
    }
    let ctx = gen.ctx();
    let data = gen.literal_ptr(text)?;
    let len = gen.int_const(text.len() as i64);
    gen.call_value("scrap_term_print_literal", &[ctx, data, len])
}

/// Emit the print call for `arg` and return the byte count
fn print_value<M: Module>(gen: &mut Codegen<'_, M>, arg: &FuncArg) -> CompileResult<Value> {
    let ctx = gen.ctx();
    match arg {
        FuncArg::Literal(text) => print_literal(gen, text),
        FuncArg::Nothing => Ok(gen.int_const(0)),
        FuncArg::String(v) => gen.call_value("scrap_term_print_string", &[ctx, *v]),
        FuncArg::Integer(v) => gen.call_value("scrap_term_print_integer", &[ctx, *v]),
        FuncArg::Float(v) => gen.call_value("scrap_term_print_float", &[ctx, *v]),
        FuncArg::Bool(v) => gen.call_value("scrap_term_print_bool", &[ctx, *v]),
        FuncArg::Color(v) => gen.call_value("scrap_term_print_color", &[ctx, *v]),
        FuncArg::List(v) => gen.call_value("scrap_term_print_list", &[ctx, *v]),
        FuncArg::Any(v) => gen.call_value("scrap_term_print_any", &[ctx, *v]),
        FuncArg::Blockdef(_) => Err(gen.error(format!(
            "Invalid type {} in print function",
            arg.data_type().name()
        ))),
    }
}

fn print<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let written = print_value(gen, &argv[0])?;
    value(FuncArg::Integer(written))
}

fn println<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let written = print_value(gen, &argv[0])?;
    let newline = print_literal(gen, "\n")?;
    let total = gen.builder.ins().iadd(written, newline);
    value(FuncArg::Integer(total))
}

fn input<M: Module>(
    gen: &mut Codegen<'_, M>,
    _argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let ctx = gen.ctx();
    let line = gen.call_value("scrap_term_input", &[ctx])?;
    value(FuncArg::String(line))
}

fn get_char<M: Module>(
    gen: &mut Codegen<'_, M>,
    _argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let ctx = gen.ctx();
    let letter = gen.call_value("scrap_term_get_char", &[ctx])?;
    value(FuncArg::String(letter))
}

fn set_fg_color<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let color = gen.to_color(&argv[0])?;
    let ctx = gen.ctx();
    gen.call("scrap_term_set_fg_color", &[ctx, color])?;
    Ok(BlockOutput::Omit)
}

fn set_bg_color<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let color = gen.to_color(&argv[0])?;
    let ctx = gen.ctx();
    gen.call("scrap_term_set_bg_color", &[ctx, color])?;
    Ok(BlockOutput::Omit)
}

fn reset_color<M: Module>(
    gen: &mut Codegen<'_, M>,
    _argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let ctx = gen.ctx();
    gen.call("scrap_term_reset_color", &[ctx])?;
    Ok(BlockOutput::Omit)
}

fn term_clear<M: Module>(
    gen: &mut Codegen<'_, M>,
    _argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let ctx = gen.ctx();
    gen.call("scrap_term_clear", &[ctx])?;
    Ok(BlockOutput::Omit)
}

fn term_set_clear<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let color = gen.to_color(&argv[0])?;
    let ctx = gen.ctx();
    gen.call("scrap_term_set_clear_color", &[ctx, color])?;
    Ok(BlockOutput::Omit)
}

fn set_cursor<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let x = gen.to_integer(&argv[0])?;
    let y = gen.to_integer(&argv[1])?;
    let ctx = gen.ctx();
    gen.call("scrap_term_set_cursor", &[ctx, x, y])?;
    Ok(BlockOutput::Omit)
}

fn cursor_x<M: Module>(
    gen: &mut Codegen<'_, M>,
    _argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let ctx = gen.ctx();
    let x = gen.call_value("scrap_term_cursor_x", &[ctx])?;
    value(FuncArg::Integer(x))
}

fn cursor_y<M: Module>(
    gen: &mut Codegen<'_, M>,
    _argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let ctx = gen.ctx();
    let y = gen.call_value("scrap_term_cursor_y", &[ctx])?;
    value(FuncArg::Integer(y))
}

fn cursor_max_x<M: Module>(
    gen: &mut Codegen<'_, M>,
    _argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let ctx = gen.ctx();
    let columns = gen.call_value("scrap_term_cursor_max_x", &[ctx])?;
    value(FuncArg::Integer(columns))
}

fn cursor_max_y<M: Module>(
    gen: &mut Codegen<'_, M>,
    _argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let ctx = gen.ctx();
    let rows = gen.call_value("scrap_term_cursor_max_y", &[ctx])?;
    value(FuncArg::Integer(rows))
}
