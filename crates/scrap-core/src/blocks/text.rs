//! String blocks; positions are 1-based code point indices

use cranelift_module::Module;

use crate::compiler::{BlockOutput, Codegen, CompileResult, ControlState, FuncArg};

use super::{value, BlockType, Registry};

pub(super) fn register<M: Module>(registry: &mut Registry<M>) {
    registry.register("join", BlockType::Normal, 2, join::<M>);
    registry.register("letter_in", BlockType::Normal, 2, letter_in::<M>);
    registry.register("substring", BlockType::Normal, 3, substring::<M>);
    registry.register("length", BlockType::Normal, 1, length::<M>);
    registry.register("ord", BlockType::Normal, 1, ord::<M>);
    registry.register("chr", BlockType::Normal, 1, chr::<M>);
}

fn join<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    if let (FuncArg::Literal(left), FuncArg::Literal(right)) = (&argv[0], &argv[1]) {
        return value(FuncArg::Literal(format!("{}{}", left, right)));
    }
    let left = gen.to_string(&argv[0])?;
    let right = gen.to_string(&argv[1])?;
    let ctx = gen.ctx();
    let joined = gen.call_value("scrap_string_join", &[ctx, left, right])?;
    value(FuncArg::String(joined))
}

/// `letter_in(index, string)`
fn letter_in<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let index = gen.to_integer(&argv[0])?;
    let string = gen.to_string(&argv[1])?;
    let ctx = gen.ctx();
    let letter = gen.call_value("scrap_string_letter_in", &[ctx, index, string])?;
    value(FuncArg::String(letter))
}

/// `substring(begin, end, string)`, inclusive
fn substring<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let begin = gen.to_integer(&argv[0])?;
    let end = gen.to_integer(&argv[1])?;
    let string = gen.to_string(&argv[2])?;
    let ctx = gen.ctx();
    let sub = gen.call_value("scrap_string_substring", &[ctx, begin, end, string])?;
    value(FuncArg::String(sub))
}

fn length<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    if let FuncArg::Literal(literal) = &argv[0] {
        let len = gen.int_const(literal.chars().count() as i64);
        return value(FuncArg::Integer(len));
    }
    let string = gen.to_string(&argv[0])?;
    let len = gen.call_value("scrap_string_length", &[string])?;
    value(FuncArg::Integer(len))
}

fn ord<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    if let FuncArg::Literal(literal) = &argv[0] {
        let code = gen.int_const(literal.chars().next().map_or(0, |c| i64::from(u32::from(c))));
        return value(FuncArg::Integer(code));
    }
    let string = gen.to_string(&argv[0])?;
    let code = gen.call_value("scrap_string_ord", &[string])?;
    value(FuncArg::Integer(code))
}

fn chr<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let code = gen.to_integer(&argv[0])?;
    let ctx = gen.ctx();
    let string = gen.call_value("scrap_string_chr", &[ctx, code])?;
    value(FuncArg::String(string))
}
