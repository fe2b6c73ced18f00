//! Comparison, boolean and bitwise blocks

use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::{InstBuilder, Value};
use cranelift_module::Module;

use crate::compiler::{BlockOutput, Codegen, CompileResult, ControlState, FuncArg};

use super::{value, BlockType, Registry};

pub(super) fn register<M: Module>(registry: &mut Registry<M>) {
    registry.register("less", BlockType::Normal, 2, less::<M>);
    registry.register("less_eq", BlockType::Normal, 2, less_eq::<M>);
    registry.register("more", BlockType::Normal, 2, more::<M>);
    registry.register("more_eq", BlockType::Normal, 2, more_eq::<M>);
    registry.register("eq", BlockType::Normal, 2, eq::<M>);
    registry.register("not_eq", BlockType::Normal, 2, not_eq::<M>);
    registry.register("not", BlockType::Normal, 1, not::<M>);
    registry.register("and", BlockType::Normal, 2, and::<M>);
    registry.register("or", BlockType::Normal, 2, or::<M>);
    registry.register("true", BlockType::Normal, 0, block_true::<M>);
    registry.register("false", BlockType::Normal, 0, block_false::<M>);
    registry.register("bit_not", BlockType::Normal, 1, bit_not::<M>);
    registry.register("bit_and", BlockType::Normal, 2, bit_and::<M>);
    registry.register("bit_or", BlockType::Normal, 2, bit_or::<M>);
    registry.register("bit_xor", BlockType::Normal, 2, bit_xor::<M>);
}

fn ordering<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    int_cc: IntCC,
    float_cc: FloatCC,
) -> CompileResult<BlockOutput> {
    let result = if let FuncArg::Float(left) = argv[0] {
        let right = gen.to_float(&argv[1])?;
        gen.builder.ins().fcmp(float_cc, left, right)
    } else {
        let left = gen.to_integer(&argv[0])?;
        let right = gen.to_integer(&argv[1])?;
        gen.builder.ins().icmp(int_cc, left, right)
    };
    value(FuncArg::Bool(result))
}

fn less<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    ordering(gen, argv, IntCC::SignedLessThan, FloatCC::LessThan)
}

fn less_eq<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    ordering(gen, argv, IntCC::SignedLessThanOrEqual, FloatCC::LessThanOrEqual)
}

fn more<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    ordering(gen, argv, IntCC::SignedGreaterThan, FloatCC::GreaterThan)
}

fn more_eq<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    ordering(gen, argv, IntCC::SignedGreaterThanOrEqual, FloatCC::GreaterThanOrEqual)
}

/// Equality of two block values as an `I8`
fn equals<M: Module>(
    gen: &mut Codegen<'_, M>,
    left: &FuncArg,
    right: &FuncArg,
) -> CompileResult<Value> {
    if let Some(arg) = [left, right].into_iter().find(|arg| matches!(arg, FuncArg::Blockdef(_))) {
        return Err(gen.error(format!("Cannot compare type {}", arg.data_type().name())));
    }

    match (left, right) {
        (FuncArg::Literal(a), FuncArg::Literal(b)) => return Ok(gen.bool_const(a == b)),
        (FuncArg::Nothing, FuncArg::Nothing) => return Ok(gen.bool_const(true)),
        (FuncArg::Nothing, _) | (_, FuncArg::Nothing) => return Ok(gen.bool_const(false)),
        _ => {}
    }

    let (left, right) = match (left, right) {
        (FuncArg::Literal(_), other) => (gen.cast_to(left, other.data_type())?, other.clone()),
        (other, FuncArg::Literal(_)) => (other.clone(), gen.cast_to(right, other.data_type())?),
        _ => (left.clone(), right.clone()),
    };
    if left.data_type() != right.data_type() {
        return Ok(gen.bool_const(false));
    }

    Ok(match (left, right) {
        (FuncArg::Integer(a), FuncArg::Integer(b))
        | (FuncArg::Color(a), FuncArg::Color(b))
        | (FuncArg::Bool(a), FuncArg::Bool(b))
        | (FuncArg::List(a), FuncArg::List(b)) => gen.builder.ins().icmp(IntCC::Equal, a, b),
        (FuncArg::Float(a), FuncArg::Float(b)) => gen.builder.ins().fcmp(FloatCC::Equal, a, b),
        (FuncArg::String(a), FuncArg::String(b)) => gen.call_value("scrap_string_is_eq", &[a, b])?,
        (FuncArg::Any(a), FuncArg::Any(b)) => gen.call_value("scrap_any_is_eq", &[a, b])?,
        (other, _) => {
            return Err(gen.error(format!("Cannot compare type {}", other.data_type().name())))
        }
    })
}

fn eq<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let result = equals(gen, &argv[0], &argv[1])?;
    value(FuncArg::Bool(result))
}

fn not_eq<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let equal = equals(gen, &argv[0], &argv[1])?;
    let result = gen.builder.ins().bxor_imm(equal, 1);
    value(FuncArg::Bool(result))
}

fn not<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let arg = gen.to_bool(&argv[0])?;
    let result = gen.builder.ins().bxor_imm(arg, 1);
    value(FuncArg::Bool(result))
}

fn and<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let left = gen.to_bool(&argv[0])?;
    let right = gen.to_bool(&argv[1])?;
    let result = gen.builder.ins().band(left, right);
    value(FuncArg::Bool(result))
}

fn or<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let left = gen.to_bool(&argv[0])?;
    let right = gen.to_bool(&argv[1])?;
    let result = gen.builder.ins().bor(left, right);
    value(FuncArg::Bool(result))
}

fn block_true<M: Module>(
    gen: &mut Codegen<'_, M>,
    _argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let result = gen.bool_const(true);
    value(FuncArg::Bool(result))
}

fn block_false<M: Module>(
    gen: &mut Codegen<'_, M>,
    _argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let result = gen.bool_const(false);
    value(FuncArg::Bool(result))
}

fn bit_not<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let arg = gen.to_integer(&argv[0])?;
    let result = gen.builder.ins().bnot(arg);
    value(FuncArg::Integer(result))
}

fn bitwise<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    op: fn(&mut Codegen<'_, M>, Value, Value) -> Value,
) -> CompileResult<BlockOutput> {
    let left = gen.to_integer(&argv[0])?;
    let right = gen.to_integer(&argv[1])?;
    let result = op(gen, left, right);
    value(FuncArg::Integer(result))
}

fn bit_and<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    bitwise(gen, argv, |gen, a, b| gen.builder.ins().band(a, b))
}

fn bit_or<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    bitwise(gen, argv, |gen, a, b| gen.builder.ins().bor(a, b))
}

fn bit_xor<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    bitwise(gen, argv, |gen, a, b| gen.builder.ins().bxor(a, b))
}
