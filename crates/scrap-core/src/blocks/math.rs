//! Arithmetic blocks
//!
//! The first operand picks the arithmetic: float when it is a float,
//! integer otherwise. The second operand is cast to match.

use std::f64::consts::PI;

use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::{InstBuilder, Value};
use cranelift_module::Module;
use scrap_runtime::{text, MathOp};

use crate::compiler::{BlockOutput, Codegen, CompileResult, ControlState, CraneliftTypes, FuncArg};

use super::{value, BlockType, Registry};

pub(super) fn register<M: Module>(registry: &mut Registry<M>) {
    registry.register("plus", BlockType::Normal, 2, plus::<M>);
    registry.register("minus", BlockType::Normal, 2, minus::<M>);
    registry.register("mult", BlockType::Normal, 2, mult::<M>);
    registry.register("div", BlockType::Normal, 2, div::<M>);
    registry.register("rem", BlockType::Normal, 2, rem::<M>);
    registry.register("pow", BlockType::Normal, 2, pow::<M>);
    registry.register("math", BlockType::Normal, 2, math::<M>);
    registry.register("pi", BlockType::Normal, 0, pi::<M>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

fn binary<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    op: Op,
) -> CompileResult<BlockOutput> {
    if let FuncArg::Float(left) = argv[0] {
        let right = gen.to_float(&argv[1])?;
        let result = match op {
            Op::Add => gen.builder.ins().fadd(left, right),
            Op::Sub => gen.builder.ins().fsub(left, right),
            Op::Mul => gen.builder.ins().fmul(left, right),
            Op::Div => gen.builder.ins().fdiv(left, right),
            Op::Rem => gen.call_value("scrap_float_rem", &[left, right])?,
        };
        return value(FuncArg::Float(result));
    }

    let left = gen.to_integer(&argv[0])?;
    let result = match op {
        Op::Add => {
            let right = gen.to_integer(&argv[1])?;
            gen.builder.ins().iadd(left, right)
        }
        Op::Sub => {
            let right = gen.to_integer(&argv[1])?;
            gen.builder.ins().isub(left, right)
        }
        Op::Mul => {
            let right = gen.to_integer(&argv[1])?;
            gen.builder.ins().imul(left, right)
        }
        Op::Div | Op::Rem => int_divide(gen, left, &argv[1], op)?,
    };
    value(FuncArg::Integer(result))
}

/// Integer `div`/`rem`; a runtime zero divisor yields 0 and `MIN / -1` wraps
fn int_divide<M: Module>(
    gen: &mut Codegen<'_, M>,
    left: Value,
    divisor: &FuncArg,
    op: Op,
) -> CompileResult<Value> {
    if let FuncArg::Literal(literal) = divisor {
        return match text::parse_leading_int(literal.as_bytes()) {
            0 => Err(gen.error("Division by zero")),
            -1 if op == Op::Div => Ok(gen.builder.ins().ineg(left)),
            -1 => Ok(gen.int_const(0)),
            n => {
                let right = gen.int_const(n);
                Ok(match op {
                    Op::Div => gen.builder.ins().sdiv(left, right),
                    _ => gen.builder.ins().srem(left, right),
                })
            }
        };
    }

    let right = gen.to_integer(divisor)?;
    let nonzero = gen.builder.create_block();
    let merge = gen.builder.create_block();
    let result = gen.builder.append_block_param(merge, CraneliftTypes::INT);

    let zero = gen.int_const(0);
    gen.builder.ins().brif(right, nonzero, &[], merge, &[zero]);

    gen.builder.switch_to_block(nonzero);
    let is_neg_one = gen.builder.ins().icmp_imm(IntCC::Equal, right, -1);
    let one = gen.int_const(1);
    let safe = gen.builder.ins().select(is_neg_one, one, right);
    let quotient = match op {
        Op::Div => {
            let plain = gen.builder.ins().sdiv(left, safe);
            let negated = gen.builder.ins().ineg(left);
            gen.builder.ins().select(is_neg_one, negated, plain)
        }
        _ => {
            let plain = gen.builder.ins().srem(left, safe);
            let zero = gen.int_const(0);
            gen.builder.ins().select(is_neg_one, zero, plain)
        }
    };
    gen.builder.ins().jump(merge, &[quotient]);

    gen.builder.switch_to_block(merge);
    Ok(result)
}

fn plus<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    binary(gen, argv, Op::Add)
}

fn minus<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    binary(gen, argv, Op::Sub)
}

fn mult<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    binary(gen, argv, Op::Mul)
}

fn div<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    binary(gen, argv, Op::Div)
}

fn rem<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    binary(gen, argv, Op::Rem)
}

fn pow<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    if let FuncArg::Float(base) = argv[0] {
        let exp = gen.to_float(&argv[1])?;
        let result = gen.call_value("scrap_float_pow", &[base, exp])?;
        return value(FuncArg::Float(result));
    }
    let base = gen.to_integer(&argv[0])?;
    let exp = gen.to_integer(&argv[1])?;
    let result = gen.call_value("scrap_int_pow", &[base, exp])?;
    value(FuncArg::Integer(result))
}

/// `math(op, x)`, `op` being the dropdown label
fn math<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let FuncArg::Literal(name) = &argv[0] else {
        return Err(gen.error(format!(
            "Invalid data type {}, expected literal",
            argv[0].data_type().name()
        )));
    };
    let op = MathOp::from_name(name)
        .ok_or_else(|| gen.error(format!("Invalid math function \"{}\"", name)))?;

    let x = gen.to_float(&argv[1])?;
    let op = gen.int_const(op as i64);
    let result = gen.call_value("scrap_math", &[op, x])?;
    value(FuncArg::Float(result))
}

fn pi<M: Module>(
    gen: &mut Codegen<'_, M>,
    _argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let pi = gen.float_const(PI);
    value(FuncArg::Float(pi))
}
