//! Timing, randomness, conversions and housekeeping blocks

use cranelift_module::Module;

use crate::compiler::{BlockOutput, Codegen, CompileResult, ControlState, DataType, FuncArg};

use super::{first, value, BlockType, Registry};

pub(super) fn register<M: Module>(registry: &mut Registry<M>) {
    registry.register("sleep", BlockType::Normal, 1, sleep::<M>);
    registry.register("random", BlockType::Normal, 2, random::<M>);
    registry.register("unix_time", BlockType::Normal, 0, unix_time::<M>);
    registry.register("convert_int", BlockType::Normal, 1, convert_int::<M>);
    registry.register("convert_float", BlockType::Normal, 1, convert_float::<M>);
    registry.register("convert_str", BlockType::Normal, 1, convert_str::<M>);
    registry.register("convert_bool", BlockType::Normal, 1, convert_bool::<M>);
    registry.register("convert_color", BlockType::Normal, 1, convert_color::<M>);
    registry.register("typeof", BlockType::Normal, 1, type_of::<M>);
    registry.register("nothing", BlockType::Normal, 0, nothing::<M>);
    registry.register("comment", BlockType::Normal, 0, comment::<M>);
    registry.register("gc_collect", BlockType::Normal, 0, gc_collect::<M>);
}

/// Sleeps `argv[0]` microseconds; stops early when the program is stopped
fn sleep<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let usecs = gen.to_integer(&argv[0])?;
    let ctx = gen.ctx();
    let slept = gen.call_value("scrap_sleep", &[ctx, usecs])?;
    value(FuncArg::Integer(slept))
}

fn random<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let min = gen.to_integer(&argv[0])?;
    let max = gen.to_integer(&argv[1])?;
    let ctx = gen.ctx();
    let result = gen.call_value("scrap_random", &[ctx, min, max])?;
    value(FuncArg::Integer(result))
}

fn unix_time<M: Module>(
    gen: &mut Codegen<'_, M>,
    _argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let now = gen.call_value("scrap_unix_time", &[])?;
    value(FuncArg::Integer(now))
}

fn convert<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    ty: DataType,
) -> CompileResult<BlockOutput> {
    value(gen.cast_to(&argv[0], ty)?)
}

fn convert_int<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    convert(gen, argv, DataType::Integer)
}

fn convert_float<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    convert(gen, argv, DataType::Float)
}

fn convert_str<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    convert(gen, argv, DataType::String)
}

fn convert_bool<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    convert(gen, argv, DataType::Bool)
}

fn convert_color<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    convert(gen, argv, DataType::Color)
}

/// Static type name, or the dynamic kind for `any`
fn type_of<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    match first(argv) {
        FuncArg::Any(v) => {
            let ctx = gen.ctx();
            let name = gen.call_value("scrap_any_type_name", &[ctx, v])?;
            value(FuncArg::String(name))
        }
        other => value(FuncArg::Literal(other.data_type().name().to_string())),
    }
}

fn nothing<M: Module>(
    _gen: &mut Codegen<'_, M>,
    _argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    value(FuncArg::Nothing)
}

fn comment<M: Module>(
    _gen: &mut Codegen<'_, M>,
    _argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    Ok(BlockOutput::Omit)
}

fn gc_collect<M: Module>(
    gen: &mut Codegen<'_, M>,
    _argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let ctx = gen.ctx();
    gen.call("scrap_gc_collect", &[ctx])?;
    Ok(BlockOutput::Omit)
}
