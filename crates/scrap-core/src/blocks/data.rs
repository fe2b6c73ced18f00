//! Variables and lists

use cranelift_module::Module;

use crate::compiler::{BlockOutput, Codegen, CompileResult, ControlState, FuncArg};

use super::{value, BlockType, Registry};

pub(super) fn register<M: Module>(registry: &mut Registry<M>) {
    registry.register("decl_var", BlockType::Normal, 2, decl_var::<M>);
    registry.register("get_var", BlockType::Normal, 1, get_var::<M>);
    registry.register("set_var", BlockType::Normal, 2, set_var::<M>);
    registry.register("create_list", BlockType::Normal, 0, create_list::<M>);
    registry.register("list_add", BlockType::Normal, 2, list_add::<M>);
    registry.register("list_get", BlockType::Normal, 2, list_get::<M>);
    registry.register("list_set", BlockType::Normal, 3, list_set::<M>);
    registry.register("list_length", BlockType::Normal, 1, list_length::<M>);
}

/// Variable names must be written into the block, not computed
fn variable_name<'v, M: Module>(gen: &Codegen<'_, M>, arg: &'v FuncArg) -> CompileResult<&'v str> {
    match arg {
        FuncArg::Literal(name) => Ok(name),
        other => Err(gen.error(format!(
            "Invalid data type {}, expected literal",
            other.data_type().name()
        ))),
    }
}

fn decl_var<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    if gen.at().has_parent() {
        return Err(gen.error("Variable declarations are not allowed inside an argument"));
    }
    let name = variable_name(gen, &argv[0])?;
    if name.is_empty() {
        return Err(gen.error("Cannot declare variable with empty name"));
    }
    gen.declare_variable(name, &argv[1])?;
    value(argv[1].clone())
}

fn get_var<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let name = variable_name(gen, &argv[0])?;
    value(gen.load_variable(name)?)
}

fn set_var<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let name = variable_name(gen, &argv[0])?;
    gen.store_variable(name, &argv[1])?;
    value(argv[1].clone())
}

fn create_list<M: Module>(
    gen: &mut Codegen<'_, M>,
    _argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let ctx = gen.ctx();
    let list = gen.call_value("scrap_list_new", &[ctx])?;
    value(FuncArg::List(list))
}

fn list_add<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let list = gen.to_list(&argv[0])?;
    let (kind, bits) = gen.to_value_bits(&argv[1])?;
    let ctx = gen.ctx();
    gen.call("scrap_list_add", &[ctx, list, kind, bits])?;
    Ok(BlockOutput::Omit)
}

fn list_get<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let list = gen.to_list(&argv[0])?;
    let index = gen.to_integer(&argv[1])?;
    let ctx = gen.ctx();
    let item = gen.call_value("scrap_list_get", &[ctx, list, index])?;
    value(FuncArg::Any(item))
}

fn list_set<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let list = gen.to_list(&argv[0])?;
    let index = gen.to_integer(&argv[1])?;
    let (kind, bits) = gen.to_value_bits(&argv[2])?;
    let ctx = gen.ctx();
    gen.call("scrap_list_set", &[ctx, list, index, kind, bits])?;
    Ok(BlockOutput::Omit)
}

fn list_length<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _: ControlState,
) -> CompileResult<BlockOutput> {
    let list = gen.to_list(&argv[0])?;
    let len = gen.call_value("scrap_list_length", &[list])?;
    value(FuncArg::Integer(len))
}
