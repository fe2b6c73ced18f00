//! Hats, scopes and `return`
//!
//! Control blocks are lowered twice: at BEGIN when the chain walker meets
//! the block, and at END when the matching `end` (or the next CONTROLEND
//! block) closes it. BEGIN leaves a [`ControlFrame`] with the IR blocks the
//! END phase has to wire up.

use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::InstBuilder;
use cranelift_module::Module;

use crate::compiler::{
    BlockOutput, Codegen, CompileResult, ControlFrame, ControlState, CraneliftTypes, FuncArg,
    FunctionKind,
};

use super::{first, value, BlockType, Registry};

pub(super) fn register<M: Module>(registry: &mut Registry<M>) {
    registry.register("on_start", BlockType::Hat, 0, on_start::<M>);
    registry.register("define_block", BlockType::Hat, 1, define_block::<M>);
    registry.register("end", BlockType::End, 0, end::<M>);
    registry.register("if", BlockType::Control, 1, block_if::<M>);
    registry.register("else_if", BlockType::ControlEnd, 1, block_else_if::<M>);
    registry.register("else", BlockType::ControlEnd, 0, block_else::<M>);
    registry.register("while", BlockType::Control, 1, block_while::<M>);
    registry.register("repeat", BlockType::Control, 1, repeat::<M>);
    registry.register("loop", BlockType::Control, 0, block_loop::<M>);
    registry.register("do_nothing", BlockType::Control, 0, do_nothing::<M>);
    registry.register("return", BlockType::Normal, 0, block_return::<M>);
}

fn invalid_state<M: Module, T>(gen: &Codegen<'_, M>) -> CompileResult<T> {
    Err(gen.internal("Invalid control state"))
}

/// Frame staged for the END phase of the block being closed
fn close<M: Module>(gen: &mut Codegen<'_, M>) -> CompileResult<ControlFrame> {
    let at = gen.at().clone();
    gen.cx.close_frame(&at)
}

fn on_start<M: Module>(
    _gen: &mut Codegen<'_, M>,
    _argv: &[FuncArg],
    _state: ControlState,
) -> CompileResult<BlockOutput> {
    Ok(BlockOutput::Omit)
}

fn end<M: Module>(
    _gen: &mut Codegen<'_, M>,
    _argv: &[FuncArg],
    _state: ControlState,
) -> CompileResult<BlockOutput> {
    Ok(BlockOutput::Omit)
}

/// Function prologue: save the caller's root depth and open the body scope
fn define_block<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _state: ControlState,
) -> CompileResult<BlockOutput> {
    let arg = first(argv);
    if !matches!(arg, FuncArg::Blockdef(_)) {
        return Err(gen.error(format!(
            "Invalid data type {}, expected blockdef",
            arg.data_type().name()
        )));
    }
    if !matches!(gen.kind(), FunctionKind::User { .. }) {
        return invalid_state(gen);
    }

    let ctx = gen.ctx();
    gen.call("scrap_gc_root_save", &[ctx])?;
    gen.gc_root_begin()?;
    // Unwind before recursing any deeper once the root stack overflowed
    gen.poll()?;
    gen.cx.open_frame(ControlFrame::Function);
    Ok(BlockOutput::Omit)
}

fn block_if<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    state: ControlState,
) -> CompileResult<BlockOutput> {
    match state {
        ControlState::Begin => {
            let cond = gen.to_bool(&first(argv))?;
            let then = gen.builder.create_block();
            let fail = gen.builder.create_block();
            let end = gen.builder.create_block();
            gen.builder.append_block_param(end, CraneliftTypes::BOOL);

            gen.builder.ins().brif(cond, then, &[], fail, &[]);

            gen.builder.switch_to_block(fail);
            let no = gen.bool_const(false);
            gen.builder.ins().jump(end, &[no]);

            gen.builder.switch_to_block(then);
            gen.gc_root_begin()?;
            gen.cx.open_frame(ControlFrame::If { end });
            Ok(BlockOutput::Omit)
        }
        ControlState::End => match close(gen)? {
            ControlFrame::If { end } | ControlFrame::ElseIf { end } => close_handled(gen, end),
            _ => invalid_state(gen),
        },
        ControlState::Normal => invalid_state(gen),
    }
}

/// Shared END of `if` and `else_if`: the body ran, so the chain is handled
fn close_handled<M: Module>(
    gen: &mut Codegen<'_, M>,
    end: cranelift_codegen::ir::Block,
) -> CompileResult<BlockOutput> {
    gen.gc_root_end()?;
    let yes = gen.bool_const(true);
    gen.builder.ins().jump(end, &[yes]);
    gen.builder.switch_to_block(end);
    let handled = gen.builder.block_params(end)[0];
    value(FuncArg::Bool(handled))
}

/// `argv[0]` is whether an earlier branch of the chain already ran
fn block_else_if<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    state: ControlState,
) -> CompileResult<BlockOutput> {
    match state {
        ControlState::Begin => {
            let handled = gen.to_bool(&first(argv))?;
            let cond = gen.to_bool(argv.get(1).unwrap_or(&FuncArg::Nothing))?;

            let check = gen.builder.create_block();
            let body = gen.builder.create_block();
            let fail = gen.builder.create_block();
            let end = gen.builder.create_block();
            gen.builder.append_block_param(end, CraneliftTypes::BOOL);

            let yes = gen.bool_const(true);
            gen.builder.ins().brif(handled, end, &[yes], check, &[]);

            gen.builder.switch_to_block(check);
            gen.builder.ins().brif(cond, body, &[], fail, &[]);

            gen.builder.switch_to_block(fail);
            let no = gen.bool_const(false);
            gen.builder.ins().jump(end, &[no]);

            gen.builder.switch_to_block(body);
            gen.gc_root_begin()?;
            gen.cx.open_frame(ControlFrame::ElseIf { end });
            Ok(BlockOutput::Omit)
        }
        ControlState::End => match close(gen)? {
            ControlFrame::ElseIf { end } | ControlFrame::If { end } => close_handled(gen, end),
            _ => invalid_state(gen),
        },
        ControlState::Normal => invalid_state(gen),
    }
}

fn block_else<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    state: ControlState,
) -> CompileResult<BlockOutput> {
    match state {
        ControlState::Begin => {
            let handled = gen.to_bool(&first(argv))?;
            let body = gen.builder.create_block();
            let end = gen.builder.create_block();
            gen.builder.ins().brif(handled, end, &[], body, &[]);

            gen.builder.switch_to_block(body);
            gen.gc_root_begin()?;
            gen.cx.open_frame(ControlFrame::Else { end });
            Ok(BlockOutput::Omit)
        }
        ControlState::End => {
            let ControlFrame::Else { end } = close(gen)? else {
                return invalid_state(gen);
            };
            gen.gc_root_end()?;
            gen.builder.ins().jump(end, &[]);
            gen.builder.switch_to_block(end);
            let yes = gen.bool_const(true);
            value(FuncArg::Bool(yes))
        }
        ControlState::Normal => invalid_state(gen),
    }
}

/// The condition is evaluated in the scope's own block, so jumping back to
/// it re-tests the condition
fn block_while<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    state: ControlState,
) -> CompileResult<BlockOutput> {
    match state {
        ControlState::Begin => {
            let header = gen.control_block()?;
            let cond = gen.to_bool(&first(argv))?;
            let body = gen.builder.create_block();
            let end = gen.builder.create_block();
            gen.builder.ins().brif(cond, body, &[], end, &[]);

            gen.builder.switch_to_block(body);
            gen.gc_root_begin()?;
            let flush = gen.cx.opening_dirty();
            gen.cx.open_frame(ControlFrame::While { header, end, flush });
            Ok(BlockOutput::Omit)
        }
        ControlState::End => {
            let ControlFrame::While { header, end, flush } = close(gen)? else {
                return invalid_state(gen);
            };
            gen.gc_root_end()?;
            if flush {
                // Temporaries of the condition belong to the enclosing scope
                let ctx = gen.ctx();
                gen.call("scrap_gc_flush", &[ctx])?;
            }
            gen.builder.ins().jump(header, &[]);
            gen.builder.switch_to_block(end);
            let yes = gen.bool_const(true);
            value(FuncArg::Bool(yes))
        }
        ControlState::Normal => invalid_state(gen),
    }
}

fn repeat<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    state: ControlState,
) -> CompileResult<BlockOutput> {
    match state {
        ControlState::Begin => {
            let count = gen.to_integer(&first(argv))?;
            let header = gen.builder.create_block();
            let counter = gen.builder.append_block_param(header, CraneliftTypes::INT);
            let body = gen.builder.create_block();
            let end = gen.builder.create_block();
            gen.builder.ins().jump(header, &[count]);

            gen.builder.switch_to_block(header);
            let index = gen.builder.ins().iadd_imm(counter, -1);
            let done = gen.builder.ins().icmp_imm(IntCC::SignedLessThan, index, 0);
            gen.builder.ins().brif(done, end, &[], body, &[]);

            gen.builder.switch_to_block(body);
            gen.gc_root_begin()?;
            gen.cx.open_frame(ControlFrame::Repeat {
                header,
                end,
                index,
                count,
            });
            Ok(BlockOutput::Omit)
        }
        ControlState::End => {
            let ControlFrame::Repeat {
                header,
                end,
                index,
                count,
            } = close(gen)?
            else {
                return invalid_state(gen);
            };
            gen.gc_root_end()?;
            gen.builder.ins().jump(header, &[index]);
            gen.builder.switch_to_block(end);
            let ran = gen.builder.ins().icmp_imm(IntCC::SignedGreaterThan, count, 0);
            value(FuncArg::Bool(ran))
        }
        ControlState::Normal => invalid_state(gen),
    }
}

/// Runs until the program is stopped or the function returns
fn block_loop<M: Module>(
    gen: &mut Codegen<'_, M>,
    _argv: &[FuncArg],
    state: ControlState,
) -> CompileResult<BlockOutput> {
    match state {
        ControlState::Begin => {
            let body = gen.builder.create_block();
            gen.builder.ins().jump(body, &[]);
            gen.builder.switch_to_block(body);
            gen.gc_root_begin()?;
            gen.cx.open_frame(ControlFrame::Loop { body });
            Ok(BlockOutput::Omit)
        }
        ControlState::End => {
            let ControlFrame::Loop { body } = close(gen)? else {
                return invalid_state(gen);
            };
            gen.gc_root_end()?;
            gen.builder.ins().jump(body, &[]);

            // Unreachable, keeps the rest of the chain well formed
            let after = gen.builder.create_block();
            gen.builder.switch_to_block(after);
            let no = gen.bool_const(false);
            value(FuncArg::Bool(no))
        }
        ControlState::Normal => invalid_state(gen),
    }
}

fn do_nothing<M: Module>(
    gen: &mut Codegen<'_, M>,
    _argv: &[FuncArg],
    state: ControlState,
) -> CompileResult<BlockOutput> {
    match state {
        ControlState::Begin => {
            gen.gc_root_begin()?;
            gen.cx.open_frame(ControlFrame::DoNothing);
            Ok(BlockOutput::Omit)
        }
        ControlState::End => {
            if close(gen)? != ControlFrame::DoNothing {
                return invalid_state(gen);
            }
            gen.gc_root_end()?;
            value(FuncArg::Nothing)
        }
        ControlState::Normal => invalid_state(gen),
    }
}

fn block_return<M: Module>(
    gen: &mut Codegen<'_, M>,
    argv: &[FuncArg],
    _state: ControlState,
) -> CompileResult<BlockOutput> {
    gen.emit_return(&first(argv))?;
    Ok(BlockOutput::Omit)
}
