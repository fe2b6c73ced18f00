//! Per-function code generator
//!
//! [`Codegen`] walks chains block by block, evaluates arguments depth first,
//! and dispatches each block to its registered generation callback. It also
//! owns the plumbing every callback needs: runtime calls, literal data,
//! variables, root scopes and cancellation polls.

use std::collections::HashMap;

use cranelift_codegen::ir::{
    self, types, FuncRef, GlobalValue, Inst, InstBuilder, StackSlot, StackSlotData, StackSlotKind,
    Value,
};
use cranelift_frontend::FunctionBuilder;
use cranelift_module::{DataDescription, DataId, FuncId, Linkage, Module};
use scrap_runtime::text;

use crate::ast::{Argument, Block, BlockRef, Program};
use crate::blocks::{BlockSpec, BlockType, Registry};

use super::context::{CompilationContext, ControlFrame, Storage, Variable};
use super::signatures;
use super::types::{mem_flags, CraneliftTypes};
use super::{
    BlockOutput, CompileError, CompileResult, ControlState, DataType, FuncArg, Symbols,
    UserFunction, MAX_FUNCTION_PARAMS,
};

/// Which native function is being generated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionKind {
    /// `scrap_main`, holding every `on_start` chain
    Main,
    /// Body of the user-defined block `blockdef`
    User { blockdef: String },
}

/// How a block id is lowered
enum Resolved<'r, M: Module> {
    Builtin(&'r BlockSpec<M>),
    Call(UserFunction),
    Param(usize),
}

impl<M: Module> Resolved<'_, M> {
    fn block_type(&self) -> BlockType {
        match self {
            Resolved::Builtin(spec) => spec.ty,
            Resolved::Call(_) | Resolved::Param(_) => BlockType::Normal,
        }
    }
}

/// Code generator for one native function
pub struct Codegen<'a, M: Module> {
    pub builder: FunctionBuilder<'a>,
    module: &'a mut M,
    symbols: &'a mut Symbols,
    pub cx: &'a mut CompilationContext,
    registry: &'a Registry<M>,
    program: &'a Program,
    kind: FunctionKind,

    /// The `ExecContext` pointer parameter
    ctx_value: Value,
    /// `any` parameters of a user function
    params: Vec<Value>,

    /// Shared target of every cancellation poll
    exit_block: Option<ir::Block>,
    /// Block created for the scope being opened
    control_block: Option<ir::Block>,
    /// Block being lowered, for error attribution
    current: BlockRef,

    runtime_refs: HashMap<&'static str, FuncRef>,
    user_refs: HashMap<FuncId, FuncRef>,
    data_values: HashMap<DataId, GlobalValue>,
}

impl<'a, M: Module> Codegen<'a, M> {
    pub fn new(
        mut builder: FunctionBuilder<'a>,
        module: &'a mut M,
        symbols: &'a mut Symbols,
        cx: &'a mut CompilationContext,
        registry: &'a Registry<M>,
        program: &'a Program,
        kind: FunctionKind,
    ) -> Self {
        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        builder.seal_block(entry);

        let mut params = builder.block_params(entry).to_vec();
        let ctx_value = params.remove(0);

        Self {
            builder,
            module,
            symbols,
            cx,
            registry,
            program,
            kind,
            ctx_value,
            params,
            exit_block: None,
            control_block: None,
            current: BlockRef::new(0, 0),
            runtime_refs: HashMap::new(),
            user_refs: HashMap::new(),
            data_values: HashMap::new(),
        }
    }

    /// The `ExecContext` pointer
    pub fn ctx(&self) -> Value {
        self.ctx_value
    }

    /// The block currently being lowered
    pub fn at(&self) -> &BlockRef {
        &self.current
    }

    pub fn kind(&self) -> &FunctionKind {
        &self.kind
    }

    /// User error attributed to the current block
    pub fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::user(&self.current, message)
    }

    /// Internal error attributed to the current block
    pub fn internal(&self, message: impl Into<String>) -> CompileError {
        CompileError::internal(Some(&self.current), message)
    }

    /// Block created by the BEGIN phase of the scope being opened
    pub fn control_block(&self) -> CompileResult<ir::Block> {
        self.control_block
            .ok_or_else(|| self.internal("Invalid control state"))
    }

    // =========================================================================
    // Chains
    // =========================================================================

    /// Lower one chain into the current function
    pub fn compile_chain(&mut self, index: usize) -> CompileResult<()> {
        let program = self.program;
        let chain = program
            .chains
            .get(index)
            .ok_or_else(|| CompileError::internal(None, format!("No chain {}", index)))?;
        self.cx.reset_chain();

        for (position, block) in chain.blocks.iter().enumerate() {
            let at = BlockRef::new(index, position);
            self.current = at.clone();

            let block_type = self.resolve(&block.id)?.block_type();
            match block_type {
                BlockType::Hat => {
                    if position != 0 {
                        return Err(self.error(format!(
                            "Block \"{}\" can only start a chain",
                            block.id
                        )));
                    }
                    self.evaluate_block(block, &at, ControlState::Normal, None)?;
                    self.cx.push_opened(&at)?;
                }
                BlockType::Normal => {
                    self.evaluate_block(block, &at, ControlState::Normal, None)?;
                    self.poll()?;
                }
                BlockType::Control => {
                    self.evaluate_block(block, &at, ControlState::Begin, None)?;
                    self.push_begin(&at)?;
                }
                BlockType::End | BlockType::ControlEnd => {
                    let opener_at = self.cx.pop_control(&at)?;
                    let opener = opener_at
                        .resolve(program)
                        .ok_or_else(|| CompileError::internal(Some(&at), "Invalid control state"))?;
                    let handled = self.evaluate_block(opener, &opener_at, ControlState::End, None)?;

                    if block_type == BlockType::ControlEnd {
                        self.evaluate_block(block, &at, ControlState::Begin, Some(handled))?;
                        self.push_begin(&at)?;
                    }
                }
            }
        }

        self.close_chain()
    }

    fn push_begin(&mut self, at: &BlockRef) -> CompileResult<()> {
        if self.cx.push_opened(at)? {
            Ok(())
        } else {
            Err(CompileError::internal(Some(at), "Invalid control state"))
        }
    }

    /// Check that the chain left exactly the frames its function expects
    fn close_chain(&mut self) -> CompileResult<()> {
        let innermost = self.cx.take_innermost();
        match (&self.kind, innermost) {
            (FunctionKind::Main, None) => Ok(()),
            (FunctionKind::User { .. }, Some(open)) if open.frame == ControlFrame::Function => {
                if self.cx.control_depth() == 0 {
                    Ok(())
                } else {
                    Err(self.internal("Unterminated control block"))
                }
            }
            (_, Some(open)) => Err(CompileError::internal(
                Some(&open.block),
                "Unterminated control block",
            )),
            (FunctionKind::User { .. }, None) => Err(self.internal("Invalid control state")),
        }
    }

    /// Emit the `main` prologue: save the root stack and open its root scope
    pub fn begin_main(&mut self) -> CompileResult<()> {
        let ctx = self.ctx_value;
        self.call("scrap_gc_root_save", &[ctx])?;
        self.gc_root_begin()
    }

    /// Emit the epilogue and the shared exit path, then finalize the IR
    pub fn finish(mut self) -> CompileResult<()> {
        let ctx = self.ctx_value;
        self.gc_root_end()?;
        if self.cx.gc_depth() != 0 {
            return Err(self.internal("Gc stack overflow"));
        }
        self.call("scrap_gc_root_restore", &[ctx])?;
        self.emit_function_return()?;

        if let Some(exit) = self.exit_block {
            self.builder.switch_to_block(exit);
            self.call("scrap_gc_root_restore", &[ctx])?;
            self.emit_function_return()?;
        }

        self.builder.seal_all_blocks();
        self.builder.finalize();
        Ok(())
    }

    fn emit_function_return(&mut self) -> CompileResult<()> {
        match self.kind {
            FunctionKind::Main => {
                self.builder.ins().return_(&[]);
            }
            FunctionKind::User { .. } => {
                let nothing = self.call_value("scrap_any_nothing", &[])?;
                self.builder.ins().return_(&[nothing]);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    fn resolve(&self, id: &str) -> CompileResult<Resolved<'a, M>> {
        let registry: &'a Registry<M> = self.registry;
        if let Some(spec) = registry.get(id) {
            return Ok(Resolved::Builtin(spec));
        }
        if let Some(func) = self.symbols.functions.get(id) {
            return Ok(Resolved::Call(func.clone()));
        }
        if let Some(owner) = self.symbols.param_owners.get(id) {
            return match &self.kind {
                FunctionKind::User { blockdef } if blockdef == owner => self
                    .symbols
                    .functions
                    .get(owner)
                    .and_then(|func| func.params.iter().position(|param| param == id))
                    .map(Resolved::Param)
                    .ok_or_else(|| self.error("Could not find function definition for argument")),
                FunctionKind::User { .. } => {
                    Err(self.error("Could not find function definition for argument"))
                }
                FunctionKind::Main => {
                    Err(self.error("Function argument block used outside of function"))
                }
            };
        }
        Err(self.internal(format!(
            "Tried to compile block \"{}\" without implementation",
            id
        )))
    }

    /// Lower one block in the given phase and return its value
    ///
    /// `prev` is the result of the scope a CONTROLEND block continues; it is
    /// passed to the callback as the first argument.
    pub fn evaluate_block(
        &mut self,
        block: &'a Block,
        at: &BlockRef,
        state: ControlState,
        prev: Option<FuncArg>,
    ) -> CompileResult<FuncArg> {
        self.current = at.clone();
        let resolved = self.resolve(&block.id)?;

        if state == ControlState::Begin {
            let control = self.builder.create_block();
            self.builder.ins().jump(control, &[]);
            self.builder.switch_to_block(control);
            self.control_block = Some(control);
            self.cx.push_variable_frame(at)?;
        }

        let mut argv = Vec::with_capacity(block.args.len() + 1);
        argv.extend(prev);
        if state != ControlState::End {
            for (index, arg) in block.args.iter().enumerate() {
                let value = match arg {
                    Argument::Text(text) | Argument::Const(text) => FuncArg::Literal(text.clone()),
                    Argument::Blockdef(id) => FuncArg::Blockdef(id.clone()),
                    Argument::Color(color) => {
                        self.current = at.clone();
                        self.color_literal(color)?
                    }
                    Argument::Block(inner) => {
                        let child = at.child(index);
                        self.current = child.clone();
                        if self.resolve(&inner.id)?.block_type() != BlockType::Normal {
                            return Err(self.error(format!(
                                "Block \"{}\" cannot be used as an argument",
                                inner.id
                            )));
                        }
                        self.evaluate_block(inner, &child, ControlState::Normal, None)?
                    }
                };
                argv.push(value);
            }
        }
        self.current = at.clone();

        match state {
            ControlState::Begin => self.cx.save_dirty(),
            ControlState::End => {
                self.poll()?;
                self.cx.pop_variable_frame(at)?;
                self.cx.restore_dirty();
            }
            ControlState::Normal => {}
        }

        let output = match resolved {
            Resolved::Builtin(spec) => {
                if state != ControlState::End && block.args.len() < spec.min_args {
                    return Err(self.error(format!(
                        "Not enough arguments passed to block \"{}\". Expected at least {}, got {}",
                        block.id,
                        spec.min_args,
                        block.args.len()
                    )));
                }
                (spec.callback)(self, &argv, state)?
            }
            Resolved::Call(func) => self.call_user(&func, &argv)?,
            Resolved::Param(index) => BlockOutput::Value(FuncArg::Any(self.params[index])),
        };

        if !at.has_parent() && self.cx.gc_dirty {
            let ctx = self.ctx_value;
            self.call("scrap_gc_flush", &[ctx])?;
            self.cx.gc_dirty = false;
        }
        Ok(output.into_arg())
    }

    fn color_literal(&mut self, color: &str) -> CompileResult<FuncArg> {
        let value = text::parse_color(color)
            .ok_or_else(|| self.error(format!("Invalid color \"{}\"", color)))?;
        Ok(FuncArg::Color(self.int_const(value)))
    }

    // =========================================================================
    // Runtime calls
    // =========================================================================

    /// Emit a call to a runtime function from the signature table
    ///
    /// Allocating calls mark the statement dirty and the innermost root
    /// scope as required.
    pub fn call(&mut self, name: &'static str, args: &[Value]) -> CompileResult<Inst> {
        let func = signatures::lookup(name)
            .ok_or_else(|| self.internal(format!("Unknown runtime function \"{}\"", name)))?;

        let func_ref = match self.runtime_refs.get(func.name) {
            Some(func_ref) => *func_ref,
            None => {
                let func_id = match self.symbols.runtime.get(func.name) {
                    Some(id) => *id,
                    None => {
                        let mut sig = self.module.make_signature();
                        func.fill_signature(&mut sig);
                        let id = self
                            .module
                            .declare_function(func.name, Linkage::Import, &sig)
                            .map_err(|e| CompileError::backend(e.to_string()))?;
                        self.symbols.runtime.insert(func.name, id);
                        id
                    }
                };
                let func_ref = self.module.declare_func_in_func(func_id, self.builder.func);
                self.runtime_refs.insert(func.name, func_ref);
                func_ref
            }
        };

        if func.allocates {
            self.mark_gc();
        }
        Ok(self.builder.ins().call(func_ref, args))
    }

    /// Emit a runtime call and return its result
    pub fn call_value(&mut self, name: &'static str, args: &[Value]) -> CompileResult<Value> {
        let inst = self.call(name, args)?;
        self.builder
            .inst_results(inst)
            .first()
            .copied()
            .ok_or_else(|| self.internal(format!("Runtime function \"{}\" returns no value", name)))
    }

    /// Record that the current statement allocated
    pub fn mark_gc(&mut self) {
        self.cx.gc_dirty = true;
        self.cx.require_gc_block();
    }

    /// Call a user-defined block, boxing every argument to `any`
    pub fn call_user(
        &mut self,
        func: &UserFunction,
        argv: &[FuncArg],
    ) -> CompileResult<BlockOutput> {
        if argv.len() > MAX_FUNCTION_PARAMS {
            return Err(self.error(format!(
                "Too many parameters passed into function. Got {}/{}",
                argv.len(),
                MAX_FUNCTION_PARAMS
            )));
        }
        if argv.len() != func.params.len() {
            return Err(self.error(format!(
                "Block \"{}\" takes {} arguments, got {}",
                func.blockdef,
                func.params.len(),
                argv.len()
            )));
        }

        let mut args = Vec::with_capacity(argv.len() + 1);
        args.push(self.ctx_value);
        for arg in argv {
            args.push(self.to_any(arg)?);
        }

        let func_ref = match self.user_refs.get(&func.id) {
            Some(func_ref) => *func_ref,
            None => {
                let func_ref = self.module.declare_func_in_func(func.id, self.builder.func);
                self.user_refs.insert(func.id, func_ref);
                func_ref
            }
        };

        self.mark_gc();
        let inst = self.builder.ins().call(func_ref, &args);
        let result = self.builder.inst_results(inst)[0];
        // The callee returns nothing when it unwound on an abort
        self.poll()?;
        Ok(BlockOutput::Value(FuncArg::Any(result)))
    }

    // =========================================================================
    // Constants and data
    // =========================================================================

    pub fn int_const(&mut self, value: i64) -> Value {
        self.builder.ins().iconst(CraneliftTypes::INT, value)
    }

    pub fn bool_const(&mut self, value: bool) -> Value {
        self.builder.ins().iconst(CraneliftTypes::BOOL, i64::from(value))
    }

    pub fn float_const(&mut self, value: f64) -> Value {
        self.builder.ins().f64const(value)
    }

    /// Address of a NUL-terminated copy of `text` in read-only data
    pub fn literal_ptr(&mut self, text: &str) -> CompileResult<Value> {
        let data_id = match self.symbols.literals.get(text) {
            Some(id) => *id,
            None => {
                let id = self
                    .module
                    .declare_anonymous_data(false, false)
                    .map_err(|e| CompileError::backend(e.to_string()))?;
                let mut bytes = Vec::with_capacity(text.len() + 1);
                bytes.extend_from_slice(text.as_bytes());
                bytes.push(0);

                let mut desc = DataDescription::new();
                desc.define(bytes.into_boxed_slice());
                self.module
                    .define_data(id, &desc)
                    .map_err(|e| CompileError::backend(e.to_string()))?;
                self.symbols.literals.insert(text.to_string(), id);
                id
            }
        };
        Ok(self.data_addr(data_id))
    }

    fn data_addr(&mut self, data_id: DataId) -> Value {
        let global = match self.data_values.get(&data_id) {
            Some(global) => *global,
            None => {
                let global = self.module.declare_data_in_func(data_id, self.builder.func);
                self.data_values.insert(data_id, global);
                global
            }
        };
        self.builder.ins().global_value(CraneliftTypes::POINTER, global)
    }

    // =========================================================================
    // Root scopes and cancellation
    // =========================================================================

    /// Open a root scope; the call is dropped again if the scope never allocates
    pub fn gc_root_begin(&mut self) -> CompileResult<()> {
        let ctx = self.ctx_value;
        let inst = self.call("scrap_gc_root_begin", &[ctx])?;
        self.cx.push_gc_block(inst, Some(&self.current))
    }

    /// Close the innermost root scope
    pub fn gc_root_end(&mut self) -> CompileResult<()> {
        let block = self.cx.pop_gc_block(Some(&self.current))?;
        if block.required {
            let ctx = self.ctx_value;
            self.call("scrap_gc_root_end", &[ctx])?;
        } else {
            self.builder.func.layout.remove_inst(block.begin);
        }
        Ok(())
    }

    /// Branch to the exit path when the program must stop
    pub fn poll(&mut self) -> CompileResult<()> {
        let ctx = self.ctx_value;
        let stop = self.call_value("scrap_poll_stop", &[ctx])?;
        let exit = *self
            .exit_block
            .get_or_insert_with(|| self.builder.create_block());
        let resume = self.builder.create_block();
        self.builder.ins().brif(stop, exit, &[], resume, &[]);
        self.builder.switch_to_block(resume);
        Ok(())
    }

    /// Lower `return`: unwind this function's root scopes and return `value`
    pub fn emit_return(&mut self, value: &FuncArg) -> CompileResult<()> {
        let ctx = self.ctx_value;
        self.call("scrap_gc_root_restore", &[ctx])?;
        match self.kind {
            FunctionKind::Main => {
                self.builder.ins().return_(&[]);
            }
            FunctionKind::User { .. } => {
                // Keep the result alive in the caller's scope
                if let (true, Some(value)) = (value.data_type().is_gc(), value.value()) {
                    self.call("scrap_gc_add_temp_root", &[ctx, value])?;
                }
                let result = self.to_any(value)?;
                self.builder.ins().return_(&[result]);
            }
        }

        let after = self.builder.create_block();
        self.builder.switch_to_block(after);
        self.cx.gc_dirty = false;
        Ok(())
    }

    // =========================================================================
    // Variables
    // =========================================================================

    /// Declare a variable in the innermost scope, or as a global at the top of `main`
    pub fn declare_variable(&mut self, name: &str, value: &FuncArg) -> CompileResult<()> {
        let ty = value.data_type();
        let global = self.kind == FunctionKind::Main && self.cx.control_depth() == 0;
        let ctx = self.ctx_value;

        let storage = match value {
            FuncArg::Literal(text) => Storage::Constant(text.clone()),
            FuncArg::Nothing => {
                return Err(
                    self.error("Cannot declare a variable with zero sized type (i.e. Nothing)")
                );
            }
            FuncArg::Blockdef(_) => {
                return Err(self.error("Cannot declare a variable of type blockdef"));
            }
            _ => {
                let value = value
                    .value()
                    .ok_or_else(|| self.internal("Runtime value without SSA value"))?;
                if global {
                    let data_id = self
                        .module
                        .declare_anonymous_data(true, false)
                        .map_err(|e| CompileError::backend(e.to_string()))?;
                    let mut desc = DataDescription::new();
                    desc.define_zeroinit(8);
                    desc.set_align(8);
                    self.module
                        .define_data(data_id, &desc)
                        .map_err(|e| CompileError::backend(e.to_string()))?;

                    let addr = self.data_addr(data_id);
                    self.builder.ins().store(mem_flags::aligned(), value, addr, 0);
                    if ty.is_gc() {
                        self.call("scrap_gc_add_root", &[ctx, addr])?;
                        self.cx.require_gc_block();
                    }
                    Storage::Global(data_id)
                } else {
                    let slot = self.alloc_slot();
                    self.builder.ins().stack_store(value, slot, 0);
                    if ty.is_gc() {
                        let addr = self.builder.ins().stack_addr(CraneliftTypes::POINTER, slot, 0);
                        self.call("scrap_gc_add_root", &[ctx, addr])?;
                        self.cx.require_gc_block();
                    }
                    Storage::Slot(slot)
                }
            }
        };

        let variable = Variable {
            name: name.to_string(),
            ty,
            storage,
        };
        if global {
            self.symbols.globals.push(variable);
        } else {
            self.cx.declare(variable);
        }
        Ok(())
    }

    /// Read a variable
    pub fn load_variable(&mut self, name: &str) -> CompileResult<FuncArg> {
        let variable = self.lookup_variable(name)?;
        let value = match &variable.storage {
            Storage::Constant(text) => return Ok(FuncArg::Literal(text.clone())),
            Storage::Slot(slot) => {
                let clif = self.clif_type(variable.ty)?;
                self.builder.ins().stack_load(clif, *slot, 0)
            }
            Storage::Global(data_id) => {
                let clif = self.clif_type(variable.ty)?;
                let addr = self.data_addr(*data_id);
                self.builder.ins().load(clif, mem_flags::aligned(), addr, 0)
            }
        };
        FuncArg::from_value(variable.ty, value)
            .ok_or_else(|| self.internal(format!("Variable \"{}\" has no runtime type", name)))
    }

    /// Assign to a variable; the value must have the declared type
    pub fn store_variable(&mut self, name: &str, value: &FuncArg) -> CompileResult<()> {
        let variable = self.lookup_variable(name)?;
        if variable.ty != value.data_type() {
            return Err(self.error(format!(
                "Assign to variable \"{}\" of type {} with incompatible type {}",
                name,
                variable.ty.name(),
                value.data_type().name()
            )));
        }

        match (&variable.storage, value) {
            (Storage::Constant(_), FuncArg::Literal(text)) => {
                if let Some(variable) = self.variable_mut(name) {
                    variable.storage = Storage::Constant(text.clone());
                }
            }
            (Storage::Slot(slot), _) => {
                let value = value
                    .value()
                    .ok_or_else(|| self.internal("Runtime value without SSA value"))?;
                self.builder.ins().stack_store(value, *slot, 0);
            }
            (Storage::Global(data_id), _) => {
                let value = value
                    .value()
                    .ok_or_else(|| self.internal("Runtime value without SSA value"))?;
                let addr = self.data_addr(*data_id);
                self.builder.ins().store(mem_flags::aligned(), value, addr, 0);
            }
            (Storage::Constant(_), _) => {
                return Err(self.internal("Constant variable with runtime value"));
            }
        }
        Ok(())
    }

    fn lookup_variable(&mut self, name: &str) -> CompileResult<Variable> {
        self.variable_mut(name).map(|var| var.clone()).ok_or_else(|| {
            self.error(format!(
                "Variable with name \"{}\" does not exist in the current scope",
                name
            ))
        })
    }

    fn variable_mut(&mut self, name: &str) -> Option<&mut Variable> {
        if let Some(local) = self.cx.find_local_mut(name) {
            return Some(local);
        }
        self.symbols
            .globals
            .iter_mut()
            .rev()
            .find(|var| var.name == name)
    }

    fn alloc_slot(&mut self) -> StackSlot {
        if let Some(slot) = self.cx.reuse_slot() {
            return slot;
        }
        let slot = self
            .builder
            .create_sized_stack_slot(StackSlotData::new(StackSlotKind::ExplicitSlot, 8, 3));
        self.cx.add_slot(slot);
        slot
    }

    fn clif_type(&self, ty: DataType) -> CompileResult<ir::Type> {
        match ty {
            DataType::Integer | DataType::Color => Ok(CraneliftTypes::INT),
            DataType::Float => Ok(CraneliftTypes::FLOAT),
            DataType::Bool => Ok(types::I8),
            DataType::String | DataType::List | DataType::Any => Ok(CraneliftTypes::POINTER),
            DataType::Nothing | DataType::Literal | DataType::Blockdef => {
                Err(self.internal(format!("Type {} has no machine representation", ty.name())))
            }
        }
    }
}
