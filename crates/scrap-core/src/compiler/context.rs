//! Control/scope stack machine
//!
//! One [`CompilationContext`] lives for the lowering of one native function.
//! It tracks:
//! - the control stack of open CONTROL/CONTROLEND blocks and their frames
//! - the variable frame stack and the stack-slot arena watermark
//! - the GC-block stack: every emitted `root_begin` and whether its scope
//!   ever needed the collector
//! - the `gc_dirty` flag of the statement being lowered

use cranelift_codegen::ir::{Block, Inst, StackSlot, Value};
use cranelift_module::DataId;

use crate::ast::BlockRef;

use super::{CompileError, CompileResult, DataType};

/// Maximum nesting of open control blocks
pub const CONTROL_STACK_LIMIT: usize = 32_768;

/// Maximum nesting of variable scopes
pub const VARIABLE_STACK_LIMIT: usize = 32_768;

/// Maximum nesting of root scopes
pub const GC_BLOCK_STACK_LIMIT: usize = 32_768;

/// Lowering state of one open control block
#[derive(Debug, Clone, PartialEq)]
pub enum ControlFrame {
    If {
        end: Block,
    },
    ElseIf {
        end: Block,
    },
    Else {
        end: Block,
    },
    While {
        /// Block re-testing the condition
        header: Block,
        end: Block,
        /// The condition allocates, so temporaries are flushed per iteration
        flush: bool,
    },
    Repeat {
        header: Block,
        end: Block,
        /// Remaining iterations after this one
        index: Value,
        count: Value,
    },
    Loop {
        body: Block,
    },
    DoNothing,
    /// Body of a user-defined block, closed at the end of its chain
    Function,
}

/// An open control block and the frame its BEGIN phase produced
#[derive(Debug, Clone)]
pub struct OpenControl {
    pub block: BlockRef,
    pub frame: ControlFrame,
}

/// Where a variable's value lives
#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    /// Literal-typed variables never reach the generated code
    Constant(String),
    Slot(StackSlot),
    /// Module data, for top-level declarations in `main`
    Global(DataId),
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub ty: DataType,
    pub storage: Storage,
}

#[derive(Debug, Clone, Copy)]
struct VariableFrame {
    base: usize,
    slot_mark: usize,
}

/// A `root_begin` call and whether its scope ended up allocating
#[derive(Debug, Clone, Copy)]
pub struct GcBlock {
    pub begin: Inst,
    pub required: bool,
}

/// Compiler bookkeeping for one native function
#[derive(Debug, Default)]
pub struct CompilationContext {
    control: Vec<OpenControl>,
    /// Frame produced by the BEGIN callback, waiting to be pushed
    opening: Option<ControlFrame>,
    /// Frame popped for the END callback
    closing: Option<ControlFrame>,

    variables: Vec<Variable>,
    variable_frames: Vec<VariableFrame>,
    slots: Vec<StackSlot>,
    slots_used: usize,

    gc_blocks: Vec<GcBlock>,
    /// Some call in the current statement allocated
    pub gc_dirty: bool,
    dirty_stack: Vec<bool>,
}

impl CompilationContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset per-chain state; the slot arena stays with the function
    pub fn reset_chain(&mut self) {
        self.control.clear();
        self.opening = None;
        self.closing = None;
        self.variables.clear();
        self.variable_frames.clear();
        self.slots_used = 0;
        self.gc_dirty = false;
        self.dirty_stack.clear();
    }

    // =========================================================================
    // Control stack
    // =========================================================================

    /// Called by BEGIN callbacks to describe the scope they opened
    pub fn open_frame(&mut self, frame: ControlFrame) {
        self.opening = Some(frame);
    }

    /// Called by END callbacks to fetch the frame of the scope they close
    pub fn close_frame(&mut self, at: &BlockRef) -> CompileResult<ControlFrame> {
        self.closing
            .take()
            .ok_or_else(|| CompileError::internal(Some(at), "Invalid control state"))
    }

    /// Push the frame left by the last BEGIN callback, if any
    pub fn push_opened(&mut self, at: &BlockRef) -> CompileResult<bool> {
        let Some(frame) = self.opening.take() else {
            return Ok(false);
        };
        if self.control.len() >= CONTROL_STACK_LIMIT {
            return Err(CompileError::internal(Some(at), "Control stack overflow"));
        }
        self.control.push(OpenControl {
            block: at.clone(),
            frame,
        });
        Ok(true)
    }

    /// Pop the innermost open block and stage its frame for the END callback
    pub fn pop_control(&mut self, at: &BlockRef) -> CompileResult<BlockRef> {
        match self.control.pop() {
            Some(OpenControl {
                frame: ControlFrame::Function,
                block,
            }) => {
                self.control.push(OpenControl {
                    block,
                    frame: ControlFrame::Function,
                });
                Err(CompileError::internal(Some(at), "Control stack underflow"))
            }
            Some(open) => {
                self.closing = Some(open.frame);
                Ok(open.block)
            }
            None => Err(CompileError::internal(Some(at), "Control stack underflow")),
        }
    }

    /// Remove and return the innermost open block
    pub fn take_innermost(&mut self) -> Option<OpenControl> {
        self.control.pop()
    }

    #[must_use]
    pub fn control_depth(&self) -> usize {
        self.control.len()
    }

    // =========================================================================
    // Variables
    // =========================================================================

    pub fn push_variable_frame(&mut self, at: &BlockRef) -> CompileResult<()> {
        if self.variable_frames.len() >= VARIABLE_STACK_LIMIT {
            return Err(CompileError::internal(Some(at), "Variable stack overflow"));
        }
        self.variable_frames.push(VariableFrame {
            base: self.variables.len(),
            slot_mark: self.slots_used,
        });
        Ok(())
    }

    pub fn pop_variable_frame(&mut self, at: &BlockRef) -> CompileResult<()> {
        let frame = self
            .variable_frames
            .pop()
            .ok_or_else(|| CompileError::internal(Some(at), "Variable stack underflow"))?;
        self.variables.truncate(frame.base);
        self.slots_used = frame.slot_mark;
        Ok(())
    }

    pub fn declare(&mut self, variable: Variable) {
        self.variables.push(variable);
    }

    /// Innermost visible local with `name`
    pub fn find_local_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.variables.iter_mut().rev().find(|var| var.name == name)
    }

    /// Reuse a slot released by a closed scope, or report that a new one is needed
    pub fn reuse_slot(&mut self) -> Option<StackSlot> {
        let slot = self.slots.get(self.slots_used).copied()?;
        self.slots_used += 1;
        Some(slot)
    }

    /// Record a freshly created slot as in use
    pub fn add_slot(&mut self, slot: StackSlot) {
        self.slots.truncate(self.slots_used);
        self.slots.push(slot);
        self.slots_used += 1;
    }

    #[must_use]
    pub fn slots_in_use(&self) -> usize {
        self.slots_used
    }

    // =========================================================================
    // GC blocks
    // =========================================================================

    pub fn push_gc_block(&mut self, begin: Inst, at: Option<&BlockRef>) -> CompileResult<()> {
        if self.gc_blocks.len() >= GC_BLOCK_STACK_LIMIT {
            return Err(CompileError::internal(at, "Gc stack overflow"));
        }
        self.gc_blocks.push(GcBlock {
            begin,
            required: false,
        });
        Ok(())
    }

    pub fn pop_gc_block(&mut self, at: Option<&BlockRef>) -> CompileResult<GcBlock> {
        self.gc_blocks
            .pop()
            .ok_or_else(|| CompileError::internal(at, "Gc stack underflow"))
    }

    /// Mark the innermost root scope as needing its `root_begin`
    pub fn require_gc_block(&mut self) {
        if let Some(block) = self.gc_blocks.last_mut() {
            block.required = true;
        }
    }

    #[must_use]
    pub fn gc_depth(&self) -> usize {
        self.gc_blocks.len()
    }

    /// Snapshot `gc_dirty` when a scope opens and start clean inside it
    pub fn save_dirty(&mut self) {
        self.dirty_stack.push(self.gc_dirty);
        self.gc_dirty = false;
    }

    /// Restore the snapshot taken when the scope opened
    pub fn restore_dirty(&mut self) {
        self.gc_dirty = self.dirty_stack.pop().unwrap_or(false);
    }

    /// Snapshot of the scope being opened, valid inside a BEGIN callback
    #[must_use]
    pub fn opening_dirty(&self) -> bool {
        self.dirty_stack.last().copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use cranelift_codegen::entity::EntityRef;

    use super::*;

    fn at() -> BlockRef {
        BlockRef::new(0, 1)
    }

    #[test]
    fn control_frames_balance() {
        let mut cx = CompilationContext::new();
        assert!(!cx.push_opened(&at()).unwrap());

        cx.open_frame(ControlFrame::DoNothing);
        assert!(cx.push_opened(&at()).unwrap());
        assert_eq!(cx.control_depth(), 1);

        let opener = cx.pop_control(&BlockRef::new(0, 2)).unwrap();
        assert_eq!(opener, at());
        assert_eq!(cx.close_frame(&opener).unwrap(), ControlFrame::DoNothing);
        assert!(cx.close_frame(&opener).is_err());
    }

    #[test]
    fn unmatched_end_underflows() {
        let mut cx = CompilationContext::new();
        let err = cx.pop_control(&at()).unwrap_err();
        assert_eq!(err.kind, super::super::CompileErrorKind::Internal);
        assert_eq!(err.message, "Control stack underflow");
    }

    #[test]
    fn function_frame_is_not_closed_by_end() {
        let mut cx = CompilationContext::new();
        cx.open_frame(ControlFrame::Function);
        cx.push_opened(&BlockRef::new(0, 0)).unwrap();

        assert!(cx.pop_control(&at()).is_err());
        assert_eq!(cx.control_depth(), 1);
        assert_eq!(cx.take_innermost().unwrap().frame, ControlFrame::Function);
    }

    #[test]
    fn control_stack_overflows() {
        let mut cx = CompilationContext::new();
        for _ in 0..CONTROL_STACK_LIMIT {
            cx.open_frame(ControlFrame::DoNothing);
            cx.push_opened(&at()).unwrap();
        }
        cx.open_frame(ControlFrame::DoNothing);
        assert_eq!(cx.push_opened(&at()).unwrap_err().message, "Control stack overflow");
    }

    #[test]
    fn variable_frames_reclaim_slots() {
        let mut cx = CompilationContext::new();
        cx.add_slot(StackSlot::new(0));
        cx.push_variable_frame(&at()).unwrap();
        assert_eq!(cx.reuse_slot(), None);
        cx.add_slot(StackSlot::new(1));
        cx.declare(Variable {
            name: "x".into(),
            ty: DataType::Integer,
            storage: Storage::Slot(StackSlot::new(1)),
        });
        assert!(cx.find_local_mut("x").is_some());
        assert_eq!(cx.slots_in_use(), 2);

        cx.pop_variable_frame(&at()).unwrap();
        assert!(cx.find_local_mut("x").is_none());
        assert_eq!(cx.slots_in_use(), 1);
        assert_eq!(cx.reuse_slot(), Some(StackSlot::new(1)));
        assert!(cx.pop_variable_frame(&at()).is_err());
    }

    #[test]
    fn gc_blocks_track_requirement() {
        let mut cx = CompilationContext::new();
        cx.require_gc_block();
        cx.push_gc_block(Inst::new(0), None).unwrap();
        cx.push_gc_block(Inst::new(1), None).unwrap();
        cx.require_gc_block();

        assert!(cx.pop_gc_block(None).unwrap().required);
        assert!(!cx.pop_gc_block(None).unwrap().required);
        assert_eq!(cx.pop_gc_block(None).unwrap_err().message, "Gc stack underflow");
    }

    #[test]
    fn dirty_flag_snapshots() {
        let mut cx = CompilationContext::new();
        cx.gc_dirty = true;
        cx.save_dirty();
        assert!(!cx.gc_dirty);
        assert!(cx.opening_dirty());
        cx.restore_dirty();
        assert!(cx.gc_dirty);
    }
}
