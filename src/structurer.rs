//! The control-flow structurer contracts.
//!
//! The structurer (a relooper-style algorithm, external to this crate) turns
//! an arbitrary CFG into structured control flow by driving the callback
//! surface below. The renderer in `codegen::renderer` implements
//! [`RenderSink`]; the module assembler obtains a [`FunctionShape`] per
//! multi-block function and hands it the renderer.

use crate::codegen::error::CompileError;
use crate::ir::nodes::{BlockId, Function, InstId};

/// One outgoing edge of a switch terminator as the structurer sees it:
/// destination block plus the branch id (`-1` marks the default branch).
#[derive(Debug, Clone, Copy)]
pub struct SwitchEdge {
    pub target: BlockId,
    pub branch_id: i32,
}

/// The event surface the structurer drives while rendering one function.
///
/// The callee keeps the frame stack; the structurer only announces shape
/// boundaries and transitions. `render_*_begin` calls must be balanced by
/// `render_block_end` (or `render_do_block_end` for plain labeled blocks).
pub trait RenderSink {
    /// Emit the straight-line body of `block`.
    fn render_block(&mut self, block: BlockId) -> Result<(), CompileError>;

    /// Open an `if` (or an `else if` when `first` is false) guarded by the
    /// condition selecting `branch_id` out of `block`'s terminator.
    fn render_if_block_begin(
        &mut self,
        block: BlockId,
        branch_id: i32,
        first: bool,
    ) -> Result<(), CompileError>;

    /// Open an `if` guarded by the negated disjunction of the conditions
    /// selecting each branch in `skip_branch_ids`.
    fn render_if_block_begin_skipping(
        &mut self,
        block: BlockId,
        skip_branch_ids: &[i32],
        first: bool,
    ) -> Result<(), CompileError>;

    fn render_else_block_begin(&mut self) -> Result<(), CompileError>;

    /// Close the innermost logical frame, emitting however many `end`
    /// tokens that takes.
    fn render_block_end(&mut self) -> Result<(), CompileError>;

    /// Realize the phi assignments for the edge `from -> to`.
    fn render_block_prologue(&mut self, to: BlockId, from: BlockId) -> Result<(), CompileError>;

    /// Whether the edge `from -> to` needs any phi assignment at all.
    fn has_block_prologue(&self, to: BlockId, from: BlockId) -> bool;

    /// Open a loop (continue target) wrapping a block (break target).
    fn render_while_block_begin(&mut self, label: Option<i32>);

    /// Open a plain breakable block.
    fn render_do_block_begin(&mut self, label: Option<i32>);

    fn render_do_block_end(&mut self) -> Result<(), CompileError>;

    fn render_break(&mut self, label: Option<i32>) -> Result<(), CompileError>;

    fn render_continue(&mut self, label: Option<i32>) -> Result<(), CompileError>;

    /// Store `label_id` into the label-dispatch local.
    fn render_label(&mut self, label_id: i32);

    /// Open an `if` testing the label-dispatch local against `label_id`.
    fn render_if_on_label(&mut self, label_id: i32, first: bool);

    /// Open a switch over the scrutinee of `switch_inst`, building the
    /// dispatch `br_table` from `edges`.
    fn render_switch_block_begin(
        &mut self,
        switch_inst: InstId,
        edges: &[SwitchEdge],
    ) -> Result<(), CompileError>;

    /// Open a switch over the label-dispatch local. `label_ids` are the
    /// dispatch targets in ascending order.
    fn render_switch_on_label(&mut self, label_ids: &[i64]) -> Result<(), CompileError>;

    fn render_case_block_begin(&mut self, block: BlockId, branch_id: i32)
        -> Result<(), CompileError>;

    fn render_case_on_label(&mut self, label_id: i32) -> Result<(), CompileError>;

    fn render_default_block_begin(&mut self) -> Result<(), CompileError>;
}

/// The structured form of one function, ready to be rendered.
pub trait FunctionShape {
    /// Whether rendering will use the label-dispatch local.
    fn needs_label(&self) -> bool;

    fn render(&self, sink: &mut dyn RenderSink) -> Result<(), CompileError>;
}

/// Produces a [`FunctionShape`] for each multi-block function.
pub trait Structurer {
    fn run<'f>(&'f self, func: &'f Function)
        -> Result<Box<dyn FunctionShape + 'f>, CompileError>;
}
