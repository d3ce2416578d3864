//! The structured control renderer.
//!
//! Implements the callback surface the external structurer drives. The
//! renderer owns the block-type stack: one logical frame per structurer
//! construct, with a `depth` counter recording how many extra target-level
//! frames the entry has opened (an if/else chain is one logical frame but
//! many physical `if`/`end` pairs). Branch depths for `break`/`continue`
//! are computed by walking this stack outward.
//!
//! Indentation is cosmetic only: two spaces per stack entry in front of
//! structural tokens.

use itertools::Itertools;
use rustc_hash::FxHashMap;

use crate::codegen::error::CompileError;
use crate::codegen::WastWriter;
use crate::ir::nodes::{BlockId, Constant, InstId, InstKind};
use crate::return_codegen_error;
use crate::structurer::{RenderSink, SwitchEdge};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    /// A loop (continue target) wrapping a block (break target).
    Loop,
    /// A plain breakable block.
    Do,
    Switch,
    Case,
    If,
}

#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub(crate) kind: FrameKind,
    /// Extra target-level frames opened since this entry was pushed. For
    /// `Switch` this counts the remaining unclosed case blocks instead.
    pub(crate) depth: u32,
}

pub struct WastRenderInterface<'w, 'a> {
    writer: &'w mut WastWriter<'a>,
    frames: Vec<Frame>,
    label_local: u32,
    /// The last block rendered while the frame stack was empty; the
    /// assembler checks its terminator to decide on a synthesized return.
    pub(crate) last_depth0_block: Option<BlockId>,
}

impl<'w, 'a> WastRenderInterface<'w, 'a> {
    pub(crate) fn new(writer: &'w mut WastWriter<'a>, label_local: u32) -> Self {
        WastRenderInterface {
            writer,
            frames: Vec::new(),
            label_local,
            last_depth0_block: None,
        }
    }

    fn indent(&mut self) {
        for _ in 0..self.frames.len() {
            self.writer.put("  ");
        }
    }

    fn switch_frame_index(&self) -> Result<usize, CompileError> {
        for (i, f) in self.frames.iter().enumerate().rev() {
            if f.kind == FrameKind::Switch {
                return Ok(i);
            }
        }
        return_codegen_error!(RendererInvariant, "no enclosing switch frame")
    }

    /// Emit the condition selecting `branch_id` out of `block`'s
    /// terminator: the branch condition itself for a conditional branch,
    /// or an equality test (OR-ed over same-destination cases) for a
    /// switch.
    fn render_condition(&mut self, block: BlockId, branch_id: i32) -> Result<(), CompileError> {
        let func = self.writer.cur_func();
        let term = match func.terminator(block) {
            Some(t) => t,
            None => return_codegen_error!(RendererInvariant, "condition on an empty block"),
        };
        match &term.kind {
            InstKind::CondBr { cond, .. } => {
                if branch_id != 0 {
                    return_codegen_error!(
                        RendererInvariant,
                        "conditional branch only renders branch 0, got {}",
                        branch_id
                    );
                }
                self.writer.compile_operand(cond)
            }
            InstKind::Switch { cond, cases, .. } => {
                if branch_id <= 0 {
                    return_codegen_error!(
                        RendererInvariant,
                        "switch condition needs a positive branch id, got {}",
                        branch_id
                    );
                }
                let case_index = (branch_id - 1) as usize;
                let (case_val, dest) = match cases.get(case_index) {
                    Some(c) => *c,
                    None => {
                        return_codegen_error!(
                            RendererInvariant,
                            "branch id {} exceeds the switch's case count",
                            branch_id
                        )
                    }
                };
                self.writer.compile_operand(cond)?;
                self.writer.put("\n");
                self.writer.compile_constant(&Constant::Int {
                    bits: 32,
                    value: case_val,
                })?;
                self.writer.put("\ni32.eq");
                // Further cases may share the destination; fold them in
                for (later_val, later_dest) in &cases[case_index + 1..] {
                    if *later_dest != dest {
                        continue;
                    }
                    self.writer.put("\n");
                    self.writer.compile_operand(cond)?;
                    self.writer.put("\n");
                    self.writer.compile_constant(&Constant::Int {
                        bits: 32,
                        value: *later_val,
                    })?;
                    self.writer.put("\ni32.eq\ni32.or");
                }
                Ok(())
            }
            _ => return_codegen_error!(
                RendererInvariant,
                "terminator of block {} cannot drive a condition",
                block
            ),
        }
    }

    fn push_case(&mut self) -> Result<(), CompileError> {
        match self.frames.last() {
            Some(f) if matches!(f.kind, FrameKind::Switch | FrameKind::Case) => {}
            _ => return_codegen_error!(RendererInvariant, "case frame outside a switch"),
        }
        let sw = self.switch_frame_index()?;
        if self.frames[sw].depth == 0 {
            return_codegen_error!(RendererInvariant, "switch has no remaining case capacity");
        }
        self.frames.push(Frame {
            kind: FrameKind::Case,
            depth: 0,
        });
        Ok(())
    }

    fn push_if(&mut self, first: bool) -> Result<(), CompileError> {
        if first {
            self.frames.push(Frame {
                kind: FrameKind::If,
                depth: 0,
            });
            return Ok(());
        }
        match self.frames.last_mut() {
            Some(f) if f.kind == FrameKind::If => {
                f.depth += 1;
                Ok(())
            }
            _ => return_codegen_error!(
                RendererInvariant,
                "else-if continuation without an open if frame"
            ),
        }
    }

    /// Walk the stack outward summing physical frame counts until the
    /// nearest loop or breakable block.
    fn depth_to_enclosing_loop(&self) -> Result<u32, CompileError> {
        let mut depth = 0u32;
        for f in self.frames.iter().rev() {
            if matches!(f.kind, FrameKind::Do | FrameKind::Loop) {
                return Ok(depth);
            }
            depth += f.depth + 1;
        }
        return_codegen_error!(
            RendererInvariant,
            "break or continue with no enclosing loop"
        )
    }
}

impl RenderSink for WastRenderInterface<'_, '_> {
    fn render_block(&mut self, block: BlockId) -> Result<(), CompileError> {
        if self.frames.is_empty() {
            self.last_depth0_block = Some(block);
        } else {
            self.last_depth0_block = None;
        }
        self.writer.compile_bb(block)
    }

    fn render_if_block_begin(
        &mut self,
        block: BlockId,
        branch_id: i32,
        first: bool,
    ) -> Result<(), CompileError> {
        if !first {
            self.indent();
            self.writer.putln("else");
        }
        // The condition goes first
        self.render_condition(block, branch_id)?;
        self.writer.put("\n");
        self.indent();
        self.writer.putln("if");
        self.push_if(first)
    }

    fn render_if_block_begin_skipping(
        &mut self,
        block: BlockId,
        skip_branch_ids: &[i32],
        first: bool,
    ) -> Result<(), CompileError> {
        if !first {
            self.indent();
            self.writer.putln("else");
        }
        for (i, id) in skip_branch_ids.iter().enumerate() {
            self.render_condition(block, *id)?;
            self.writer.put("\n");
            if i != 0 {
                self.writer.putln("i32.or");
            }
        }
        // Invert the disjunction
        self.writer.putln("i32.const 1");
        self.writer.putln("i32.xor");
        self.indent();
        self.writer.putln("if");
        self.push_if(first)
    }

    fn render_else_block_begin(&mut self) -> Result<(), CompileError> {
        match self.frames.last() {
            Some(f) if f.kind == FrameKind::If => {}
            _ => return_codegen_error!(RendererInvariant, "else without an open if frame"),
        }
        self.indent();
        self.writer.putln("else");
        Ok(())
    }

    fn render_block_end(&mut self) -> Result<(), CompileError> {
        let frame = match self.frames.pop() {
            Some(f) => f,
            None => return_codegen_error!(RendererInvariant, "block end with no open frame"),
        };
        match frame.kind {
            FrameKind::Loop => {
                // The inner block falls through here; the fake value
                // satisfies the target's block typing before breaking out
                // of the loop
                self.writer.putln("i32.const 0");
                self.writer.putln("br 1");
                self.writer.putln("end");
                self.writer.putln("end");
                Ok(())
            }
            FrameKind::Case => {
                self.writer.putln("end");
                let sw = self.switch_frame_index()?;
                if self.frames[sw].depth == 0 {
                    return_codegen_error!(RendererInvariant, "case end underflowed its switch");
                }
                self.frames[sw].depth -= 1;
                Ok(())
            }
            FrameKind::If => {
                for _ in 0..frame.depth + 1 {
                    self.indent();
                    self.writer.putln("end");
                }
                Ok(())
            }
            FrameKind::Switch => {
                if frame.depth != 0 {
                    return_codegen_error!(
                        RendererInvariant,
                        "switch closed with {} case blocks still open",
                        frame.depth
                    );
                }
                Ok(())
            }
            FrameKind::Do => {
                return_codegen_error!(
                    RendererInvariant,
                    "breakable block must close through render_do_block_end"
                )
            }
        }
    }

    fn render_block_prologue(&mut self, to: BlockId, from: BlockId) -> Result<(), CompileError> {
        self.writer.compile_phis_of_block(to, from)
    }

    fn has_block_prologue(&self, to: BlockId, from: BlockId) -> bool {
        // On an inconsistency, claim a prologue is needed; the render call
        // will surface the error
        self.writer.needs_block_prologue(to, from).unwrap_or(true)
    }

    fn render_while_block_begin(&mut self, label: Option<i32>) {
        // Wrap a block in a loop so that:
        // br 1 -> break
        // br 2 -> continue
        self.indent();
        match label {
            Some(l) => self.writer.putln(&format!("loop $c{}", l)),
            None => self.writer.putln("loop"),
        }
        self.indent();
        match label {
            Some(l) => self.writer.putln(&format!("block ${}", l)),
            None => self.writer.putln("block"),
        }
        self.frames.push(Frame {
            kind: FrameKind::Loop,
            depth: 0,
        });
    }

    fn render_do_block_begin(&mut self, label: Option<i32>) {
        self.indent();
        match label {
            Some(l) => self.writer.putln(&format!("block ${}", l)),
            None => self.writer.putln("block"),
        }
        self.frames.push(Frame {
            kind: FrameKind::Do,
            depth: 0,
        });
    }

    fn render_do_block_end(&mut self) -> Result<(), CompileError> {
        match self.frames.last() {
            Some(f) if f.kind == FrameKind::Do => {}
            _ => return_codegen_error!(RendererInvariant, "do block end without a do frame"),
        }
        self.frames.pop();
        self.indent();
        self.writer.putln("end");
        Ok(())
    }

    fn render_break(&mut self, label: Option<i32>) -> Result<(), CompileError> {
        if let Some(l) = label {
            // The break target is the label's inner block
            self.writer.putln(&format!("br ${}", l));
            return Ok(());
        }
        let last_kind = match self.frames.last() {
            Some(f) => f.kind,
            None => return_codegen_error!(RendererInvariant, "break with no open frame"),
        };
        if last_kind == FrameKind::Case {
            let sw = self.switch_frame_index()?;
            let remaining = self.frames[sw].depth;
            if remaining == 0 {
                return_codegen_error!(RendererInvariant, "break inside an exhausted switch");
            }
            self.writer.putln(&format!("br {}", remaining - 1));
        } else {
            let depth = self.depth_to_enclosing_loop()?;
            self.writer.putln(&format!("br {}", depth));
        }
        Ok(())
    }

    fn render_continue(&mut self, label: Option<i32>) -> Result<(), CompileError> {
        if let Some(l) = label {
            self.writer.putln(&format!("br $c{}", l));
            return Ok(());
        }
        // Continue targets the loop outside the break block
        let depth = self.depth_to_enclosing_loop()? + 1;
        self.writer.putln(&format!("br {}", depth));
        Ok(())
    }

    fn render_label(&mut self, label_id: i32) {
        self.writer.putln(&format!("i32.const {}", label_id));
        self.writer.putln(&format!("set_local {}", self.label_local));
    }

    fn render_if_on_label(&mut self, label_id: i32, _first: bool) {
        self.writer.putln(&format!("i32.const {}", label_id));
        self.writer.putln(&format!("get_local {}", self.label_local));
        self.writer.putln("i32.eq");
        self.indent();
        self.writer.putln("if");
        self.frames.push(Frame {
            kind: FrameKind::If,
            depth: 0,
        });
    }

    fn render_switch_block_begin(
        &mut self,
        switch_inst: InstId,
        edges: &[SwitchEdge],
    ) -> Result<(), CompileError> {
        let func = self.writer.cur_func();
        let inst = func.inst(switch_inst);
        let (cond, cases) = match &inst.kind {
            InstKind::Switch { cond, cases, .. } => (cond, cases),
            _ => {
                return_codegen_error!(
                    RendererInvariant,
                    "switch rendering on a non-switch instruction"
                )
            }
        };
        if cases.is_empty() {
            return_codegen_error!(RendererInvariant, "switch with no cases");
        }
        let (min, max) = match cases.iter().map(|(v, _)| *v).minmax().into_option() {
            Some(bounds) => bounds,
            None => return_codegen_error!(RendererInvariant, "switch with no cases"),
        };

        // One dispatch entry per value between min and max; gaps go to the
        // default block.
        let mut table = vec![-1i32; (max - min + 1) as usize];
        let mut block_index: FxHashMap<BlockId, i32> = FxHashMap::default();
        let mut case_blocks: i32 = 0;
        for (i, (val, dest)) in cases.iter().enumerate() {
            if block_index.contains_key(dest) {
                continue;
            }
            // Use the block index from the structurer's branch list; the
            // branch order does not have to match the case order.
            let index = find_block_in_edges(*dest, edges)?;
            block_index.insert(*dest, index);
            table[(val - min) as usize] = index;
            for (later_val, later_dest) in &cases[i + 1..] {
                if later_dest == dest {
                    table[(later_val - min) as usize] = index;
                }
            }
            case_blocks += 1;
        }
        for entry in table.iter_mut() {
            if *entry == -1 {
                *entry = case_blocks;
            }
        }

        // The case blocks and the default block
        for _ in 0..case_blocks + 1 {
            self.writer.putln("block");
        }
        // Wrap the dispatch itself in one more block
        self.writer.putln("block");
        self.writer.compile_operand(cond)?;
        if min != 0 {
            self.writer.put(&format!("\ni32.const {}\ni32.sub", min));
        }
        self.writer
            .putln(&format!("\nbr_table {} {}", table.iter().join(" "), case_blocks));
        self.writer.putln("end");
        self.frames.push(Frame {
            kind: FrameKind::Switch,
            depth: case_blocks as u32 + 1,
        });
        Ok(())
    }

    fn render_switch_on_label(&mut self, label_ids: &[i64]) -> Result<(), CompileError> {
        let (min, max) = match label_ids.iter().copied().minmax().into_option() {
            Some(bounds) => bounds,
            None => {
                return_codegen_error!(RendererInvariant, "label dispatch with no targets")
            }
        };
        // Index 0 is the no-op block that breaks out of the dispatch
        let mut table = vec![0u32; (max - min + 1) as usize];
        for (i, id) in label_ids.iter().enumerate() {
            table[(id - min) as usize] = i as u32 + 1;
        }

        for _ in 0..label_ids.len() + 1 {
            self.writer.putln("block");
        }
        self.writer.putln("block");
        self.writer.put(&format!("get_local {}", self.label_local));
        if min != 0 {
            self.writer.put(&format!("\ni32.const {}\ni32.sub", min));
        }
        self.writer
            .putln(&format!("\nbr_table {} 0", table.iter().join(" ")));
        self.writer.putln("end");
        // The no-op block: break out of the whole dispatch
        self.writer.putln(&format!("br {}", label_ids.len()));
        self.writer.putln("end");
        self.frames.push(Frame {
            kind: FrameKind::Switch,
            depth: label_ids.len() as u32,
        });
        Ok(())
    }

    fn render_case_block_begin(
        &mut self,
        _block: BlockId,
        _branch_id: i32,
    ) -> Result<(), CompileError> {
        self.push_case()
    }

    fn render_case_on_label(&mut self, _label_id: i32) -> Result<(), CompileError> {
        self.push_case()
    }

    fn render_default_block_begin(&mut self) -> Result<(), CompileError> {
        self.push_case()
    }
}

fn find_block_in_edges(dest: BlockId, edges: &[SwitchEdge]) -> Result<i32, CompileError> {
    let mut i = 0;
    for e in edges {
        if e.target == dest {
            return Ok(i);
        }
        // The default branch is not counted; the structurer renders it last
        if e.branch_id == -1 {
            continue;
        }
        i += 1;
    }
    return_codegen_error!(
        RendererInvariant,
        "switch destination {} not found in the branch list",
        dest
    )
}
