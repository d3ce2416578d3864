//! Edge-local phi resolution.
//!
//! On every CFG edge transition the phis of the destination block become
//! explicit register copies. The scheduler orders the copies so that no
//! pending assignment reads a register after it has been clobbered; when
//! the copies form a cycle (the swap problem), one source is first moved
//! into its edge-specific alternate register and its readers resolve it
//! through the edge context from then on.

use rustc_hash::FxHashSet;

use crate::codegen::error::CompileError;
use crate::codegen::WastWriter;
use crate::ir::nodes::{BlockId, FuncId, Function, InstId, InstKind, Value};
use crate::regalloc::Registerize;
use crate::return_codegen_error;

pub(crate) trait PhiEdgeVisitor {
    /// A source register is about to be clobbered; move it aside into its
    /// edge-specific register.
    fn handle_recursive_phi_dependency(&mut self, incoming: InstId) -> Result<(), CompileError>;

    /// Realize one phi assignment for the edge.
    fn handle_phi(&mut self, phi: InstId, incoming: &Value) -> Result<(), CompileError>;
}

struct PendingPhi<'v> {
    phi: InstId,
    dest_reg: u32,
    incoming: &'v Value,
    incoming_inst: Option<InstId>,
    /// Register the incoming value currently lives in, while it still
    /// blocks writes to it. `None` once shadowed or when the incoming
    /// value is not a materialized instruction.
    src_reg: Option<u32>,
}

/// Drive `visitor` over every phi of `to` that has an incoming value on the
/// edge `from -> to`, in clobber-safe order.
pub(crate) fn run_on_edge(
    func: &Function,
    regs: &Registerize,
    fid: FuncId,
    from: BlockId,
    to: BlockId,
    visitor: &mut dyn PhiEdgeVisitor,
) -> Result<(), CompileError> {
    let mut pending = Vec::new();
    for (iid, inst) in func.phis(to) {
        let InstKind::Phi { incoming } = &inst.kind else {
            continue;
        };
        let Some((_, value)) = incoming.iter().find(|(b, _)| *b == from) else {
            continue;
        };
        let dest_reg = regs.register_id(fid, iid)?;
        let (incoming_inst, src_reg) = match value {
            Value::Inst(i) if !regs.is_inlineable(fid, *i) => {
                (Some(*i), Some(regs.register_id(fid, *i)?))
            }
            _ => (None, None),
        };
        pending.push(PendingPhi {
            phi: iid,
            dest_reg,
            incoming: value,
            incoming_inst,
            src_reg,
        });
    }

    let mut shadowed: FxHashSet<InstId> = FxHashSet::default();
    while !pending.is_empty() {
        // An assignment is safe once no other pending assignment still
        // reads its destination register.
        let ready = pending.iter().position(|e| {
            !pending
                .iter()
                .any(|o| o.phi != e.phi && o.src_reg == Some(e.dest_reg))
        });
        match ready {
            Some(i) => {
                let e = pending.remove(i);
                visitor.handle_phi(e.phi, e.incoming)?;
            }
            None => {
                // Copy cycle: shadow the sources blocking the first entry
                let dest = pending[0].dest_reg;
                let mut broke = false;
                for entry in pending.iter_mut() {
                    if entry.src_reg != Some(dest) {
                        continue;
                    }
                    if let Some(inc) = entry.incoming_inst {
                        if shadowed.insert(inc) {
                            visitor.handle_recursive_phi_dependency(inc)?;
                        }
                    }
                    entry.src_reg = None;
                    broke = true;
                }
                if !broke {
                    return_codegen_error!(Internal, "phi scheduler failed to break a cycle");
                }
            }
        }
    }
    Ok(())
}

struct WriterPhiVisitor<'w, 'a> {
    writer: &'w mut WastWriter<'a>,
    from: BlockId,
    to: BlockId,
}

impl PhiEdgeVisitor for WriterPhiVisitor<'_, '_> {
    fn handle_recursive_phi_dependency(&mut self, incoming: InstId) -> Result<(), CompileError> {
        let w = &mut *self.writer;
        let base = w.register_local(incoming)?;
        let edge_reg =
            w.registerize
                .register_id_for_edge(w.current_fun, incoming, self.from, self.to)?;
        let edge_local = w.local_for_register(edge_reg);
        w.putln(&format!("get_local {}", base));
        w.putln(&format!("set_local {}", edge_local));
        Ok(())
    }

    fn handle_phi(&mut self, phi: InstId, incoming: &Value) -> Result<(), CompileError> {
        let w = &mut *self.writer;
        // Assignment from the same register is a no-op
        if !w.needs_phi_copy(phi, incoming)? {
            return Ok(());
        }
        // 1) Put the value on the stack, reading shadowed registers
        //    through the edge context
        w.registerize.set_edge_context(self.from, self.to);
        let result = w.compile_operand(incoming);
        w.registerize.clear_edge_context();
        result?;
        // 2) Save the value in the phi's register
        let local = w.register_local(phi)?;
        w.putln(&format!("\nset_local {}", local));
        Ok(())
    }
}

struct AnalysisPhiVisitor<'w, 'a> {
    writer: &'w WastWriter<'a>,
    needs: bool,
}

impl PhiEdgeVisitor for AnalysisPhiVisitor<'_, '_> {
    fn handle_recursive_phi_dependency(&mut self, _incoming: InstId) -> Result<(), CompileError> {
        Ok(())
    }

    fn handle_phi(&mut self, phi: InstId, incoming: &Value) -> Result<(), CompileError> {
        self.needs |= self.writer.needs_phi_copy(phi, incoming)?;
        Ok(())
    }
}

impl<'a> WastWriter<'a> {
    /// Emit the phi assignments for the edge `from -> to`.
    pub(crate) fn compile_phis_of_block(
        &mut self,
        to: BlockId,
        from: BlockId,
    ) -> Result<(), CompileError> {
        let func = self.cur_func();
        let regs = self.registerize;
        let fid = self.current_fun;
        let mut visitor = WriterPhiVisitor {
            writer: self,
            from,
            to,
        };
        run_on_edge(func, regs, fid, from, to, &mut visitor)
    }

    /// Whether the edge `from -> to` needs any phi assignment at all.
    pub(crate) fn needs_block_prologue(
        &self,
        to: BlockId,
        from: BlockId,
    ) -> Result<bool, CompileError> {
        let func = self.cur_func();
        if func.phis(to).next().is_none() {
            return Ok(false);
        }
        let regs = self.registerize;
        let fid = self.current_fun;
        let mut visitor = AnalysisPhiVisitor {
            writer: self,
            needs: false,
        };
        run_on_edge(func, regs, fid, from, to, &mut visitor)?;
        Ok(visitor.needs)
    }

    pub(crate) fn needs_phi_copy(
        &self,
        phi: InstId,
        incoming: &Value,
    ) -> Result<bool, CompileError> {
        match incoming {
            Value::Inst(i) if !self.registerize.is_inlineable(self.current_fun, *i) => {
                let phi_reg = self.registerize.register_id(self.current_fun, phi)?;
                let src_reg = self.registerize.register_id(self.current_fun, *i)?;
                Ok(phi_reg != src_reg)
            }
            _ => Ok(true),
        }
    }
}
