//! The registerize contract.
//!
//! Register assignment is performed outside this crate; the generator only
//! consumes the result. Every materialized SSA value carries a register id
//! and a typed kind, and edges may carry alternate ids for values that the
//! phi resolver shadows while breaking copy cycles. While an edge context is
//! set, [`Registerize::register_id`] answers the edge-specific id for values
//! that have one, which is how shadowed registers are read correctly during
//! phi-incoming evaluation.

use std::cell::Cell;

use crate::codegen::error::CompileError;
use crate::ir::nodes::{BlockId, FuncId, InstId, InstKind, IrType, Module};
use crate::return_codegen_error;
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterKind {
    Integer,
    Float,
    Double,
}

#[derive(Debug, Clone)]
pub struct RegisterInfo {
    pub kind: RegisterKind,
}

/// Register data for one function.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegisters {
    /// Register id per materialized SSA value.
    pub ids: FxHashMap<InstId, u32>,
    /// Registers in registerize order; the index is the register id.
    pub registers: Vec<RegisterInfo>,
    /// Alternate register ids used on specific edges for cycle breaking.
    pub edge_ids: FxHashMap<(InstId, BlockId, BlockId), u32>,
    /// Values folded into their single use instead of materialized.
    pub inlineable: FxHashSet<InstId>,
}

#[derive(Debug, Default)]
pub struct Registerize {
    functions: FxHashMap<FuncId, FunctionRegisters>,
    edge: Cell<Option<(BlockId, BlockId)>>,
}

impl Registerize {
    pub fn new() -> Registerize {
        Registerize::default()
    }

    pub fn insert_function(&mut self, f: FuncId, regs: FunctionRegisters) {
        self.functions.insert(f, regs);
    }

    /// The register id of `inst`, honoring the active edge context.
    pub fn register_id(&self, f: FuncId, inst: InstId) -> Result<u32, CompileError> {
        let regs = self.function_regs(f)?;
        if let Some((from, to)) = self.edge.get() {
            if let Some(id) = regs.edge_ids.get(&(inst, from, to)) {
                return Ok(*id);
            }
        }
        match regs.ids.get(&inst) {
            Some(id) => Ok(*id),
            None => return_codegen_error!(Internal, "value {} has no assigned register", inst),
        }
    }

    /// The alternate register id of `inst` on the given edge.
    pub fn register_id_for_edge(
        &self,
        f: FuncId,
        inst: InstId,
        from: BlockId,
        to: BlockId,
    ) -> Result<u32, CompileError> {
        let regs = self.function_regs(f)?;
        match regs.edge_ids.get(&(inst, from, to)) {
            Some(id) => Ok(*id),
            None => return_codegen_error!(
                Internal,
                "value {} has no edge register for {} -> {}",
                inst,
                from,
                to
            ),
        }
    }

    pub fn registers_for_function(&self, f: FuncId) -> Result<&[RegisterInfo], CompileError> {
        Ok(&self.function_regs(f)?.registers)
    }

    pub fn set_edge_context(&self, from: BlockId, to: BlockId) {
        self.edge.set(Some((from, to)));
    }

    pub fn clear_edge_context(&self) {
        self.edge.set(None);
    }

    pub fn is_inlineable(&self, f: FuncId, inst: InstId) -> bool {
        self.functions
            .get(&f)
            .map(|regs| regs.inlineable.contains(&inst))
            .unwrap_or(false)
    }

    fn function_regs(&self, f: FuncId) -> Result<&FunctionRegisters, CompileError> {
        match self.functions.get(&f) {
            Some(regs) => Ok(regs),
            None => return_codegen_error!(Internal, "function {} was never registerized", f),
        }
    }

    /// The trivial assignment: one register per value-producing instruction,
    /// in instruction order, with nothing inlined. Useful for tests and as a
    /// baseline when no real allocator output is available.
    pub fn one_per_value(module: &Module) -> Result<Registerize, CompileError> {
        let mut out = Registerize::new();
        for (fid, func) in module.functions.iter().enumerate() {
            let mut regs = FunctionRegisters::default();
            for (iid, inst) in func.insts.iter().enumerate() {
                if inst.ty == IrType::Void || matches!(inst.kind, InstKind::Store { .. }) {
                    continue;
                }
                let id = regs.registers.len() as u32;
                regs.registers.push(RegisterInfo {
                    kind: register_kind_for(&inst.ty)?,
                });
                regs.ids.insert(iid, id);
            }
            out.insert_function(fid, regs);
        }
        Ok(out)
    }
}

pub fn register_kind_for(ty: &IrType) -> Result<RegisterKind, CompileError> {
    match ty {
        IrType::Int(_) | IrType::Ptr(_) => Ok(RegisterKind::Integer),
        IrType::Float => Ok(RegisterKind::Float),
        IrType::Double => Ok(RegisterKind::Double),
        _ => return_codegen_error!(UnsupportedType, "no register kind for {:?}", ty),
    }
}
