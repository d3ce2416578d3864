//! Per-opcode instruction lowering and the per-block driver.
//!
//! Operands are pushed left to right, then the typed opcode is emitted.
//! Every lowering reports whether it left a value on the stack
//! ([`Lowered::Value`]) or consumed everything itself
//! ([`Lowered::Consumed`]); the per-block driver uses that to drop unused
//! results or store them into the defining register.

use crate::codegen::error::{CompileError, WarningKind};
use crate::codegen::types::{int_width, type_string};
use crate::codegen::WastWriter;
use crate::ir::nodes::{
    BinaryOp, BlockId, Callee, CastOp, Constant, FloatPredicate, FuncSig, InstId, InstKind,
    IntPredicate, Intrinsic, IrType, Value,
};
use crate::return_codegen_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lowered {
    /// The lowering left the instruction's value on the stack.
    Value,
    /// The lowering consumed everything; nothing is left to store or drop.
    Consumed,
}

pub(crate) fn integer_predicate(p: IntPredicate) -> &'static str {
    match p {
        IntPredicate::Eq => "eq",
        IntPredicate::Ne => "ne",
        IntPredicate::Sge => "ge_s",
        IntPredicate::Sgt => "gt_s",
        IntPredicate::Sle => "le_s",
        IntPredicate::Slt => "lt_s",
        IntPredicate::Uge => "ge_u",
        IntPredicate::Ugt => "gt_u",
        IntPredicate::Ule => "le_u",
        IntPredicate::Ult => "lt_u",
    }
}

// Ordered and unordered predicates collapse; the target cannot tell them
// apart. Known lossy mapping.
fn float_predicate(p: FloatPredicate) -> &'static str {
    match p {
        FloatPredicate::Oeq | FloatPredicate::Ueq => "eq",
        FloatPredicate::One | FloatPredicate::Une => "ne",
        FloatPredicate::Olt | FloatPredicate::Ult => "lt",
        FloatPredicate::Ogt | FloatPredicate::Ugt => "gt",
        FloatPredicate::Ole | FloatPredicate::Ule => "le",
        FloatPredicate::Oge | FloatPredicate::Uge => "ge",
    }
}

fn binary_op_name(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add | BinaryOp::FAdd => "add",
        BinaryOp::Sub | BinaryOp::FSub => "sub",
        BinaryOp::Mul | BinaryOp::FMul => "mul",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
        BinaryOp::Xor => "xor",
        BinaryOp::Shl => "shl",
        BinaryOp::AShr => "shr_s",
        BinaryOp::LShr => "shr_u",
        BinaryOp::SDiv => "div_s",
        BinaryOp::UDiv => "div_u",
        BinaryOp::SRem => "rem_s",
        BinaryOp::URem => "rem_u",
        BinaryOp::FDiv => "div",
        BinaryOp::FRem => "rem",
    }
}

fn arg<'v>(args: &'v [Value], i: usize) -> Result<&'v Value, CompileError> {
    match args.get(i) {
        Some(v) => Ok(v),
        None => return_codegen_error!(Internal, "intrinsic is missing operand {}", i),
    }
}

impl<'a> WastWriter<'a> {
    /// Emit every non-phi, non-inlineable, non-elided instruction of a
    /// block, storing or dropping produced values as use counts dictate.
    pub(crate) fn compile_bb(&mut self, block: BlockId) -> Result<(), CompileError> {
        let func = self.cur_func();
        for &iid in &func.blocks[block].insts {
            let inst = func.inst(iid);
            if self.registerize.is_inlineable(self.current_fun, iid) {
                continue;
            }
            // Phis are realized on edge transitions, not in block bodies
            if matches!(inst.kind, InstKind::Phi { .. }) {
                continue;
            }
            if let InstKind::Intrinsic { intr, .. } = &inst.kind {
                if matches!(
                    intr,
                    Intrinsic::LifetimeStart
                        | Intrinsic::LifetimeEnd
                        | Intrinsic::DbgDeclare
                        | Intrinsic::DbgValue
                ) {
                    continue;
                }
            }

            // Source markers for debugging the emitted module
            if let Some(loc) = &inst.debug_loc {
                self.putln(&format!(";; {}:{}", loc.file, loc.line));
            }

            if inst.is_terminator() || func.has_uses(iid) || inst.may_have_side_effects() {
                let status = self.compile_instruction(iid)?;
                if status == Lowered::Value && inst.ty != IrType::Void {
                    if func.has_uses(iid) {
                        let local = self.register_local(iid)?;
                        self.putln(&format!("\nset_local {}", local));
                    } else {
                        self.putln("\ndrop");
                    }
                }
            }
        }
        Ok(())
    }

    pub(crate) fn compile_instruction(&mut self, iid: InstId) -> Result<Lowered, CompileError> {
        let func = self.cur_func();
        let inst = func.inst(iid);
        match &inst.kind {
            InstKind::Alloca { alloc_ty } => {
                let size = self.layout.type_size(alloc_ty)?;
                let alignment = self.layout.type_alignment(alloc_ty)?;
                // The shadow stack grows down: subtract, realign if needed,
                // keep the new pointer both in the register and on the stack
                self.putln(&format!("get_global {}", self.stack_top_global));
                self.putln(&format!("i32.const {}", size));
                self.putln("i32.sub");
                if size % alignment != 0 {
                    self.putln(&format!("i32.const {}", 0u32.wrapping_sub(alignment)));
                    self.putln("i32.and");
                }
                let local = self.register_local(iid)?;
                self.putln(&format!("tee_local {}", local));
                self.putln(&format!("set_global {}", self.stack_top_global));
                Ok(Lowered::Consumed)
            }

            InstKind::Binary {
                op: BinaryOp::FRem,
                lhs,
                rhs,
            } => {
                // No fp remainder in the target:
                // frem x, y -> x - trunc(x / y) * y
                let ts = type_string(&inst.ty)?;
                self.operand_line(lhs)?;
                self.operand_line(lhs)?;
                self.operand_line(rhs)?;
                self.putln(&format!("{}.div", ts));
                self.putln(&format!("{}.trunc", ts));
                self.operand_line(rhs)?;
                self.putln(&format!("{}.mul", ts));
                self.put(&format!("{}.sub", ts));
                Ok(Lowered::Value)
            }

            InstKind::Binary { op, lhs, rhs } => {
                let ts = type_string(&inst.ty)?;
                self.operand_line(lhs)?;
                self.operand_line(rhs)?;
                self.put(&format!("{}.{}", ts, binary_op_name(*op)));
                Ok(Lowered::Value)
            }

            InstKind::ICmp { pred, lhs, rhs } => {
                let lhs_ty = self.module.value_type(func, lhs);
                if lhs_ty.is_pointer() {
                    // Pointers are plain i32 addresses; no normalization
                    self.operand_line(lhs)?;
                    self.operand_line(rhs)?;
                } else if pred.is_signed() {
                    self.compile_signed_integer(lhs, true)?;
                    self.put("\n");
                    self.compile_signed_integer(rhs, true)?;
                    self.put("\n");
                } else if pred.is_unsigned() || lhs_ty != IrType::Int(32) {
                    self.compile_unsigned_integer(lhs)?;
                    self.put("\n");
                    self.compile_unsigned_integer(rhs)?;
                    self.put("\n");
                } else {
                    self.compile_signed_integer(lhs, true)?;
                    self.put("\n");
                    self.compile_signed_integer(rhs, true)?;
                    self.put("\n");
                }
                let ts = type_string(&lhs_ty)?;
                self.put(&format!("{}.{}", ts, integer_predicate(*pred)));
                Ok(Lowered::Value)
            }

            InstKind::FCmp { pred, lhs, rhs } => {
                self.operand_line(lhs)?;
                self.operand_line(rhs)?;
                let ts = type_string(&self.module.value_type(func, lhs))?;
                self.put(&format!("{}.{}", ts, float_predicate(*pred)));
                Ok(Lowered::Value)
            }

            InstKind::Load { ptr } => {
                self.operand_line(ptr)?;
                let ts = type_string(&inst.ty)?;
                let mut op = format!("{}.load", ts);
                if let IrType::Int(w) = inst.ty {
                    let w = if w == 1 { 8 } else { w };
                    if w < 32 {
                        if w != 8 && w != 16 {
                            return_codegen_error!(
                                Internal,
                                "cannot load an i{} value",
                                w
                            );
                        }
                        // Narrow loads zero-extend; sign recovery happens at
                        // the use site
                        op.push_str(&format!("{}_u", w));
                    }
                }
                self.put(&op);
                Ok(Lowered::Value)
            }

            InstKind::Store { ptr, value } => {
                self.operand_line(ptr)?;
                self.operand_line(value)?;
                let vty = self.module.value_type(func, value);
                let ts = type_string(&vty)?;
                let mut op = format!("{}.store", ts);
                if let IrType::Int(w) = vty {
                    let w = if w == 1 { 8 } else { w };
                    if w < 32 {
                        if w != 8 && w != 16 {
                            return_codegen_error!(
                                Internal,
                                "cannot store an i{} value",
                                w
                            );
                        }
                        op.push_str(&w.to_string());
                    }
                }
                self.putln(&op);
                Ok(Lowered::Value)
            }

            InstKind::Gep { base, indices } => {
                let base_ty = self.module.value_type(func, base);
                self.compile_gep(base, indices, &base_ty)?;
                Ok(Lowered::Value)
            }

            InstKind::Call { callee, args, sig } => self.compile_call(callee, args, sig),

            InstKind::Intrinsic { intr, args } => self.compile_intrinsic(iid, intr, args),

            InstKind::Select {
                cond,
                if_true,
                if_false,
            } => {
                self.operand_line(if_true)?;
                self.operand_line(if_false)?;
                self.operand_line(cond)?;
                self.put("select");
                Ok(Lowered::Value)
            }

            InstKind::Cast { op, value } => self.compile_cast(*op, value, &inst.ty),

            InstKind::VaArg { list } => {
                // Load the current argument
                self.operand_line(list)?;
                self.putln("i32.load");
                self.putln(&format!("{}.load", type_string(&inst.ty)?));
                // Advance the stored pointer by one 8-byte slot
                self.operand_line(list)?;
                self.operand_line(list)?;
                self.putln("i32.load");
                self.putln("i32.const 8");
                self.putln("i32.add");
                self.putln("i32.store");
                Ok(Lowered::Value)
            }

            InstKind::Ret { value } => {
                if let Some(v) = value {
                    self.operand_line(v)?;
                }
                // Restore the shadow stack from the slot saved on entry
                self.putln(&format!("get_local {}", func.arg_count()));
                self.putln(&format!("set_global {}", self.stack_top_global));
                self.putln("return");
                Ok(Lowered::Value)
            }

            // Branches and switches are realized by the structured renderer
            InstKind::Br { .. } | InstKind::CondBr { .. } | InstKind::Switch { .. } => {
                Ok(Lowered::Value)
            }

            InstKind::Unreachable => {
                self.putln("unreachable");
                Ok(Lowered::Value)
            }

            InstKind::Phi { .. } => {
                return_codegen_error!(Internal, "phi reached the instruction lowerer")
            }
        }
    }

    fn compile_cast(
        &mut self,
        op: CastOp,
        value: &Value,
        result_ty: &IrType,
    ) -> Result<Lowered, CompileError> {
        let func = self.cur_func();
        let src_ty = self.module.value_type(func, value);
        match op {
            CastOp::ZExt => {
                let w = int_width(&src_ty)?;
                self.compile_operand(value)?;
                self.put(&format!(
                    "\ni32.const {}\ni32.and",
                    super::operands::mask_for_bit_width(w)
                ));
                Ok(Lowered::Value)
            }
            CastOp::SExt => {
                let w = int_width(&src_ty)?;
                self.compile_operand(value)?;
                self.put(&format!(
                    "\ni32.const {s}\ni32.shl\ni32.const {s}\ni32.shr_s",
                    s = 32 - w
                ));
                Ok(Lowered::Value)
            }
            // Truncation keeps the wide bits; uses that need them masked
            // mask at the use site
            CastOp::Trunc | CastOp::BitCast | CastOp::PtrToInt | CastOp::IntToPtr => {
                self.compile_operand(value)?;
                Ok(Lowered::Value)
            }
            CastOp::FpToSi => {
                self.compile_operand(value)?;
                self.put(&format!(
                    "\n{}.trunc_s/{}",
                    type_string(result_ty)?,
                    type_string(&src_ty)?
                ));
                Ok(Lowered::Value)
            }
            CastOp::FpToUi => {
                self.compile_operand(value)?;
                self.put(&format!(
                    "\n{}.trunc_u/{}",
                    type_string(result_ty)?,
                    type_string(&src_ty)?
                ));
                Ok(Lowered::Value)
            }
            CastOp::SiToFp => {
                self.compile_operand(value)?;
                let w = int_width(&src_ty)?;
                if w != 32 {
                    self.put(&format!(
                        "\ni32.const {s}\ni32.shl\ni32.const {s}\ni32.shr_s",
                        s = 32 - w
                    ));
                }
                self.put(&format!(
                    "\n{}.convert_s/{}",
                    type_string(result_ty)?,
                    type_string(&src_ty)?
                ));
                Ok(Lowered::Value)
            }
            CastOp::UiToFp => {
                self.compile_operand(value)?;
                let w = int_width(&src_ty)?;
                if w != 32 {
                    self.put(&format!(
                        "\ni32.const {}\ni32.and",
                        super::operands::mask_for_bit_width(w)
                    ));
                }
                self.put(&format!(
                    "\n{}.convert_u/{}",
                    type_string(result_ty)?,
                    type_string(&src_ty)?
                ));
                Ok(Lowered::Value)
            }
            CastOp::FpTrunc => {
                self.compile_operand(value)?;
                self.put(&format!(
                    "\n{}.demote/{}",
                    type_string(result_ty)?,
                    type_string(&src_ty)?
                ));
                Ok(Lowered::Value)
            }
            CastOp::FpExt => {
                self.compile_operand(value)?;
                self.put(&format!(
                    "\n{}.promote/{}",
                    type_string(result_ty)?,
                    type_string(&src_ty)?
                ));
                Ok(Lowered::Value)
            }
        }
    }

    fn compile_call(
        &mut self,
        callee: &Callee,
        args: &[Value],
        sig: &FuncSig,
    ) -> Result<Lowered, CompileError> {
        // Calling convention for variadic arguments: everything past the
        // fixed prefix is pushed onto the shadow stack in reverse order,
        // one 8-byte slot per argument. The callee reads them through its
        // saved stack pointer and frees the space via its return prologue.
        if sig.variadic && args.len() > sig.params.len() {
            for op in args[sig.params.len()..].iter().rev() {
                self.putln(&format!("get_global {}", self.stack_top_global));
                self.putln("i32.const 8");
                self.putln("i32.sub");
                self.putln(&format!("set_global {}", self.stack_top_global));
                self.putln(&format!("get_global {}", self.stack_top_global));
                self.operand_line(op)?;
                let ts = type_string(&self.module.value_type(self.cur_func(), op))?;
                self.putln(&format!("{}.store", ts));
            }
        }

        for op in &args[..sig.params.len().min(args.len())] {
            self.operand_line(op)?;
        }

        match callee {
            Callee::Direct(f) => match self.function_ids.get(f).copied() {
                Some(id) => {
                    self.put(&format!("call {}", id));
                }
                None => {
                    let name = self.module.functions[*f].name.clone();
                    self.putln(&format!("unreachable ;; unknown call \"{}\"", name));
                    self.warn(WarningKind::UnknownCall, name);
                    return Ok(Lowered::Consumed);
                }
            },
            Callee::Indirect(target) => {
                let deps = self.global_deps;
                match deps.table_for_sig(sig) {
                    Some(table) => {
                        self.operand_line(target)?;
                        self.put(&format!("call_indirect $vt_{}", table.name));
                    }
                    None => {
                        self.putln("unreachable ;; unknown indirect call");
                        self.warn(
                            WarningKind::UnknownIndirectCall,
                            format!("({} arguments)", args.len()),
                        );
                        return Ok(Lowered::Consumed);
                    }
                }
            }
        }

        if sig.ret.is_none() {
            self.put("\n");
            return Ok(Lowered::Consumed);
        }
        Ok(Lowered::Value)
    }

    fn compile_intrinsic(
        &mut self,
        iid: InstId,
        intr: &Intrinsic,
        args: &[Value],
    ) -> Result<Lowered, CompileError> {
        match intr {
            Intrinsic::Trap => {
                self.putln("unreachable ;; trap");
                Ok(Lowered::Consumed)
            }
            Intrinsic::VaStart => {
                // The saved stack pointer is the post-push stack top, i.e.
                // the address of the first variadic argument
                self.operand_line(arg(args, 0)?)?;
                self.putln(&format!("get_local {}", self.cur_func().arg_count()));
                self.putln("i32.store");
                Ok(Lowered::Consumed)
            }
            Intrinsic::VaEnd
            | Intrinsic::InvariantStart
            | Intrinsic::LifetimeStart
            | Intrinsic::LifetimeEnd
            | Intrinsic::DbgDeclare
            | Intrinsic::DbgValue => Ok(Lowered::Consumed),
            Intrinsic::Downcast => {
                let src = arg(args, 0)?;
                let offset = arg(args, 1)?;
                let src_ty = self.module.value_type(self.cur_func(), src);
                self.compile_operand(src)?;
                let client = matches!(src_ty.pointee(), Some(IrType::Client));
                let zero_offset =
                    matches!(offset, Value::Constant(Constant::Int { value: 0, .. }));
                if !client && !zero_offset {
                    self.put("\n");
                    self.operand_line(offset)?;
                    self.put("i32.add");
                }
                Ok(Lowered::Value)
            }
            Intrinsic::DowncastCurrent => {
                self.compile_operand(arg(args, 0)?)?;
                Ok(Lowered::Value)
            }
            Intrinsic::CastUser => {
                if !self.cur_func().has_uses(iid) {
                    return Ok(Lowered::Consumed);
                }
                self.compile_operand(arg(args, 0)?)?;
                Ok(Lowered::Value)
            }
            Intrinsic::FltRounds => {
                // Rounding mode 1: nearest
                self.put("i32.const 1");
                Ok(Lowered::Value)
            }
            Intrinsic::Ctlz => {
                self.operand_line(arg(args, 0)?)?;
                self.put("i32.clz");
                Ok(Lowered::Value)
            }
            Intrinsic::Other(name) => {
                return_codegen_error!(UnknownIntrinsic, "unknown intrinsic {}", name)
            }
        }
    }
}
