//! Operand evaluation.
//!
//! Any SSA value is emitted as either a constant, an inlined recursive
//! lowering of its defining instruction (when the registerize policy folded
//! it into its single use), or a local read of its assigned register.
//!
//! The signed/unsigned helpers implement the narrowing discipline: the
//! target has no signedness in its types, so narrow signed values are
//! left-shifted into the top bits before signed comparisons (and
//! sign-restored with a matching arithmetic right shift when the value
//! itself is needed), while unsigned uses mask down to the declared width.

use crate::codegen::error::CompileError;
use crate::codegen::types::int_width;
use crate::codegen::WastWriter;
use crate::ir::nodes::{Constant, Value};

impl<'a> WastWriter<'a> {
    pub(crate) fn compile_operand(&mut self, v: &Value) -> Result<(), CompileError> {
        match v {
            Value::Constant(c) => self.compile_constant(c),
            Value::Inst(id) => {
                if self.registerize.is_inlineable(self.current_fun, *id) {
                    // The inlineable predicate is the single source of truth:
                    // only pure, single-use instructions may be folded here.
                    let _ = self.compile_instruction(*id)?;
                    Ok(())
                } else {
                    let local = self.register_local(*id)?;
                    self.put(&format!("get_local {}", local));
                    Ok(())
                }
            }
            Value::Arg(i) => {
                self.put(&format!("get_local {}", i));
                Ok(())
            }
        }
    }

    pub(crate) fn operand_line(&mut self, v: &Value) -> Result<(), CompileError> {
        self.compile_operand(v)?;
        self.put("\n");
        Ok(())
    }

    /// Emit `v` normalized for signed use. For comparisons both operands are
    /// shifted into the top bits, which preserves order without a restoring
    /// shift; value-producing uses get the matching `shr_s` appended.
    pub(crate) fn compile_signed_integer(
        &mut self,
        v: &Value,
        for_comparison: bool,
    ) -> Result<(), CompileError> {
        let width = int_width(&self.module.value_type(self.cur_func(), v))?;
        let shift = 32 - width;
        if let Value::Constant(Constant::Int { bits, value }) = v {
            let extended = sign_extend(*value, *bits);
            if for_comparison {
                self.put(&format!("i32.const {}", extended << shift));
            } else {
                self.put(&format!("i32.const {}", extended));
            }
            return Ok(());
        }

        self.compile_operand(v)?;
        if shift == 0 {
            return Ok(());
        }
        if for_comparison {
            self.put(&format!("\ni32.const {}\ni32.shl", shift));
        } else {
            self.put(&format!(
                "\ni32.const {}\ni32.shl\ni32.const {}\ni32.shr_s",
                shift, shift
            ));
        }
        Ok(())
    }

    /// Emit `v` masked down to its declared width.
    pub(crate) fn compile_unsigned_integer(&mut self, v: &Value) -> Result<(), CompileError> {
        let width = int_width(&self.module.value_type(self.cur_func(), v))?;
        if let Value::Constant(Constant::Int { bits, value }) = v {
            self.put(&format!("i32.const {}", zero_extend(*value, *bits)));
            return Ok(());
        }

        self.compile_operand(v)?;
        if width != 32 {
            self.put(&format!(
                "\ni32.const {}\ni32.and",
                mask_for_bit_width(width)
            ));
        }
        Ok(())
    }
}

pub(crate) fn sign_extend(value: i64, bits: u32) -> i64 {
    if bits >= 64 {
        value
    } else {
        (value << (64 - bits)) >> (64 - bits)
    }
}

pub(crate) fn zero_extend(value: i64, bits: u32) -> u64 {
    if bits >= 64 {
        value as u64
    } else {
        (value as u64) & ((1u64 << bits) - 1)
    }
}

pub(crate) fn mask_for_bit_width(width: u32) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1u32 << width) - 1
    }
}
