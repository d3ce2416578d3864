//! Pointer arithmetic folding.
//!
//! A GEP chain collapses into one additive expression: constant indices
//! (and struct field selections) fold into a single byte offset, variable
//! indices are scaled by their element size (the multiply elided when the
//! size is 1), and the components are chained with `i32.add`, the base
//! pointer last.

use crate::codegen::error::CompileError;
use crate::codegen::operands::sign_extend;
use crate::codegen::WastWriter;
use crate::ir::nodes::{Constant, IrType, Value};
use crate::return_codegen_error;

fn as_const_int(v: &Value) -> Option<i64> {
    match v {
        Value::Constant(Constant::Int { bits, value }) => Some(sign_extend(*value, *bits)),
        _ => None,
    }
}

impl<'a> WastWriter<'a> {
    pub(crate) fn compile_gep(
        &mut self,
        base: &Value,
        indices: &[Value],
        base_ty: &IrType,
    ) -> Result<(), CompileError> {
        let layout = self.layout;
        let pointee = match base_ty.pointee() {
            Some(p) => p,
            None => {
                return_codegen_error!(Internal, "GEP base is not a pointer: {:?}", base_ty)
            }
        };

        let mut const_offset: i64 = 0;
        let mut components: Vec<(&Value, u32)> = Vec::new();

        if let Some(first) = indices.first() {
            let size = layout.type_size(pointee)?;
            match as_const_int(first) {
                Some(v) => const_offset += v * size as i64,
                None => components.push((first, size)),
            }
            let mut cur = pointee;
            for idx in &indices[1..] {
                match cur {
                    IrType::Struct(fields) => {
                        let field = match as_const_int(idx) {
                            Some(k) => k as usize,
                            None => {
                                return_codegen_error!(
                                    Internal,
                                    "variable struct index in GEP"
                                )
                            }
                        };
                        const_offset += layout.field_offset(fields, field)? as i64;
                        cur = &fields[field];
                    }
                    IrType::Array(elem, _) => {
                        let size = layout.type_size(elem)?;
                        match as_const_int(idx) {
                            Some(v) => const_offset += v * size as i64,
                            None => components.push((idx, size)),
                        }
                        cur = elem;
                    }
                    other => {
                        return_codegen_error!(Internal, "cannot index into {:?}", other)
                    }
                }
            }
        }

        // Scaled variable components first, then the folded constant, then
        // the base pointer; each component after the first folds in with an
        // add, and the base claims the final one.
        let mut first_component = true;
        for (v, size) in components {
            self.operand_line(v)?;
            if size != 1 {
                self.putln(&format!("i32.const {}", size));
                self.putln("i32.mul");
            }
            if !first_component {
                self.putln("i32.add");
            }
            first_component = false;
        }
        if const_offset != 0 {
            self.putln(&format!("i32.const {}", const_offset as u32));
            if !first_component {
                self.putln("i32.add");
            }
            first_component = false;
        }
        self.compile_operand(base)?;
        if !first_component {
            self.put("\ni32.add");
        }
        Ok(())
    }
}
