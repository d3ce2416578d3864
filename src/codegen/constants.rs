//! Constant emission.
//!
//! Integer constants of full width print signed; narrower ones print their
//! zero-extended value. Floats print in hex-float form (or the `infinity` /
//! `nan` literals). Pointers to globals resolve through the layout helper,
//! function references through the function tables, and constant
//! expressions lower recursively. An unsupported constant expression emits
//! the placeholder token `undefined` and a diagnostic; the resulting module
//! typically fails target-side validation.

use crate::codegen::error::{CompileError, WarningKind};
use crate::codegen::instructions::integer_predicate;
use crate::codegen::operands::{sign_extend, zero_extend};
use crate::codegen::types::type_string;
use crate::codegen::WastWriter;
use crate::ir::nodes::{ConstExpr, Constant, FuncId, Value};
use crate::return_codegen_error;

impl<'a> WastWriter<'a> {
    pub(crate) fn compile_constant(&mut self, c: &Constant) -> Result<(), CompileError> {
        match c {
            Constant::Expr(e) => self.compile_constant_expr(e),
            Constant::Int { bits, value } => {
                if *bits == 32 {
                    let v = sign_extend(*value, *bits);
                    self.put(&format!("i32.const {}", v));
                } else {
                    let v = zero_extend(*value, *bits);
                    self.put(&format!("i32.const {}", v));
                }
                Ok(())
            }
            Constant::Float(f) => {
                self.put(&format!("f32.const {}", float32_literal(*f)));
                Ok(())
            }
            Constant::Double(d) => {
                self.put(&format!("f64.const {}", float64_literal(*d)));
                Ok(())
            }
            Constant::Global(g) => {
                let addr = self.layout.global_address(*g)?;
                self.put(&format!("i32.const {}", addr));
                Ok(())
            }
            Constant::NullPtr | Constant::Undef => {
                self.put("i32.const 0");
                Ok(())
            }
            Constant::FunctionRef(f) => self.compile_function_ref(*f),
            Constant::Str(_) | Constant::Array(_) | Constant::Struct(_) => {
                return_codegen_error!(Internal, "aggregate constant in operand position")
            }
        }
    }

    /// A function used as a value becomes its index into the module's
    /// indirection table: the owning table's base offset plus the
    /// function's assigned offset within it.
    fn compile_function_ref(&mut self, f: FuncId) -> Result<(), CompileError> {
        let deps = self.global_deps;
        let func = &self.module.functions[f];
        let (table, offset) = match (
            deps.table_for_sig(&func.sig),
            deps.function_addresses.get(&f),
        ) {
            (Some(t), Some(o)) => (t, *o),
            _ => {
                return_codegen_error!(
                    Internal,
                    "function {} is used as a value but has no table entry",
                    func.name
                )
            }
        };
        let base = match self.function_table_offsets.get(&table.name) {
            Some(b) => *b,
            None => {
                return_codegen_error!(
                    Internal,
                    "function table {} has no assigned offset",
                    table.name
                )
            }
        };
        self.put(&format!("i32.const {}", base + offset));
        Ok(())
    }

    pub(crate) fn compile_constant_expr(&mut self, e: &ConstExpr) -> Result<(), CompileError> {
        match e {
            ConstExpr::Gep {
                base,
                base_ty,
                indices,
            } => {
                let base_v = Value::Constant(base.clone());
                let index_vs: Vec<Value> =
                    indices.iter().cloned().map(Value::Constant).collect();
                self.compile_gep(&base_v, &index_vs, base_ty)
            }
            // No-ops at the value level
            ConstExpr::BitCast(inner)
            | ConstExpr::IntToPtr(inner)
            | ConstExpr::PtrToInt(inner) => self.compile_constant(inner),
            ConstExpr::ICmp { pred, lhs, rhs } => {
                self.compile_constant(lhs)?;
                self.put("\n");
                self.compile_constant(rhs)?;
                self.put("\n");
                let ts = type_string(&self.module.constant_type(lhs))?;
                self.put(&format!("{}.{}", ts, integer_predicate(*pred)));
                Ok(())
            }
            ConstExpr::Other(name) => {
                self.put("undefined");
                self.warn(WarningKind::UnsupportedConstantExpr, name.clone());
                Ok(())
            }
        }
    }
}

pub(crate) fn float32_literal(f: f32) -> String {
    if f.is_infinite() {
        if f.is_sign_negative() {
            "-infinity".to_string()
        } else {
            "infinity".to_string()
        }
    } else if f.is_nan() {
        "nan".to_string()
    } else {
        hex_float32(f)
    }
}

pub(crate) fn float64_literal(d: f64) -> String {
    if d.is_infinite() {
        if d.is_sign_negative() {
            "-infinity".to_string()
        } else {
            "infinity".to_string()
        }
    } else if d.is_nan() {
        "nan".to_string()
    } else {
        hex_float64(d)
    }
}

fn hex_significand(fraction: u64, nibbles: usize) -> String {
    let digits = format!("{:0width$x}", fraction, width = nibbles);
    digits.trim_end_matches('0').to_string()
}

/// Canonical hex-float rendering, `[-]0x1.<frac>p<exp>` with the fraction's
/// trailing zeros trimmed. Subnormals are normalized first so the leading
/// digit is always 1 (or 0 for zero itself).
pub(crate) fn hex_float64(value: f64) -> String {
    let bits = value.to_bits();
    let sign = if bits >> 63 != 0 { "-" } else { "" };
    let exp_field = ((bits >> 52) & 0x7ff) as i64;
    let mut fraction = bits & ((1u64 << 52) - 1);
    if exp_field == 0 && fraction == 0 {
        return format!("{}0x0p+0", sign);
    }
    let exp = if exp_field == 0 {
        let top = 63 - fraction.leading_zeros();
        let shift = 52 - top;
        fraction = (fraction << shift) & ((1u64 << 52) - 1);
        -1022 - shift as i64
    } else {
        exp_field - 1023
    };
    let digits = hex_significand(fraction, 13);
    if digits.is_empty() {
        format!("{}0x1p{:+}", sign, exp)
    } else {
        format!("{}0x1.{}p{:+}", sign, digits, exp)
    }
}

pub(crate) fn hex_float32(value: f32) -> String {
    let bits = value.to_bits();
    let sign = if bits >> 31 != 0 { "-" } else { "" };
    let exp_field = ((bits >> 23) & 0xff) as i64;
    let mut fraction = (bits & ((1u32 << 23) - 1)) as u64;
    if exp_field == 0 && fraction == 0 {
        return format!("{}0x0p+0", sign);
    }
    let exp = if exp_field == 0 {
        let top = 63 - fraction.leading_zeros();
        let shift = 23 - top;
        fraction = (fraction << shift) & ((1u64 << 23) - 1);
        -126 - shift as i64
    } else {
        exp_field - 127
    };
    // widen to a whole number of nibbles
    let digits = hex_significand(fraction << 1, 6);
    if digits.is_empty() {
        format!("{}0x1p{:+}", sign, exp)
    } else {
        format!("{}0x1.{}p{:+}", sign, digits, exp)
    }
}
