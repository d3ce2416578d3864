//! Source types to target value kinds.
//!
//! The target knows exactly four value kinds. Integers of any declared
//! width and pointers live in i32; 32-bit floats in f32; 64-bit floats in
//! f64. Everything else is a fatal error.

use crate::codegen::error::CompileError;
use crate::ir::nodes::IrType;
use crate::return_codegen_error;

pub(crate) fn type_string(ty: &IrType) -> Result<&'static str, CompileError> {
    match ty {
        IrType::Int(_) | IrType::Ptr(_) => Ok("i32"),
        IrType::Float => Ok("f32"),
        IrType::Double => Ok("f64"),
        _ => return_codegen_error!(UnsupportedType, "unsupported type {:?}", ty),
    }
}

/// The declared bit width of an integer-typed value.
pub(crate) fn int_width(ty: &IrType) -> Result<u32, CompileError> {
    match ty {
        IrType::Int(w) => Ok(*w),
        _ => return_codegen_error!(UnsupportedType, "expected an integer type, found {:?}", ty),
    }
}
