//! Linear-memory layout helper.
//!
//! Assigns a static address to every linear-memory global, answers size and
//! alignment queries for IR types, and serializes global initializers to raw
//! bytes for the data section. Function-pointer bytes are resolved through
//! the [`ByteWriter`], since table offsets are only known to the module
//! assembler.

use crate::codegen::error::CompileError;
use crate::ir::nodes::{Constant, FuncId, GlobalDeps, GlobalId, IrType, Module};
use crate::return_codegen_error;
use rustc_hash::FxHashMap;

/// Receives the serialized bytes of one initializer.
pub trait ByteWriter {
    fn add_byte(&mut self, byte: u8);
    /// Base offset of the named function table inside the module's single
    /// indirection table.
    fn function_table_offset(&mut self, table_name: &str) -> u32;
}

#[derive(Debug)]
pub struct LinearLayout {
    addresses: FxHashMap<GlobalId, u32>,
}

fn align_up(addr: u32, align: u32) -> u32 {
    (addr + align - 1) & !(align - 1)
}

impl LinearLayout {
    /// Scan the module and assign an aligned address to every linear-memory
    /// global, packing upwards from `data_base`.
    pub fn from_module(module: &Module, data_base: u32) -> Result<LinearLayout, CompileError> {
        let mut addresses = FxHashMap::default();
        let mut next = data_base;
        for (id, gv) in module.globals.iter().enumerate() {
            if !gv.linear {
                continue;
            }
            let align = Self::alignment_of(&gv.ty)?;
            next = align_up(next, align);
            addresses.insert(id, next);
            next += Self::size_of(&gv.ty)?;
        }
        Ok(LinearLayout { addresses })
    }

    pub fn global_address(&self, g: GlobalId) -> Result<u32, CompileError> {
        match self.addresses.get(&g) {
            Some(addr) => Ok(*addr),
            None => return_codegen_error!(
                Internal,
                "global {} has no assigned linear-memory address",
                g
            ),
        }
    }

    pub fn type_size(&self, ty: &IrType) -> Result<u32, CompileError> {
        Self::size_of(ty)
    }

    pub fn type_alignment(&self, ty: &IrType) -> Result<u32, CompileError> {
        Self::alignment_of(ty)
    }

    /// Byte offset of field `idx` inside a struct with the given fields.
    pub fn field_offset(&self, fields: &[IrType], idx: usize) -> Result<u32, CompileError> {
        let mut offset = 0u32;
        for (i, field) in fields.iter().enumerate() {
            offset = align_up(offset, Self::alignment_of(field)?);
            if i == idx {
                return Ok(offset);
            }
            offset += Self::size_of(field)?;
        }
        return_codegen_error!(Internal, "struct field index {} out of range", idx)
    }

    fn size_of(ty: &IrType) -> Result<u32, CompileError> {
        match ty {
            IrType::Int(w) if *w <= 8 => Ok(1),
            IrType::Int(w) if *w <= 16 => Ok(2),
            IrType::Int(_) => Ok(4),
            IrType::Float => Ok(4),
            IrType::Double => Ok(8),
            IrType::Ptr(_) => Ok(4),
            IrType::Array(elem, len) => {
                let stride = align_up(Self::size_of(elem)?, Self::alignment_of(elem)?);
                Ok(stride * (*len as u32))
            }
            IrType::Struct(fields) => {
                let mut size = 0u32;
                for field in fields {
                    size = align_up(size, Self::alignment_of(field)?);
                    size += Self::size_of(field)?;
                }
                Ok(align_up(size, Self::alignment_of(ty)?))
            }
            IrType::Func(_) | IrType::Client | IrType::Void => {
                return_codegen_error!(UnsupportedType, "cannot take the size of {:?}", ty)
            }
        }
    }

    fn alignment_of(ty: &IrType) -> Result<u32, CompileError> {
        match ty {
            IrType::Int(w) if *w <= 8 => Ok(1),
            IrType::Int(w) if *w <= 16 => Ok(2),
            IrType::Int(_) => Ok(4),
            IrType::Float => Ok(4),
            IrType::Double => Ok(8),
            IrType::Ptr(_) => Ok(4),
            IrType::Array(elem, _) => Self::alignment_of(elem),
            IrType::Struct(fields) => {
                let mut align = 1;
                for field in fields {
                    align = align.max(Self::alignment_of(field)?);
                }
                Ok(align)
            }
            IrType::Func(_) | IrType::Client | IrType::Void => {
                return_codegen_error!(UnsupportedType, "cannot take the alignment of {:?}", ty)
            }
        }
    }

    /// Serialize `init` (of type `ty`) to bytes. Function pointers are
    /// rewritten to their function-table index through `out`.
    pub fn compile_constant_as_bytes(
        &self,
        module: &Module,
        deps: &GlobalDeps,
        ty: &IrType,
        init: &Constant,
        out: &mut dyn ByteWriter,
    ) -> Result<(), CompileError> {
        match (ty, init) {
            (_, Constant::Undef) => {
                for _ in 0..Self::size_of(ty)? {
                    out.add_byte(0);
                }
                Ok(())
            }
            (IrType::Int(_), Constant::Int { value, .. }) => {
                let size = Self::size_of(ty)?;
                for i in 0..size {
                    out.add_byte((*value >> (8 * i)) as u8);
                }
                Ok(())
            }
            (IrType::Float, Constant::Float(f)) => {
                for b in f.to_bits().to_le_bytes() {
                    out.add_byte(b);
                }
                Ok(())
            }
            (IrType::Double, Constant::Double(d)) => {
                for b in d.to_bits().to_le_bytes() {
                    out.add_byte(b);
                }
                Ok(())
            }
            (IrType::Ptr(_), Constant::NullPtr) => {
                for _ in 0..4 {
                    out.add_byte(0);
                }
                Ok(())
            }
            (IrType::Ptr(_), Constant::Global(g)) => {
                for b in self.global_address(*g)?.to_le_bytes() {
                    out.add_byte(b);
                }
                Ok(())
            }
            (IrType::Ptr(_), Constant::FunctionRef(f)) => {
                let index = self.function_pointer_value(module, deps, *f, out)?;
                for b in index.to_le_bytes() {
                    out.add_byte(b);
                }
                Ok(())
            }
            (IrType::Array(_, _), Constant::Str(bytes)) => {
                // byte arrays have stride 1; nothing to pad
                for b in bytes {
                    out.add_byte(*b);
                }
                Ok(())
            }
            (IrType::Array(elem, _), Constant::Array(elems)) => {
                let stride = align_up(Self::size_of(elem)?, Self::alignment_of(elem)?);
                for e in elems {
                    self.compile_constant_as_bytes(module, deps, elem, e, out)?;
                    for _ in Self::size_of(elem)?..stride {
                        out.add_byte(0);
                    }
                }
                Ok(())
            }
            (IrType::Struct(fields), Constant::Struct(values)) => {
                let mut offset = 0u32;
                for (field, value) in fields.iter().zip(values) {
                    let aligned = align_up(offset, Self::alignment_of(field)?);
                    for _ in offset..aligned {
                        out.add_byte(0);
                    }
                    self.compile_constant_as_bytes(module, deps, field, value, out)?;
                    offset = aligned + Self::size_of(field)?;
                }
                let total = Self::size_of(ty)?;
                for _ in offset..total {
                    out.add_byte(0);
                }
                Ok(())
            }
            _ => return_codegen_error!(
                Internal,
                "initializer {:?} does not match type {:?}",
                init,
                ty
            ),
        }
    }

    fn function_pointer_value(
        &self,
        module: &Module,
        deps: &GlobalDeps,
        f: FuncId,
        out: &mut dyn ByteWriter,
    ) -> Result<u32, CompileError> {
        let table = match deps.table_for_function(f) {
            Some(t) => t,
            None => {
                return_codegen_error!(
                    Internal,
                    "function {} has no function-table entry",
                    module.functions[f].name
                )
            }
        };
        let offset = match deps.function_addresses.get(&f) {
            Some(o) => *o,
            None => {
                return_codegen_error!(
                    Internal,
                    "function {} has no assigned address",
                    module.functions[f].name
                )
            }
        };
        Ok(out.function_table_offset(&table.name) + offset)
    }
}
