//! # wastgen
//!
//! Lowers an already-optimized, SSA-form, linear-memory IR into the textual
//! S-expression form of a stack-based WebAssembly-like bytecode ("WAST").
//!
//! The crate consumes a [`ir::nodes::Module`] together with the external
//! collaborators whose contracts are fixed here: a register assignment
//! ([`regalloc::Registerize`]), a control-flow structurer
//! ([`structurer::Structurer`]), the linear-memory layout helper
//! ([`ir::layout::LinearLayout`]), the global dependency registry and an
//! export name filter. [`codegen::emit_module`] drives the whole pipeline and
//! returns the emitted module text plus any diagnostics raised along the way.

pub mod codegen;
pub mod ir;
pub mod names;
pub mod regalloc;
pub mod structurer;

pub(crate) mod compiler_tests {
    #[cfg(test)]
    pub(crate) mod constant_tests;
    #[cfg(test)]
    pub(crate) mod instruction_tests;
    #[cfg(test)]
    pub(crate) mod module_tests;
    #[cfg(test)]
    pub(crate) mod phi_tests;
    #[cfg(test)]
    pub(crate) mod renderer_tests;
    #[cfg(test)]
    pub(crate) mod test_ir;
}
