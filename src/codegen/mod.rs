//! The lowering engine.
//!
//! [`WastWriter`] owns the output stream and the per-module emission state
//! (function ids, function-table offsets, the stack-top global id) for the
//! duration of a single [`emit_module`] call. The per-concern pieces live in
//! their own modules and hang additional impl blocks off `WastWriter`:
//!
//! - `types` — source types to target value kinds
//! - `constants` — typed literals, addresses, table indices, hex floats
//! - `operands` — operand evaluation and signed/unsigned narrowing
//! - `instructions` — per-opcode lowering and the per-block driver
//! - `gep` — pointer arithmetic folding
//! - `phis` — edge-local phi assignment with cycle breaking
//! - `renderer` — the structured control callback surface
//! - `assembler` — module header, bodies, data segments

pub mod assembler;
pub mod constants;
pub mod dev_logging;
pub mod error;
pub mod gep;
pub mod instructions;
pub mod operands;
pub mod phis;
pub mod renderer;
pub mod types;

use rustc_hash::FxHashMap;

use crate::codegen::error::{print_formatted_warning, CompileError, CompilerWarning, WarningKind};
use crate::ir::layout::LinearLayout;
use crate::ir::nodes::{FuncId, Function, GlobalDeps, Module};
use crate::names::NameFilter;
use crate::regalloc::Registerize;
use crate::structurer::Structurer;

pub const WASM_PAGE_SIZE: u32 = 65536;

#[derive(Debug, Clone)]
pub struct WastOpts {
    pub min_memory_pages: u32,
    pub max_memory_pages: u32,
    /// When set, imported functions are emitted first and take the lowest
    /// function ids, the way a host-side loader expects them.
    pub use_loader: bool,
}

impl Default for WastOpts {
    fn default() -> WastOpts {
        WastOpts {
            min_memory_pages: 1,
            max_memory_pages: 2,
            use_loader: false,
        }
    }
}

/// The emitted module plus the diagnostics raised while producing it.
#[derive(Debug)]
pub struct WastOutput {
    pub text: String,
    pub warnings: Vec<CompilerWarning>,
}

pub struct WastWriter<'a> {
    pub(crate) module: &'a Module,
    pub(crate) registerize: &'a Registerize,
    pub(crate) layout: &'a LinearLayout,
    pub(crate) global_deps: &'a GlobalDeps,
    pub(crate) names: &'a dyn NameFilter,
    pub(crate) structurer: &'a dyn Structurer,
    pub(crate) opts: WastOpts,
    pub(crate) stream: String,
    pub(crate) function_ids: FxHashMap<FuncId, u32>,
    pub(crate) function_table_offsets: FxHashMap<String, u32>,
    pub(crate) stack_top_global: u32,
    pub(crate) used_globals: u32,
    pub(crate) current_fun: FuncId,
    pub(crate) warnings: Vec<CompilerWarning>,
}

impl<'a> WastWriter<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        module: &'a Module,
        registerize: &'a Registerize,
        layout: &'a LinearLayout,
        global_deps: &'a GlobalDeps,
        names: &'a dyn NameFilter,
        structurer: &'a dyn Structurer,
        opts: WastOpts,
    ) -> WastWriter<'a> {
        WastWriter {
            module,
            registerize,
            layout,
            global_deps,
            names,
            structurer,
            opts,
            stream: String::new(),
            function_ids: FxHashMap::default(),
            function_table_offsets: FxHashMap::default(),
            stack_top_global: 0,
            used_globals: 0,
            current_fun: 0,
            warnings: Vec::new(),
        }
    }

    pub(crate) fn cur_func(&self) -> &'a Function {
        &self.module.functions[self.current_fun]
    }

    pub(crate) fn put(&mut self, s: &str) {
        self.stream.push_str(s);
    }

    pub(crate) fn putln(&mut self, s: &str) {
        self.stream.push_str(s);
        self.stream.push('\n');
    }

    /// Record a recoverable diagnostic and keep emitting.
    pub(crate) fn warn(&mut self, kind: WarningKind, msg: String) {
        let w = CompilerWarning::new(msg, kind);
        print_formatted_warning(&w);
        self.warnings.push(w);
    }

    /// The local index of a SSA register: locals are laid out as arguments,
    /// then the saved-stack-pointer slot, then the registers.
    pub(crate) fn local_for_register(&self, reg: u32) -> u32 {
        1 + self.cur_func().arg_count() + reg
    }

    /// The local index holding the given instruction's register.
    pub(crate) fn register_local(&self, inst: usize) -> Result<u32, CompileError> {
        let reg = self.registerize.register_id(self.current_fun, inst)?;
        Ok(self.local_for_register(reg))
    }
}

/// Lower `module` to WAST text. Single pass, single thread; on a fatal
/// error the partially written stream is discarded along with the writer.
#[allow(clippy::too_many_arguments)]
pub fn emit_module(
    module: &Module,
    registerize: &Registerize,
    layout: &LinearLayout,
    global_deps: &GlobalDeps,
    names: &dyn NameFilter,
    structurer: &dyn Structurer,
    opts: WastOpts,
) -> Result<WastOutput, CompileError> {
    let mut writer = WastWriter::new(
        module,
        registerize,
        layout,
        global_deps,
        names,
        structurer,
        opts,
    );
    writer.make_wast()?;
    let WastWriter {
        stream, warnings, ..
    } = writer;
    Ok(WastOutput {
        text: stream,
        warnings,
    })
}
