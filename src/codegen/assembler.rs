//! Module assembly.
//!
//! Two passes: first assign numeric ids to imported and defined functions
//! (in that order), then emit the module in its fixed order — imports,
//! function-table types, the table element list, memory, the stack-top
//! global, the start function, every body, the synthesized constructor
//! runner, and finally the data segments.

use rustc_hash::FxHashMap;

use crate::codegen::error::CompileError;
use crate::codegen::renderer::WastRenderInterface;
use crate::codegen::types::type_string;
use crate::codegen::{WastWriter, WASM_PAGE_SIZE};
use crate::emit_log;
use crate::ir::layout::ByteWriter;
use crate::ir::nodes::{FuncId, FuncSig, Function, InstKind, IrType};
use crate::regalloc::RegisterKind;
use crate::return_codegen_error;

/// Streams initializer bytes as `\xx` escapes, resolving function-pointer
/// bytes through the assembler's table offsets.
struct DataBytesWriter<'s> {
    out: &'s mut String,
    offsets: &'s FxHashMap<String, u32>,
    missing: &'s mut Option<String>,
}

impl ByteWriter for DataBytesWriter<'_> {
    fn add_byte(&mut self, byte: u8) {
        self.out.push_str(&format!("\\{:02x}", byte));
    }

    fn function_table_offset(&mut self, table_name: &str) -> u32 {
        match self.offsets.get(table_name) {
            Some(offset) => *offset,
            None => {
                *self.missing = Some(table_name.to_string());
                0
            }
        }
    }
}

impl<'a> WastWriter<'a> {
    pub(crate) fn make_wast(&mut self) -> Result<(), CompileError> {
        let module = self.module;
        let deps = self.global_deps;
        emit_log!("emitting module with {} functions", module.functions.len());

        // First run: assign ids, imports before defined functions
        if self.opts.use_loader {
            for f in &deps.imports {
                let id = self.function_ids.len() as u32;
                self.function_ids.insert(*f, id);
            }
        }
        for (fid, func) in module.functions.iter().enumerate() {
            if func.has_body() {
                let id = self.function_ids.len() as u32;
                self.function_ids.insert(fid, id);
            }
        }

        self.putln("(module");

        // Imports go before everything else
        if self.opts.use_loader {
            for f in &deps.imports {
                self.compile_import(&module.functions[*f])?;
            }
        }

        // One type per function table
        for table in &deps.tables {
            self.put(&format!("(type $vt_{} (func ", table.name));
            self.compile_sig_params(&table.sig)?;
            self.compile_sig_result(&table.sig)?;
            self.putln("))");
        }

        // A single table holds every addressable function, the per-signature
        // tables laid out back to back
        if !deps.tables.is_empty() {
            self.put("(table anyfunc (elem");
        }
        let mut table_offset = 0u32;
        for table in &deps.tables {
            for f in &table.functions {
                self.put(&format!(" ${}", module.functions[*f].name));
            }
            self.function_table_offsets
                .insert(table.name.clone(), table_offset);
            table_offset += table.functions.len() as u32;
        }
        if !deps.tables.is_empty() {
            self.putln("))");
        }

        self.putln(&format!(
            "(memory (export \"memory\") {} {})",
            self.opts.min_memory_pages, self.opts.max_memory_pages
        ));

        // The stack-top global: the shadow stack starts at the end of
        // default memory and grows down
        self.stack_top_global = self.used_globals;
        self.used_globals += 1;
        self.putln(&format!(
            "(global (mut i32) (i32.const {}))",
            self.opts.min_memory_pages * WASM_PAGE_SIZE
        ));

        // Start selection: the bootstrap entry wins when there are no
        // constructors; otherwise the synthesized runner takes the next id
        let bootstrap = module.bootstrap.filter(|f| self.function_ids.contains_key(f));
        if bootstrap.is_some() && deps.constructors.is_empty() {
            if let Some(id) = bootstrap.and_then(|b| self.function_ids.get(&b)) {
                let id = *id;
                self.putln(&format!("(start {})", id));
            }
        } else if !deps.constructors.is_empty() && !self.opts.use_loader {
            self.putln(&format!("(start {})", self.function_ids.len()));
        }

        for (fid, func) in module.functions.iter().enumerate() {
            if func.has_body() {
                self.compile_method(fid)
                    .map_err(|e| e.with_function(&func.name))?;
            }
        }

        // The constructor runner: call every defined constructor in
        // registry order, then hand off to the bootstrap entry
        if !deps.constructors.is_empty() && !self.opts.use_loader {
            self.putln("(func");
            for f in &deps.constructors {
                if !module.functions[*f].has_body() {
                    continue;
                }
                match self.function_ids.get(f).copied() {
                    Some(id) => self.putln(&format!("call {}", id)),
                    None => {
                        return_codegen_error!(
                            Internal,
                            "constructor {} has no function id",
                            module.functions[*f].name
                        )
                    }
                }
            }
            if let Some(b) = module.bootstrap {
                match self.function_ids.get(&b).copied() {
                    Some(id) => self.putln(&format!("call {}", id)),
                    None => {
                        return_codegen_error!(
                            Internal,
                            "bootstrap function {} has no function id",
                            module.functions[b].name
                        )
                    }
                }
            }
            self.putln(")");
        }

        self.compile_data_section()?;

        self.put(")");
        Ok(())
    }

    fn compile_import(&mut self, func: &Function) -> Result<(), CompileError> {
        let names = self.names;
        let filtered = names.filter(&func.name);
        self.put(&format!("(func (import \"imports\" \"{}\")", filtered));
        self.compile_sig_params(&func.sig)?;
        self.compile_sig_result(&func.sig)?;
        self.putln(")");
        Ok(())
    }

    fn compile_sig_params(&mut self, sig: &FuncSig) -> Result<(), CompileError> {
        if sig.params.is_empty() {
            return Ok(());
        }
        self.put("(param");
        for p in &sig.params {
            let ts = type_string(p)?;
            self.put(&format!(" {}", ts));
        }
        self.put(")");
        Ok(())
    }

    fn compile_sig_result(&mut self, sig: &FuncSig) -> Result<(), CompileError> {
        if let Some(ret) = &sig.ret {
            self.put(&format!("(result {})", type_string(ret)?));
        }
        Ok(())
    }

    /// One saved-stack-pointer slot, then one slot per SSA register in
    /// registerize order, then (if dispatch is needed) the label local.
    /// This ordering is load-bearing: branches, phi copies and the stack
    /// save/restore all reference locals by these fixed indices.
    fn compile_method_locals(
        &mut self,
        fid: FuncId,
        needs_label: bool,
    ) -> Result<(), CompileError> {
        let registerize = self.registerize;
        let regs = registerize.registers_for_function(fid)?;
        self.put("(local i32");
        for r in regs {
            match r.kind {
                RegisterKind::Double => self.put(" f64"),
                RegisterKind::Float => self.put(" f32"),
                RegisterKind::Integer => self.put(" i32"),
            }
        }
        if needs_label {
            self.put(" i32");
        }
        self.putln(")");
        Ok(())
    }

    pub(crate) fn compile_method(&mut self, fid: FuncId) -> Result<(), CompileError> {
        self.current_fun = fid;
        let module = self.module;
        let func = &module.functions[fid];
        emit_log!("lowering function {}", func.name);

        let names = self.names;
        self.put(&format!("(func ${}", func.name));
        self.put(&format!(" (export \"{}\")", names.filter(&func.name)));
        self.compile_sig_params(&func.sig)?;
        self.compile_sig_result(&func.sig)?;
        self.put("\n");

        let num_args = func.arg_count();
        let last_block;
        if func.blocks.len() == 1 {
            self.compile_method_locals(fid, false)?;
            self.putln(&format!("get_global {}", self.stack_top_global));
            self.putln(&format!("set_local {}", num_args));
            self.compile_bb(0)?;
            last_block = Some(0);
        } else {
            let structurer = self.structurer;
            let shape = structurer.run(func)?;
            self.compile_method_locals(fid, shape.needs_label())?;
            self.putln(&format!("get_global {}", self.stack_top_global));
            self.putln(&format!("set_local {}", num_args));
            let num_regs = self.registerize.registers_for_function(fid)?.len() as u32;
            // The label local is the very last one
            let label_local = 1 + num_args + num_regs;
            let mut ri = WastRenderInterface::new(self, label_local);
            shape.render(&mut ri)?;
            last_block = ri.last_depth0_block;
        }

        // A function has to terminate with a return instruction
        let ends_in_return = match last_block {
            Some(b) => matches!(
                func.terminator(b).map(|t| &t.kind),
                Some(InstKind::Ret { .. })
            ),
            None => false,
        };
        if !ends_in_return {
            if let Some(ret) = &func.sig.ret {
                self.putln(&format!("{}.const 0", type_string(ret)?));
            }
            self.putln("return");
        }
        self.putln(")");
        Ok(())
    }

    fn compile_data_section(&mut self) -> Result<(), CompileError> {
        let module = self.module;
        let layout = self.layout;
        let deps = self.global_deps;
        for (gid, gv) in module.globals.iter().enumerate() {
            if !gv.linear {
                continue;
            }
            let init = match &gv.init {
                Some(i) => i,
                None => continue,
            };
            // Globals that are themselves function pointers are resolved at
            // their use sites, not initialized as data
            if matches!(&gv.ty, IrType::Ptr(p) if matches!(&**p, IrType::Func(_))) {
                continue;
            }
            let addr = layout.global_address(gid)?;
            self.put(&format!("(data (i32.const {}) \"", addr));
            let mut missing = None;
            {
                let mut bytes = DataBytesWriter {
                    out: &mut self.stream,
                    offsets: &self.function_table_offsets,
                    missing: &mut missing,
                };
                layout.compile_constant_as_bytes(module, deps, &gv.ty, init, &mut bytes)?;
            }
            if let Some(name) = missing {
                return_codegen_error!(Internal, "function table {} has no assigned offset", name);
            }
            self.putln("\")");
        }
        Ok(())
    }
}
