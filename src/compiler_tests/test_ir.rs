//! Shared IR construction helpers for the codegen tests.

use crate::codegen::error::{CompileError, ErrorType};
use crate::codegen::{emit_module, WastOpts, WastOutput, WastWriter};
use crate::ir::layout::LinearLayout;
use crate::ir::nodes::{
    BasicBlock, BlockId, Constant, FuncSig, Function, GlobalDeps, InstId, InstKind, Instruction,
    IrType, Module, Value,
};
use crate::names::DefaultNameFilter;
use crate::regalloc::Registerize;
use crate::structurer::{FunctionShape, Structurer};

pub(crate) struct FuncBuilder {
    func: Function,
    cur: BlockId,
}

impl FuncBuilder {
    pub(crate) fn new(name: &str, params: &[IrType], ret: Option<IrType>) -> FuncBuilder {
        FuncBuilder {
            func: Function {
                name: name.to_string(),
                sig: FuncSig::new(params.to_vec(), ret),
                blocks: vec![BasicBlock::default()],
                insts: Vec::new(),
                use_counts: Vec::new(),
            },
            cur: 0,
        }
    }

    pub(crate) fn with_sig(name: &str, sig: FuncSig) -> FuncBuilder {
        FuncBuilder {
            func: Function {
                name: name.to_string(),
                sig,
                blocks: vec![BasicBlock::default()],
                insts: Vec::new(),
                use_counts: Vec::new(),
            },
            cur: 0,
        }
    }

    /// A bodyless function (an import or an unknown external).
    pub(crate) fn declaration(name: &str, sig: FuncSig) -> Function {
        Function {
            name: name.to_string(),
            sig,
            blocks: Vec::new(),
            insts: Vec::new(),
            use_counts: Vec::new(),
        }
    }

    pub(crate) fn block(&mut self) -> BlockId {
        self.func.blocks.push(BasicBlock::default());
        self.func.blocks.len() - 1
    }

    pub(crate) fn switch_to(&mut self, b: BlockId) {
        self.cur = b;
    }

    pub(crate) fn inst(&mut self, ty: IrType, kind: InstKind) -> InstId {
        let id = self.func.insts.len();
        self.func.insts.push(Instruction {
            ty,
            kind,
            debug_loc: None,
        });
        self.func.blocks[self.cur].insts.push(id);
        id
    }

    pub(crate) fn finish(mut self) -> Function {
        self.func.recount_uses();
        self.func
    }
}

pub(crate) fn int(v: i64) -> Value {
    Value::Constant(Constant::Int { bits: 32, value: v })
}

pub(crate) fn narrow_int(bits: u32, v: i64) -> Value {
    Value::Constant(Constant::Int { bits, value: v })
}

pub(crate) fn arg(i: u32) -> Value {
    Value::Arg(i)
}

pub(crate) fn val(i: InstId) -> Value {
    Value::Inst(i)
}

pub(crate) fn single_function_module(func: Function) -> Module {
    Module {
        functions: vec![func],
        globals: Vec::new(),
        bootstrap: None,
    }
}

/// A structurer that must never be consulted; fine for modules where every
/// defined function has a single block.
pub(crate) struct NoStructurer;

impl Structurer for NoStructurer {
    fn run<'f>(
        &'f self,
        func: &'f Function,
    ) -> Result<Box<dyn FunctionShape + 'f>, CompileError> {
        Err(CompileError::new(
            format!("structurer consulted for {}", func.name),
            ErrorType::Internal,
        ))
    }
}

pub(crate) fn emit(module: &Module) -> WastOutput {
    let registerize = Registerize::one_per_value(module).unwrap();
    let deps = GlobalDeps::default();
    emit_full(module, &registerize, &deps, WastOpts::default())
}

pub(crate) fn emit_full(
    module: &Module,
    registerize: &Registerize,
    deps: &GlobalDeps,
    opts: WastOpts,
) -> WastOutput {
    let layout = LinearLayout::from_module(module, 1024).unwrap();
    emit_module(
        module,
        registerize,
        &layout,
        deps,
        &DefaultNameFilter,
        &NoStructurer,
        opts,
    )
    .unwrap()
}

/// Lower just the first block of a single-function module and hand back the
/// raw token stream, with locals indexed exactly as a full emission would
/// index them.
pub(crate) fn lower_single_block(func: Function) -> String {
    let module = single_function_module(func);
    let registerize = Registerize::one_per_value(&module).unwrap();
    lower_single_block_with(&module, &registerize, &GlobalDeps::default())
}

pub(crate) fn lower_single_block_with(
    module: &Module,
    registerize: &Registerize,
    deps: &GlobalDeps,
) -> String {
    let layout = LinearLayout::from_module(module, 1024).unwrap();
    let mut writer = WastWriter::new(
        module,
        registerize,
        &layout,
        deps,
        &DefaultNameFilter,
        &NoStructurer,
        WastOpts::default(),
    );
    writer.current_fun = 0;
    writer.compile_bb(0).unwrap();
    writer.stream
}
