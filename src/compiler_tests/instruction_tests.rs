//! Lowering tests for individual opcodes: operand order, typed opcode
//! selection, the signed/unsigned narrowing discipline, shadow-stack
//! allocas and the variadic call convention.

use crate::codegen::operands::sign_extend;
use crate::codegen::WastOpts;
use crate::compiler_tests::test_ir::{
    arg, emit_full, int, lower_single_block, narrow_int, single_function_module, val, FuncBuilder,
};
use crate::ir::nodes::{
    BinaryOp, Callee, CastOp, Constant, FuncSig, GlobalDeps, InstKind, IntPredicate, Intrinsic,
    IrType, Module, Value,
};
use crate::regalloc::{FunctionRegisters, Registerize};
use quickcheck::{QuickCheck, TestResult};

fn ptr_to(ty: IrType) -> IrType {
    IrType::Ptr(Box::new(ty))
}

#[test]
fn adds_two_ints_with_register_store_and_stack_restore() {
    let mut b = FuncBuilder::new(
        "add",
        &[IrType::Int(32), IrType::Int(32)],
        Some(IrType::Int(32)),
    );
    let sum = b.inst(
        IrType::Int(32),
        InstKind::Binary {
            op: BinaryOp::Add,
            lhs: arg(0),
            rhs: arg(1),
        },
    );
    b.inst(IrType::Void, InstKind::Ret { value: Some(val(sum)) });
    let text = lower_single_block(b.finish());
    assert_eq!(
        text,
        "get_local 0\nget_local 1\ni32.add\nset_local 3\n\
         get_local 3\nget_local 2\nset_global 0\nreturn\n"
    );
}

#[test]
fn divides_two_floats() {
    let mut b = FuncBuilder::new("div", &[IrType::Float, IrType::Float], Some(IrType::Float));
    let q = b.inst(
        IrType::Float,
        InstKind::Binary {
            op: BinaryOp::FDiv,
            lhs: arg(0),
            rhs: arg(1),
        },
    );
    b.inst(IrType::Void, InstKind::Ret { value: Some(val(q)) });
    let text = lower_single_block(b.finish());
    assert!(text.starts_with("get_local 0\nget_local 1\nf32.div\nset_local 3\n"));
    assert!(text.ends_with("return\n"));
}

#[test]
fn shift_opcodes_carry_their_signedness() {
    let mut b = FuncBuilder::new(
        "sh",
        &[IrType::Int(32), IrType::Int(32)],
        Some(IrType::Int(32)),
    );
    let a = b.inst(
        IrType::Int(32),
        InstKind::Binary {
            op: BinaryOp::AShr,
            lhs: arg(0),
            rhs: arg(1),
        },
    );
    let l = b.inst(
        IrType::Int(32),
        InstKind::Binary {
            op: BinaryOp::LShr,
            lhs: val(a),
            rhs: arg(1),
        },
    );
    b.inst(IrType::Void, InstKind::Ret { value: Some(val(l)) });
    let text = lower_single_block(b.finish());
    assert!(text.contains("i32.shr_s"));
    assert!(text.contains("i32.shr_u"));
}

#[test]
fn narrow_signed_compare_shifts_both_operands() {
    let mut b = FuncBuilder::new(
        "cmp",
        &[IrType::Int(8), IrType::Int(8)],
        Some(IrType::Int(1)),
    );
    let c = b.inst(
        IrType::Int(1),
        InstKind::ICmp {
            pred: IntPredicate::Slt,
            lhs: arg(0),
            rhs: arg(1),
        },
    );
    b.inst(IrType::Void, InstKind::Ret { value: Some(val(c)) });
    let text = lower_single_block(b.finish());
    assert!(text.contains(
        "get_local 0\ni32.const 24\ni32.shl\n\
         get_local 1\ni32.const 24\ni32.shl\n\
         i32.lt_s"
    ));
}

#[test]
fn full_width_signed_compare_needs_no_shift() {
    let mut b = FuncBuilder::new(
        "cmp",
        &[IrType::Int(32), IrType::Int(32)],
        Some(IrType::Int(1)),
    );
    let c = b.inst(
        IrType::Int(1),
        InstKind::ICmp {
            pred: IntPredicate::Slt,
            lhs: arg(0),
            rhs: arg(1),
        },
    );
    b.inst(IrType::Void, InstKind::Ret { value: Some(val(c)) });
    let text = lower_single_block(b.finish());
    assert!(text.contains("get_local 0\nget_local 1\ni32.lt_s"));
}

#[test]
fn unsigned_compare_masks_narrow_operands() {
    let mut b = FuncBuilder::new(
        "cmp",
        &[IrType::Int(16), IrType::Int(16)],
        Some(IrType::Int(1)),
    );
    let c = b.inst(
        IrType::Int(1),
        InstKind::ICmp {
            pred: IntPredicate::Ult,
            lhs: arg(0),
            rhs: arg(1),
        },
    );
    b.inst(IrType::Void, InstKind::Ret { value: Some(val(c)) });
    let text = lower_single_block(b.finish());
    assert!(text.contains(
        "get_local 0\ni32.const 65535\ni32.and\n\
         get_local 1\ni32.const 65535\ni32.and\n\
         i32.lt_u"
    ));
}

#[test]
fn pointer_compare_skips_normalization() {
    let p = ptr_to(IrType::Int(8));
    let mut b = FuncBuilder::new("cmp", &[p.clone(), p], Some(IrType::Int(1)));
    let c = b.inst(
        IrType::Int(1),
        InstKind::ICmp {
            pred: IntPredicate::Ult,
            lhs: arg(0),
            rhs: arg(1),
        },
    );
    b.inst(IrType::Void, InstKind::Ret { value: Some(val(c)) });
    let text = lower_single_block(b.finish());
    assert!(text.contains("get_local 0\nget_local 1\ni32.lt_u"));
}

/// `icmp slt W a b` lowers to the same stream as comparing
/// `(a << (32-W))` and `(b << (32-W))` signed, for every supported width.
#[test]
fn prop_signed_compare_matches_shifted_constant_form() {
    fn property(w_sel: usize, a: i32, c: i32) -> TestResult {
        let widths = [1u32, 8, 16, 32];
        let w = widths[w_sel % widths.len()];
        let mut fb = FuncBuilder::new("cmp", &[], Some(IrType::Int(1)));
        let cmp = fb.inst(
            IrType::Int(1),
            InstKind::ICmp {
                pred: IntPredicate::Slt,
                lhs: narrow_int(w, a as i64),
                rhs: narrow_int(w, c as i64),
            },
        );
        fb.inst(IrType::Void, InstKind::Ret { value: Some(val(cmp)) });
        let text = lower_single_block(fb.finish());

        let shift = 32 - w;
        let expected = format!(
            "i32.const {}\ni32.const {}\ni32.lt_s",
            sign_extend(a as i64, w) << shift,
            sign_extend(c as i64, w) << shift
        );
        TestResult::from_bool(text.contains(&expected))
    }

    QuickCheck::new()
        .tests(100)
        .quickcheck(property as fn(usize, i32, i32) -> TestResult);
}

#[test]
fn zext_masks_to_declared_width() {
    let mut b = FuncBuilder::new("z", &[IrType::Int(8)], Some(IrType::Int(32)));
    let z = b.inst(
        IrType::Int(32),
        InstKind::Cast {
            op: CastOp::ZExt,
            value: arg(0),
        },
    );
    b.inst(IrType::Void, InstKind::Ret { value: Some(val(z)) });
    let text = lower_single_block(b.finish());
    assert!(text.contains("get_local 0\ni32.const 255\ni32.and"));
}

#[test]
fn sext_shifts_in_and_out() {
    let mut b = FuncBuilder::new("s", &[IrType::Int(16)], Some(IrType::Int(32)));
    let s = b.inst(
        IrType::Int(32),
        InstKind::Cast {
            op: CastOp::SExt,
            value: arg(0),
        },
    );
    b.inst(IrType::Void, InstKind::Ret { value: Some(val(s)) });
    let text = lower_single_block(b.finish());
    assert!(text.contains("get_local 0\ni32.const 16\ni32.shl\ni32.const 16\ni32.shr_s"));
}

#[test]
fn trunc_is_a_value_level_noop() {
    let mut b = FuncBuilder::new("t", &[IrType::Int(32)], Some(IrType::Int(8)));
    let t = b.inst(
        IrType::Int(8),
        InstKind::Cast {
            op: CastOp::Trunc,
            value: arg(0),
        },
    );
    b.inst(IrType::Void, InstKind::Ret { value: Some(val(t)) });
    let text = lower_single_block(b.finish());
    assert!(text.contains("get_local 0\nset_local 2"));
}

#[test]
fn narrow_int_to_float_conversions_normalize_first() {
    let mut b = FuncBuilder::new("c", &[IrType::Int(8), IrType::Int(8)], Some(IrType::Double));
    let s = b.inst(
        IrType::Double,
        InstKind::Cast {
            op: CastOp::SiToFp,
            value: arg(0),
        },
    );
    let u = b.inst(
        IrType::Double,
        InstKind::Cast {
            op: CastOp::UiToFp,
            value: arg(1),
        },
    );
    let m = b.inst(
        IrType::Double,
        InstKind::Binary {
            op: BinaryOp::FMul,
            lhs: val(s),
            rhs: val(u),
        },
    );
    b.inst(IrType::Void, InstKind::Ret { value: Some(val(m)) });
    let text = lower_single_block(b.finish());
    assert!(text.contains(
        "get_local 0\ni32.const 24\ni32.shl\ni32.const 24\ni32.shr_s\nf64.convert_s/i32"
    ));
    assert!(text.contains("get_local 1\ni32.const 255\ni32.and\nf64.convert_u/i32"));
}

#[test]
fn float_conversion_opcodes() {
    let mut b = FuncBuilder::new("c", &[IrType::Double], Some(IrType::Int(32)));
    let narrow = b.inst(
        IrType::Float,
        InstKind::Cast {
            op: CastOp::FpTrunc,
            value: arg(0),
        },
    );
    let wide = b.inst(
        IrType::Double,
        InstKind::Cast {
            op: CastOp::FpExt,
            value: val(narrow),
        },
    );
    let out = b.inst(
        IrType::Int(32),
        InstKind::Cast {
            op: CastOp::FpToSi,
            value: val(wide),
        },
    );
    b.inst(IrType::Void, InstKind::Ret { value: Some(val(out)) });
    let text = lower_single_block(b.finish());
    assert!(text.contains("f32.demote/f64"));
    assert!(text.contains("f64.promote/f32"));
    assert!(text.contains("i32.trunc_s/f64"));
}

#[test]
fn bool_load_widens_to_byte() {
    let mut b = FuncBuilder::new("ld", &[ptr_to(IrType::Int(1))], Some(IrType::Int(1)));
    let v = b.inst(IrType::Int(1), InstKind::Load { ptr: arg(0) });
    b.inst(IrType::Void, InstKind::Ret { value: Some(val(v)) });
    let text = lower_single_block(b.finish());
    assert!(text.contains("get_local 0\ni32.load8_u"));
}

#[test]
fn bool_store_narrows_to_byte() {
    let mut b = FuncBuilder::new("st", &[ptr_to(IrType::Int(1))], None);
    b.inst(
        IrType::Void,
        InstKind::Store {
            ptr: arg(0),
            value: narrow_int(1, 1),
        },
    );
    b.inst(IrType::Void, InstKind::Ret { value: None });
    let text = lower_single_block(b.finish());
    assert!(text.contains("get_local 0\ni32.const 1\ni32.store8\n"));
}

#[test]
fn halfword_memory_access() {
    let mut b = FuncBuilder::new("h", &[ptr_to(IrType::Int(16))], Some(IrType::Int(16)));
    let v = b.inst(IrType::Int(16), InstKind::Load { ptr: arg(0) });
    b.inst(
        IrType::Void,
        InstKind::Store {
            ptr: arg(0),
            value: val(v),
        },
    );
    b.inst(IrType::Void, InstKind::Ret { value: Some(val(v)) });
    let text = lower_single_block(b.finish());
    assert!(text.contains("i32.load16_u"));
    assert!(text.contains("i32.store16\n"));
}

#[test]
fn alloca_carves_the_shadow_stack() {
    let mut b = FuncBuilder::new("frame", &[], None);
    let slot = b.inst(
        ptr_to(IrType::Int(32)),
        InstKind::Alloca {
            alloc_ty: IrType::Int(32),
        },
    );
    b.inst(
        IrType::Void,
        InstKind::Store {
            ptr: val(slot),
            value: int(7),
        },
    );
    b.inst(IrType::Void, InstKind::Ret { value: None });
    let text = lower_single_block(b.finish());
    assert!(text.contains(
        "get_global 0\ni32.const 4\ni32.sub\ntee_local 1\nset_global 0\n"
    ));
    assert!(text.contains("get_local 1\ni32.const 7\ni32.store\n"));
    // the return prologue frees the frame
    assert!(text.ends_with("get_local 0\nset_global 0\nreturn\n"));
}

#[test]
fn select_pushes_true_false_condition() {
    let mut b = FuncBuilder::new(
        "sel",
        &[IrType::Int(32), IrType::Int(32), IrType::Int(1)],
        Some(IrType::Int(32)),
    );
    let s = b.inst(
        IrType::Int(32),
        InstKind::Select {
            cond: arg(2),
            if_true: arg(0),
            if_false: arg(1),
        },
    );
    b.inst(IrType::Void, InstKind::Ret { value: Some(val(s)) });
    let text = lower_single_block(b.finish());
    assert!(text.contains("get_local 0\nget_local 1\nget_local 2\nselect"));
}

#[test]
fn frem_expands_to_truncated_division() {
    let mut b = FuncBuilder::new("rem", &[IrType::Double, IrType::Double], Some(IrType::Double));
    let r = b.inst(
        IrType::Double,
        InstKind::Binary {
            op: BinaryOp::FRem,
            lhs: arg(0),
            rhs: arg(1),
        },
    );
    b.inst(IrType::Void, InstKind::Ret { value: Some(val(r)) });
    let text = lower_single_block(b.finish());
    assert!(text.contains(
        "get_local 0\nget_local 0\nget_local 1\n\
         f64.div\nf64.trunc\nget_local 1\nf64.mul\nf64.sub"
    ));
}

#[test]
fn gep_folds_constants_and_scales_variables() {
    // struct { i32 a; i32 b[4]; }, indexing [0].b[i]
    let strct = IrType::Struct(vec![
        IrType::Int(32),
        IrType::Array(Box::new(IrType::Int(32)), 4),
    ]);
    let mut b = FuncBuilder::new(
        "gep",
        &[ptr_to(strct), IrType::Int(32)],
        Some(ptr_to(IrType::Int(32))),
    );
    let p = b.inst(
        ptr_to(IrType::Int(32)),
        InstKind::Gep {
            base: arg(0),
            indices: vec![int(0), int(1), arg(1)],
        },
    );
    b.inst(IrType::Void, InstKind::Ret { value: Some(val(p)) });
    let text = lower_single_block(b.finish());
    assert!(text.contains(
        "get_local 1\ni32.const 4\ni32.mul\n\
         i32.const 4\ni32.add\n\
         get_local 0\ni32.add"
    ));
}

#[test]
fn gep_elides_unit_scales_and_zero_offsets() {
    let mut b = FuncBuilder::new(
        "gep",
        &[ptr_to(IrType::Int(8)), IrType::Int(32)],
        Some(ptr_to(IrType::Int(8))),
    );
    let p = b.inst(
        ptr_to(IrType::Int(8)),
        InstKind::Gep {
            base: arg(0),
            indices: vec![arg(1)],
        },
    );
    b.inst(IrType::Void, InstKind::Ret { value: Some(val(p)) });
    let text = lower_single_block(b.finish());
    // no multiply for size 1, a single add folds in the base
    assert!(text.contains("get_local 1\nget_local 0\ni32.add"));
    assert!(!text.contains("i32.mul"));
}

#[test]
fn vaarg_loads_then_advances_by_slot_size() {
    let list = ptr_to(IrType::Int(32));
    let mut b = FuncBuilder::new("va", &[list], Some(IrType::Int(32)));
    let v = b.inst(IrType::Int(32), InstKind::VaArg { list: arg(0) });
    b.inst(IrType::Void, InstKind::Ret { value: Some(val(v)) });
    let text = lower_single_block(b.finish());
    assert!(text.contains(
        "get_local 0\ni32.load\ni32.load\n\
         get_local 0\nget_local 0\ni32.load\ni32.const 8\ni32.add\ni32.store\n"
    ));
}

#[test]
fn vastart_stores_the_saved_stack_pointer() {
    let sig = FuncSig::variadic(vec![IrType::Int(32)], None);
    let mut b = FuncBuilder::with_sig("vtest", sig);
    let slot = b.inst(
        ptr_to(IrType::Int(32)),
        InstKind::Alloca {
            alloc_ty: IrType::Int(32),
        },
    );
    b.inst(
        IrType::Void,
        InstKind::Intrinsic {
            intr: Intrinsic::VaStart,
            args: vec![val(slot)],
        },
    );
    b.inst(IrType::Void, InstKind::Ret { value: None });
    let text = lower_single_block(b.finish());
    // the hidden variadic pointer is the stack pointer saved on entry
    assert!(text.contains("get_local 2\nget_local 1\ni32.store\n"));
}

#[test]
fn variadic_call_marshals_extra_arguments_in_reverse() {
    let char_ptr = ptr_to(IrType::Int(8));
    let printf = FuncBuilder::declaration(
        "printf",
        FuncSig::variadic(vec![char_ptr], Some(IrType::Int(32))),
    );
    let printf_sig = printf.sig.clone();

    let mut b = FuncBuilder::new("main", &[], Some(IrType::Int(32)));
    let call = b.inst(
        IrType::Int(32),
        InstKind::Call {
            callee: Callee::Direct(0),
            args: vec![
                Value::Constant(Constant::Global(0)),
                int(1),
                Value::Constant(Constant::Double(2.0)),
            ],
            sig: printf_sig,
        },
    );
    b.inst(IrType::Void, InstKind::Ret { value: Some(val(call)) });

    let module = Module {
        functions: vec![printf, b.finish()],
        globals: vec![crate::ir::nodes::GlobalVariable {
            name: "fmt".to_string(),
            ty: IrType::Array(Box::new(IrType::Int(8)), 3),
            init: Some(Constant::Str(b"%d\0".to_vec())),
            linear: true,
        }],
        bootstrap: None,
    };
    let registerize = Registerize::one_per_value(&module).unwrap();
    let deps = GlobalDeps {
        imports: vec![0],
        ..GlobalDeps::default()
    };
    let opts = WastOpts {
        use_loader: true,
        ..WastOpts::default()
    };
    let out = emit_full(&module, &registerize, &deps, opts);

    assert!(out.text.contains("(func (import \"imports\" \"printf\")(param i32)(result i32))"));
    // last extra argument lands at the highest address, first at the lowest
    assert!(out.text.contains(
        "get_global 0\ni32.const 8\ni32.sub\nset_global 0\nget_global 0\n\
         f64.const 0x1p+1\nf64.store\n\
         get_global 0\ni32.const 8\ni32.sub\nset_global 0\nget_global 0\n\
         i32.const 1\ni32.store\n\
         i32.const 1024\n\
         call 0"
    ));
}

#[test]
fn unknown_direct_call_traps_with_a_comment() {
    let missing = FuncBuilder::declaration("mystery", FuncSig::new(Vec::new(), None));
    let missing_sig = missing.sig.clone();
    let mut b = FuncBuilder::new("main", &[], None);
    b.inst(
        IrType::Void,
        InstKind::Call {
            callee: Callee::Direct(0),
            args: Vec::new(),
            sig: missing_sig,
        },
    );
    b.inst(IrType::Void, InstKind::Ret { value: None });
    let module = Module {
        functions: vec![missing, b.finish()],
        globals: Vec::new(),
        bootstrap: None,
    };
    let registerize = Registerize::one_per_value(&module).unwrap();
    let out = emit_full(&module, &registerize, &GlobalDeps::default(), WastOpts::default());
    assert!(out.text.contains("unreachable ;; unknown call \"mystery\"\n"));
    assert_eq!(out.warnings.len(), 1);
}

#[test]
fn intrinsic_lowerings() {
    let mut b = FuncBuilder::new("intr", &[IrType::Int(32)], Some(IrType::Int(32)));
    let lz = b.inst(
        IrType::Int(32),
        InstKind::Intrinsic {
            intr: Intrinsic::Ctlz,
            args: vec![arg(0)],
        },
    );
    let rounds = b.inst(
        IrType::Int(32),
        InstKind::Intrinsic {
            intr: Intrinsic::FltRounds,
            args: Vec::new(),
        },
    );
    let sum = b.inst(
        IrType::Int(32),
        InstKind::Binary {
            op: BinaryOp::Add,
            lhs: val(lz),
            rhs: val(rounds),
        },
    );
    b.inst(IrType::Void, InstKind::Ret { value: Some(val(sum)) });
    let text = lower_single_block(b.finish());
    assert!(text.contains("get_local 0\ni32.clz\nset_local"));
    assert!(text.contains("i32.const 1\nset_local"));
}

#[test]
fn trap_becomes_unreachable() {
    let mut b = FuncBuilder::new("t", &[], None);
    b.inst(
        IrType::Void,
        InstKind::Intrinsic {
            intr: Intrinsic::Trap,
            args: Vec::new(),
        },
    );
    b.inst(IrType::Void, InstKind::Unreachable);
    let text = lower_single_block(b.finish());
    assert!(text.contains("unreachable ;; trap\n"));
    assert!(text.ends_with("unreachable\n"));
}

#[test]
fn unknown_intrinsic_is_fatal() {
    let mut b = FuncBuilder::new("bad", &[], None);
    b.inst(
        IrType::Void,
        InstKind::Intrinsic {
            intr: Intrinsic::Other("llvm.frobnicate".to_string()),
            args: Vec::new(),
        },
    );
    b.inst(IrType::Void, InstKind::Ret { value: None });
    let module = single_function_module(b.finish());
    let registerize = Registerize::one_per_value(&module).unwrap();
    let layout = crate::ir::layout::LinearLayout::from_module(&module, 1024).unwrap();
    let deps = GlobalDeps::default();
    let result = crate::codegen::emit_module(
        &module,
        &registerize,
        &layout,
        &deps,
        &crate::names::DefaultNameFilter,
        &crate::compiler_tests::test_ir::NoStructurer,
        WastOpts::default(),
    );
    let err = result.unwrap_err();
    assert_eq!(
        err.error_type,
        crate::codegen::error::ErrorType::UnknownIntrinsic
    );
    assert_eq!(err.function.as_deref(), Some("bad"));
}

#[test]
fn inlineable_operands_lower_in_place() {
    let mut b = FuncBuilder::new("inl", &[ptr_to(IrType::Int(32)), IrType::Int(32)], None);
    let sum = b.inst(
        IrType::Int(32),
        InstKind::Binary {
            op: BinaryOp::Add,
            lhs: arg(1),
            rhs: int(1),
        },
    );
    b.inst(
        IrType::Void,
        InstKind::Store {
            ptr: arg(0),
            value: val(sum),
        },
    );
    b.inst(IrType::Void, InstKind::Ret { value: None });
    let module = single_function_module(b.finish());

    let mut regs = FunctionRegisters::default();
    regs.inlineable.insert(0);
    let mut registerize = Registerize::new();
    registerize.insert_function(0, regs);

    let text = crate::compiler_tests::test_ir::lower_single_block_with(
        &module,
        &registerize,
        &GlobalDeps::default(),
    );
    assert!(text.contains(
        "get_local 0\nget_local 1\ni32.const 1\ni32.add\ni32.store\n"
    ));
}

#[test]
fn unused_side_effect_free_instructions_are_skipped() {
    let mut b = FuncBuilder::new("dead", &[IrType::Int(32)], None);
    b.inst(
        IrType::Int(32),
        InstKind::Binary {
            op: BinaryOp::Add,
            lhs: arg(0),
            rhs: int(1),
        },
    );
    b.inst(IrType::Void, InstKind::Ret { value: None });
    let text = lower_single_block(b.finish());
    assert!(!text.contains("i32.add"));
    assert!(!text.contains("drop"));
}

#[test]
fn unused_call_result_is_dropped() {
    let callee = FuncBuilder::declaration("get", FuncSig::new(Vec::new(), Some(IrType::Int(32))));
    let callee_sig = callee.sig.clone();
    let mut b = FuncBuilder::new("main", &[], None);
    b.inst(
        IrType::Int(32),
        InstKind::Call {
            callee: Callee::Direct(0),
            args: Vec::new(),
            sig: callee_sig,
        },
    );
    b.inst(IrType::Void, InstKind::Ret { value: None });
    let module = Module {
        functions: vec![callee, b.finish()],
        globals: Vec::new(),
        bootstrap: None,
    };
    let registerize = Registerize::one_per_value(&module).unwrap();
    let deps = GlobalDeps {
        imports: vec![0],
        ..GlobalDeps::default()
    };
    let opts = WastOpts {
        use_loader: true,
        ..WastOpts::default()
    };
    let out = emit_full(&module, &registerize, &deps, opts);
    assert!(out.text.contains("call 0\ndrop\n"));
}
