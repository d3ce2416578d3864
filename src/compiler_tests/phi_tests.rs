//! Phi resolution tests: edge-local copies, same-register elision, and
//! cycle breaking through edge-specific registers.

use crate::codegen::{WastOpts, WastWriter};
use crate::compiler_tests::test_ir::{arg, int, single_function_module, val, FuncBuilder, NoStructurer};
use crate::ir::layout::LinearLayout;
use crate::ir::nodes::{BinaryOp, Function, GlobalDeps, InstKind, IrType, Module};
use crate::names::DefaultNameFilter;
use crate::regalloc::{FunctionRegisters, RegisterInfo, RegisterKind, Registerize};

/// b0 defines two sums and branches to b1, which carries the given phis.
fn two_defs_and_phis(phis: Vec<InstKind>) -> Function {
    let mut b = FuncBuilder::new("phis", &[IrType::Int(32)], None);
    b.inst(
        IrType::Int(32),
        InstKind::Binary {
            op: BinaryOp::Add,
            lhs: arg(0),
            rhs: int(1),
        },
    );
    b.inst(
        IrType::Int(32),
        InstKind::Binary {
            op: BinaryOp::Add,
            lhs: arg(0),
            rhs: int(2),
        },
    );
    b.inst(IrType::Void, InstKind::Br { dest: 1 });
    let b1 = b.block();
    b.switch_to(b1);
    for phi in phis {
        b.inst(IrType::Int(32), phi);
    }
    b.inst(IrType::Void, InstKind::Ret { value: None });
    b.finish()
}

fn integer_registers(n: usize) -> Vec<RegisterInfo> {
    (0..n)
        .map(|_| RegisterInfo {
            kind: RegisterKind::Integer,
        })
        .collect()
}

fn phi_stream(module: &Module, registerize: &Registerize) -> String {
    let layout = LinearLayout::from_module(module, 1024).unwrap();
    let deps = GlobalDeps::default();
    let mut writer = WastWriter::new(
        module,
        registerize,
        &layout,
        &deps,
        &DefaultNameFilter,
        &NoStructurer,
        WastOpts::default(),
    );
    writer.current_fun = 0;
    writer.compile_phis_of_block(1, 0).unwrap();
    writer.stream
}

#[test]
fn straight_phi_copy() {
    let func = two_defs_and_phis(vec![InstKind::Phi {
        incoming: vec![(0, val(0))],
    }]);
    let module = single_function_module(func);
    let registerize = Registerize::one_per_value(&module).unwrap();
    // value 0 lives in register 0 (local 2); the phi got register 2 (local 4)
    assert_eq!(phi_stream(&module, &registerize), "get_local 2\nset_local 4\n");
}

#[test]
fn same_register_assignment_is_elided() {
    let func = two_defs_and_phis(vec![InstKind::Phi {
        incoming: vec![(0, val(0))],
    }]);
    let module = single_function_module(func);

    let mut regs = FunctionRegisters::default();
    regs.registers = integer_registers(2);
    regs.ids.insert(0, 0);
    regs.ids.insert(1, 1);
    regs.ids.insert(3, 0); // the phi shares value 0's register
    let mut registerize = Registerize::new();
    registerize.insert_function(0, regs);

    assert_eq!(phi_stream(&module, &registerize), "");
}

#[test]
fn constant_incoming_always_copies() {
    let func = two_defs_and_phis(vec![InstKind::Phi {
        incoming: vec![(0, int(41))],
    }]);
    let module = single_function_module(func);
    let registerize = Registerize::one_per_value(&module).unwrap();
    assert_eq!(phi_stream(&module, &registerize), "i32.const 41\nset_local 4\n");
}

#[test]
fn swapped_phis_break_the_cycle_with_an_edge_register() {
    // phi a' (register 0) <- value 1 (register 1)
    // phi b' (register 1) <- value 0 (register 0)
    let func = two_defs_and_phis(vec![
        InstKind::Phi {
            incoming: vec![(0, val(1))],
        },
        InstKind::Phi {
            incoming: vec![(0, val(0))],
        },
    ]);
    let module = single_function_module(func);

    let mut regs = FunctionRegisters::default();
    regs.registers = integer_registers(3);
    regs.ids.insert(0, 0);
    regs.ids.insert(1, 1);
    regs.ids.insert(3, 0);
    regs.ids.insert(4, 1);
    // register 2 is the edge-local shadow for value 0 on the back edge
    regs.edge_ids.insert((0, 0, 1), 2);
    let mut registerize = Registerize::new();
    registerize.insert_function(0, regs);

    assert_eq!(
        phi_stream(&module, &registerize),
        concat!(
            "get_local 2\nset_local 4\n", // shadow value 0 into the edge register
            "get_local 3\nset_local 2\n", // phi a' <- value 1
            "get_local 4\nset_local 3\n", // phi b' <- value 0, via the shadow
        )
    );
}

#[test]
fn prologue_analysis_matches_what_would_be_emitted() {
    let no_phis = {
        let mut b = FuncBuilder::new("f", &[], None);
        b.inst(IrType::Void, InstKind::Br { dest: 1 });
        let b1 = b.block();
        b.switch_to(b1);
        b.inst(IrType::Void, InstKind::Ret { value: None });
        b.finish()
    };
    let module = single_function_module(no_phis);
    let registerize = Registerize::one_per_value(&module).unwrap();
    let layout = LinearLayout::from_module(&module, 1024).unwrap();
    let deps = GlobalDeps::default();
    let mut writer = WastWriter::new(
        &module,
        &registerize,
        &layout,
        &deps,
        &DefaultNameFilter,
        &NoStructurer,
        WastOpts::default(),
    );
    writer.current_fun = 0;
    assert!(!writer.needs_block_prologue(1, 0).unwrap());

    // A phi that shares its incoming register needs no prologue either
    let func = two_defs_and_phis(vec![InstKind::Phi {
        incoming: vec![(0, val(0))],
    }]);
    let module = single_function_module(func);
    let mut regs = FunctionRegisters::default();
    regs.registers = integer_registers(2);
    regs.ids.insert(0, 0);
    regs.ids.insert(1, 1);
    regs.ids.insert(3, 0);
    let mut registerize = Registerize::new();
    registerize.insert_function(0, regs);
    let layout = LinearLayout::from_module(&module, 1024).unwrap();
    let mut writer = WastWriter::new(
        &module,
        &registerize,
        &layout,
        &deps,
        &DefaultNameFilter,
        &NoStructurer,
        WastOpts::default(),
    );
    writer.current_fun = 0;
    assert!(!writer.needs_block_prologue(1, 0).unwrap());

    // With distinct registers the copy is real
    let registerize = Registerize::one_per_value(&module).unwrap();
    let mut writer2 = WastWriter::new(
        &module,
        &registerize,
        &layout,
        &deps,
        &DefaultNameFilter,
        &NoStructurer,
        WastOpts::default(),
    );
    writer2.current_fun = 0;
    assert!(writer2.needs_block_prologue(1, 0).unwrap());
}
