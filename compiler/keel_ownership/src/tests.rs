//! End-to-end tests driving the full session on the canonical CFG shapes.

use keel_ir::{FunctionBuilder, Instr, Operand, ParamMode, ValueClass};

use crate::session::{analyze_function, DebugLevel, FlowConfig};
use crate::test_helpers::{
    assert_balanced_paths, count_block_releases, count_rc_ops, count_releases, count_retains,
};

fn config() -> FlowConfig {
    FlowConfig::default()
}

/// Linear block, single ownership transfer: nothing inserted, ownership
/// moves straight into the consumer.
#[test]
fn linear_single_transfer() {
    let mut b = FunctionBuilder::new("linear");
    let x = b.local("x", ValueClass::Managed);
    b.bind(x, vec![]);
    b.effect(vec![Operand::consume(x)]);
    b.ret();
    let mut func = b.finish();

    analyze_function(&mut func, config()).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(count_rc_ops(&func), 0);
    assert_balanced_paths(&func);
}

/// Diamond with conditional re-ownership: branch A consumes as its last
/// use, branch B does not touch the symbol, the join is the scope exit.
/// Exactly one release regardless of the branch taken — on B's path.
#[test]
fn diamond_conditional_reownership() {
    let mut b = FunctionBuilder::new("diamond");
    let c = b.local("c", ValueClass::Trivial);
    b.enter_scope();
    let x = b.local("x", ValueClass::Managed);
    let arm_a = b.new_block();
    let arm_b = b.new_block();
    b.exit_scope();
    let join = b.new_block();

    b.bind(x, vec![]);
    b.branch(c, arm_a, arm_b);
    b.position_at(arm_a);
    b.effect(vec![Operand::consume(x)]);
    b.jump(join);
    b.position_at(arm_b);
    b.jump(join);
    b.position_at(join);
    b.ret();
    let mut func = b.finish();

    analyze_function(&mut func, config()).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(count_retains(&func, x), 0);
    assert_eq!(count_releases(&func, x), 1);
    assert_eq!(count_block_releases(&func, arm_b.index(), x), 1);
    assert_balanced_paths(&func);
}

/// Double consumption in one block: exactly one duplication (before the
/// first consumption), ownership transferred at the second.
#[test]
fn double_consumption_in_one_block() {
    let mut b = FunctionBuilder::new("double");
    let x = b.local("x", ValueClass::Managed);
    b.bind(x, vec![]);
    b.effect(vec![Operand::consume(x)]);
    b.effect(vec![Operand::consume(x)]);
    b.ret();
    let mut func = b.finish();

    analyze_function(&mut func, config()).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(count_retains(&func, x), 1);
    assert_eq!(count_releases(&func, x), 0);
    assert_balanced_paths(&func);
}

/// Loop carrying ownership: owned through every loop-body block, exactly
/// one release at the single post-loop exit block.
#[test]
fn loop_carrying_ownership() {
    let mut b = FunctionBuilder::new("looped");
    let c = b.local("c", ValueClass::Trivial);
    b.enter_scope();
    let x = b.local("x", ValueClass::Managed);
    let header = b.new_block();
    let body = b.new_block();
    b.exit_scope();
    let after = b.new_block();

    b.bind(x, vec![]);
    b.jump(header);
    b.position_at(header);
    b.branch(c, body, after);
    b.position_at(body);
    b.effect(vec![Operand::read(x)]);
    b.jump(header);
    b.position_at(after);
    b.ret();
    let mut func = b.finish();

    analyze_function(&mut func, config()).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(count_releases(&func, x), 1);
    assert_eq!(count_block_releases(&func, after.index(), x), 1);
    assert_balanced_paths(&func);
}

/// A function with no tracked symbols is a no-op for the whole pass.
#[test]
fn untracked_function_is_untouched() {
    let mut b = FunctionBuilder::new("scalars");
    let i = b.local("i", ValueClass::Trivial);
    b.bind(i, vec![]);
    b.effect(vec![Operand::read(i)]);
    b.ret();
    let mut func = b.finish();
    let before = func.clone();

    analyze_function(&mut func, config()).unwrap_or_else(|e| panic!("{e}"));
    assert!(func == before);
}

/// Ownership returned to the caller: the slot is produced, read at the
/// return, and never released here.
#[test]
fn owned_return_value_is_not_released() {
    let mut b = FunctionBuilder::new("make");
    let r = b.return_slot(ValueClass::Managed, true);
    b.bind(r, vec![]);
    b.ret();
    let mut func = b.finish();

    analyze_function(&mut func, config()).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(count_rc_ops(&func), 0);
    assert_balanced_paths(&func);
}

/// Consuming through an intra-block alias transfers the shared storage's
/// ownership — no duplication, no release.
#[test]
fn alias_consumption_transfers_the_storage() {
    let mut b = FunctionBuilder::new("aliased");
    let x = b.local("x", ValueClass::Managed);
    let r = b.local("r", ValueClass::Managed);
    b.bind(x, vec![]);
    b.addr_of(r, x);
    b.effect(vec![Operand::consume(r)]);
    b.ret();
    let mut func = b.finish();

    analyze_function(&mut func, config()).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(count_rc_ops(&func), 0);
}

/// An address-taken symbol read after the alias's consumption forces a
/// duplication for the consumption instead.
#[test]
fn alias_consumption_before_later_read_retains() {
    let mut b = FunctionBuilder::new("aliased_live");
    let x = b.local("x", ValueClass::Managed);
    let r = b.local("r", ValueClass::Managed);
    b.bind(x, vec![]);
    b.addr_of(r, x);
    b.effect(vec![Operand::consume(r)]);
    b.effect(vec![Operand::read(x)]);
    b.ret();
    let mut func = b.finish();

    analyze_function(&mut func, config()).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(count_retains(&func, r), 1);
    // The storage is still owned afterwards and dies at the function exit.
    assert_eq!(count_releases(&func, x) + count_releases(&func, r), 1);
}

/// Iterator end to end: yielded values transfer at each suspension, dead
/// locals are released before suspending, and the final return is clean.
#[test]
fn iterator_session_is_balanced() {
    let mut b = FunctionBuilder::new("gen");
    b.mark_iterator();
    let r = b.return_slot(ValueClass::Managed, true);
    let t = b.local("t", ValueClass::Managed);
    let mid = b.new_block();
    let done = b.new_block();

    b.bind(r, vec![]);
    b.bind(t, vec![]);
    b.yield_to(mid);
    b.position_at(mid);
    b.bind(r, vec![]);
    b.yield_to(done);
    b.position_at(done);
    b.ret();
    let mut func = b.finish();

    analyze_function(&mut func, config()).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(count_releases(&func, t), 1);
    assert_eq!(count_block_releases(&func, 0, t), 1);
    assert_eq!(count_retains(&func, r), 0);
    assert_eq!(count_releases(&func, r), 0);
    assert_balanced_paths(&func);
}

/// Exit coverage: with a release required on one arm and a transfer on
/// the other, the rewritten function passes the checker and the inserted
/// operations survive a verbose re-run (dump paths exercised).
#[test]
fn verbose_debug_levels_do_not_change_results() {
    let build = || {
        let mut b = FunctionBuilder::new("dbg");
        let c = b.local("c", ValueClass::Trivial);
        b.enter_scope();
        let x = b.local("x", ValueClass::Managed);
        let arm_a = b.new_block();
        let arm_b = b.new_block();
        b.exit_scope();
        let join = b.new_block();
        b.bind(x, vec![]);
        b.branch(c, arm_a, arm_b);
        b.position_at(arm_a);
        b.effect(vec![Operand::consume(x)]);
        b.jump(join);
        b.position_at(arm_b);
        b.jump(join);
        b.position_at(join);
        b.ret();
        b.finish()
    };

    let mut quiet = build();
    let mut loud = build();
    analyze_function(&mut quiet, FlowConfig::default()).unwrap_or_else(|e| panic!("{e}"));
    analyze_function(
        &mut loud,
        FlowConfig {
            debug: DebugLevel::VeryVerbose,
        },
    )
    .unwrap_or_else(|e| panic!("{e}"));
    assert!(quiet == loud);
}

/// The inserted operations are `Retain`/`Release` only — the pass never
/// removes or reorders the front end's instructions.
#[test]
fn original_instructions_survive_in_order() {
    let mut b = FunctionBuilder::new("order");
    let x = b.local("x", ValueClass::Managed);
    let y = b.local("y", ValueClass::Managed);
    b.bind(x, vec![]);
    b.bind(y, vec![Operand::read(x)]);
    b.effect(vec![Operand::consume(x)]);
    b.effect(vec![Operand::consume(y)]);
    b.ret();
    let mut func = b.finish();
    let originals: Vec<Instr> = func.blocks[0].body.clone();

    analyze_function(&mut func, config()).unwrap_or_else(|e| panic!("{e}"));
    let survivors: Vec<Instr> = func.blocks[0]
        .body
        .iter()
        .filter(|i| !matches!(i, Instr::Retain { .. } | Instr::Release { .. }))
        .cloned()
        .collect();
    assert!(survivors == originals);
    assert_balanced_paths(&func);
}

/// Borrowed formals: consumed twice, every consumption needs its own
/// duplication and the formal is never released.
#[test]
fn borrowed_formal_double_consumption() {
    let mut b = FunctionBuilder::new("borrower");
    let q = b.param("q", ValueClass::Managed, ParamMode::Borrowed);
    b.effect(vec![Operand::consume(q)]);
    b.effect(vec![Operand::consume(q)]);
    b.ret();
    let mut func = b.finish();

    analyze_function(&mut func, config()).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(count_retains(&func, q), 2);
    assert_eq!(count_releases(&func, q), 0);
    assert_balanced_paths(&func);
}
