//! Shared test utilities for the ownership-flow passes.
//!
//! Consolidates counting helpers and a path-enumerating reference-count
//! simulator used across the rewriter, checker, and pipeline tests. Only
//! compiled in test builds.

use keel_ir::{Access, Function, Instr, ParamMode, Terminator, VarId};

/// Count `Retain` instructions for `var` across the whole function.
pub(crate) fn count_retains(func: &Function, var: VarId) -> usize {
    func.blocks
        .iter()
        .flat_map(|b| b.body.iter())
        .filter(|i| matches!(i, Instr::Retain { var: v } if *v == var))
        .count()
}

/// Count `Release` instructions for `var` across the whole function.
pub(crate) fn count_releases(func: &Function, var: VarId) -> usize {
    func.blocks
        .iter()
        .flat_map(|b| b.body.iter())
        .filter(|i| matches!(i, Instr::Release { var: v } if *v == var))
        .count()
}

/// Count `Release` instructions for `var` in one block.
pub(crate) fn count_block_releases(func: &Function, block: usize, var: VarId) -> usize {
    func.blocks[block]
        .body
        .iter()
        .filter(|i| matches!(i, Instr::Release { var: v } if *v == var))
        .count()
}

/// Count all inserted ownership operations (`Retain` + `Release`).
pub(crate) fn count_rc_ops(func: &Function) -> usize {
    func.blocks
        .iter()
        .flat_map(|b| b.body.iter())
        .filter(|i| matches!(i, Instr::Retain { .. } | Instr::Release { .. }))
        .count()
}

/// Simulate reference counts along every path of the rewritten function
/// and panic on any imbalance.
///
/// Enumerates paths from the entry, passing through each block at most
/// twice per path (enough to traverse a loop body and come back around).
/// Along each path: a produce or `Retain` gains one unit, a consumption,
/// `Release`, or yield spends one; spending at zero is a double-release or
/// unowned consumption, and anything left at a `Return` other than an
/// owned return slot is a leak.
///
/// Not alias-aware — callers exercising `AddrOf` shapes assert placement
/// directly instead.
pub(crate) fn assert_balanced_paths(func: &Function) {
    let mut counts = vec![0i32; func.vars.len()];
    for param in &func.params {
        if param.mode == ParamMode::Owned && func.var_class(param.var).is_tracked() {
            counts[param.var.index()] = 1;
        }
    }
    let visits = vec![0u8; func.blocks.len()];
    walk(func, func.entry.index(), counts, visits);
}

fn walk(func: &Function, block: usize, mut counts: Vec<i32>, mut visits: Vec<u8>) {
    if visits[block] >= 2 {
        return;
    }
    visits[block] += 1;

    let tracked = |v: VarId| func.var_class(v).is_tracked();
    let spend = |counts: &mut [i32], v: VarId, what: &str| {
        assert!(
            counts[v.index()] > 0,
            "{what} of `{}` with no ownership on a path through block {block}",
            func.var_name(v),
        );
        counts[v.index()] -= 1;
    };

    for instr in &func.blocks[block].body {
        match instr {
            Instr::Bind { dst, args } => {
                for op in args {
                    if tracked(op.var) && op.access == Access::Consume {
                        spend(&mut counts, op.var, "consumption");
                    }
                }
                if tracked(*dst) {
                    counts[dst.index()] += 1;
                }
            }
            Instr::Effect { args } => {
                for op in args {
                    if tracked(op.var) && op.access == Access::Consume {
                        spend(&mut counts, op.var, "consumption");
                    }
                }
            }
            Instr::AddrOf { .. } => {}
            Instr::Retain { var } => {
                counts[var.index()] += 1;
            }
            Instr::Release { var } => spend(&mut counts, *var, "release"),
        }
    }

    match &func.blocks[block].terminator {
        Terminator::Return => {
            for (idx, &count) in counts.iter().enumerate() {
                let var = VarId::new(u32::try_from(idx).unwrap_or(u32::MAX));
                if !tracked(var) {
                    continue;
                }
                if func.ret == Some(var) && func.returns_owned {
                    // The slot carries one unit out to the caller — or
                    // zero in an iterator whose value was already yielded.
                    assert!(
                        count == 0 || count == 1,
                        "return slot holds {count} unit(s) at return in block {block}",
                    );
                } else {
                    assert!(
                        count == 0,
                        "`{}` holds {count} unit(s) at return in block {block}",
                        func.var_name(var),
                    );
                }
            }
        }
        Terminator::Yield { resume } => {
            if let Some(ret) = func.ret {
                spend(&mut counts, ret, "yield");
            }
            walk(func, resume.index(), counts, visits);
        }
        Terminator::Jump { target } => {
            walk(func, target.index(), counts, visits);
        }
        Terminator::Branch {
            then_block,
            else_block,
            ..
        } => {
            walk(func, then_block.index(), counts.clone(), visits.clone());
            walk(func, else_block.index(), counts, visits);
        }
    }
}
