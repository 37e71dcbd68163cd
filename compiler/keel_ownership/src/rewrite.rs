//! Rewriter: mutate the IR so every path balances ownership.
//!
//! Two insertion families, both driven by the converged flow sets:
//!
//! - **Duplication insertion** ([`insert_auto_copies`]) walks each block's
//!   recorded occurrences in order with a running owned bit-vector seeded
//!   from IN. A consumption may take the symbol's own ownership only when
//!   the bit is set *and* nothing touches the symbol afterwards (last
//!   occurrence in the block, nothing used later); every other consumption
//!   gets a `Retain` inserted immediately before the consuming
//!   instruction. Two consumptions of one symbol in a single instruction
//!   are independent: the first retains, the second transfers.
//!
//! - **Release insertion** ([`insert_auto_destroys`]) places `Release`
//!   operations so each unit of ownership dies exactly once per path:
//!   at the normalized end-of-scope blocks when ownership arrives on all
//!   paths; at the owning predecessor of a mixed-ownership edge (splitting
//!   the edge when the predecessor has several successors); and before
//!   every `Return` for symbols still owned there. Iterators additionally
//!   release dead symbols before each suspension
//!   ([`iterator_insert_auto_destroys`]) — a consumer may abandon the
//!   iterator while it is suspended, so values must not outlive the yield.
//!
//! Each inserted release clears the now-stale ownership bits downstream of
//! its block (stopping where a producer re-establishes ownership) so the
//! later passes cannot release the same unit twice.

use keel_ir::{Function, Instr, OccKind, Terminator};

use crate::bitset::BitSet;
use crate::cfg::Cfg;
use crate::exits::ExitMap;
use crate::flow::{FlowKind, FlowSets};
use crate::symbols::SymbolTable;
use crate::transitions::{transfers_ownership, OccSite, Occurrence, Transitions};

/// Insert a `Retain` before every consumption that cannot take the
/// symbol's own ownership.
///
/// Invalidates the instruction indices recorded in `trans`; run the
/// release passes (which only touch block ends) after this, never another
/// occurrence-indexed pass.
pub fn insert_auto_copies(
    func: &mut Function,
    table: &SymbolTable,
    sets: &FlowSets,
    trans: &Transitions,
) {
    let nsyms = sets.nsyms();
    let mut inserted = 0usize;

    for b in 0..trans.per_block.len() {
        let occs = &trans.per_block[b];
        if occs.is_empty() {
            continue;
        }
        let last = trans.last_positions(b, nsyms);
        let used_later = sets.get(FlowKind::UsedLater, b);
        let mut owned = sets.get(FlowKind::In, b).clone();

        let mut oi = 0;

        // Implicit productions (owned formals) precede the body.
        while oi < occs.len() && occs[oi].site == OccSite::Entry {
            let _ = step(&occs[oi], oi, &last, used_later, &mut owned, false);
            oi += 1;
        }

        let old_body = std::mem::take(&mut func.blocks[b].body);
        let mut new_body = Vec::with_capacity(old_body.len());

        for (i, instr) in old_body.into_iter().enumerate() {
            while oi < occs.len() && occs[oi].site == OccSite::Instr(i) {
                if let Some(sym) = step(&occs[oi], oi, &last, used_later, &mut owned, false) {
                    new_body.push(Instr::Retain {
                        var: table.var_at(sym),
                    });
                    inserted += 1;
                }
                oi += 1;
            }
            new_body.push(instr);
        }

        // Terminator consumptions (yields) retain at the block's end.
        while oi < occs.len() {
            debug_assert_eq!(occs[oi].site, OccSite::Terminator);
            let force = trans.is_yield_transfer(&occs[oi]);
            if let Some(sym) = step(&occs[oi], oi, &last, used_later, &mut owned, force) {
                new_body.push(Instr::Retain {
                    var: table.var_at(sym),
                });
                inserted += 1;
            }
            oi += 1;
        }

        func.blocks[b].body = new_body;
    }

    tracing::debug!(function = %func.name, inserted, "inserted duplications");
}

/// Advance the owned state over one occurrence. Returns `Some(sym)` when
/// the occurrence is a consumption that needs a `Retain`.
/// `force_transfer` marks a yield's consumption of the return slot, which
/// transfers without a last-use test.
fn step(
    occ: &Occurrence,
    pos: usize,
    last: &[usize],
    used_later: &BitSet,
    owned: &mut BitSet,
    force_transfer: bool,
) -> Option<usize> {
    match occ.kind {
        OccKind::Produce => {
            owned.set(occ.sym);
            for &a in &occ.aliases {
                owned.set(a);
            }
            None
        }
        OccKind::Use => None,
        OccKind::Consume => {
            if owned.get(occ.sym)
                && (force_transfer || transfers_ownership(occ, pos, last, used_later))
            {
                owned.clear(occ.sym);
                for &a in &occ.aliases {
                    owned.clear(a);
                }
                None
            } else {
                Some(occ.sym)
            }
        }
    }
}

/// Insert `Release` operations so every owned symbol dies exactly once on
/// every path: at end-of-scope blocks, at owning predecessors of
/// mixed-ownership edges, and at every function exit.
pub fn insert_auto_destroys(
    func: &mut Function,
    table: &SymbolTable,
    cfg: &Cfg,
    sets: &mut FlowSets,
    exits: &ExitMap,
) {
    let ret = table.ret_index();

    // End-of-scope releases: ownership that arrives on all paths into an
    // exit block is released there, once. Releasing a symbol kills the
    // storage its aliases share, so their stale bits die with it.
    for sym in 0..table.len() {
        if Some(sym) == ret {
            continue;
        }
        for &e in exits.blocks_for(sym) {
            let e = e.index();
            if !cfg.is_reachable(e) {
                continue;
            }
            if sets.bit(FlowKind::Out, e, sym) {
                func.blocks[e].body.push(Instr::Release {
                    var: table.var_at(sym),
                });
                clear_ownership_downstream(cfg, sets, e, sym);
                for &a in table.aliases_of(sym) {
                    clear_ownership_downstream(cfg, sets, e, a);
                }
            }
        }
    }

    // Mixed-ownership edges: a predecessor still owns what the meet at the
    // join discarded (e.g. one branch arm consumed, the other did not).
    // Collect from the converged sets first; splitting edges invalidates
    // the adapter's view.
    let mut work: Vec<(usize, usize, Vec<usize>)> = Vec::new();
    for p in 0..cfg.num_blocks() {
        if !cfg.is_reachable(p) {
            continue;
        }
        for &q in cfg.succs(p) {
            let syms: Vec<usize> = sets
                .get(FlowKind::Out, p)
                .ones()
                .filter(|&s| Some(s) != ret && !sets.bit(FlowKind::In, q, s))
                .collect();
            if !syms.is_empty() {
                work.push((p, q, syms));
            }
        }
    }
    for (p, q, syms) in work {
        if cfg.succs(p).len() == 1 {
            for &sym in &syms {
                if !sets.bit(FlowKind::Out, p, sym) {
                    continue;
                }
                func.blocks[p].body.push(Instr::Release {
                    var: table.var_at(sym),
                });
                sets.clear_bit(FlowKind::Out, p, sym);
                for &a in table.aliases_of(sym) {
                    sets.clear_bit(FlowKind::Out, p, a);
                }
            }
        } else {
            // The predecessor also feeds other blocks that still expect
            // ownership — release on a block split onto this edge.
            let scope = func.blocks[q].scope;
            let pred_id = func.blocks[p].id;
            let succ_id = func.blocks[q].id;
            let join = func.split_edge(pred_id, succ_id, scope);
            let jb = sets.push_block();
            debug_assert_eq!(jb, join.index());
            *sets.get_mut(FlowKind::In, jb) = sets.get(FlowKind::Out, p).clone();
            let mut out = sets.get(FlowKind::In, jb).clone();
            for &sym in &syms {
                if !out.get(sym) {
                    continue;
                }
                func.blocks[join.index()].body.push(Instr::Release {
                    var: table.var_at(sym),
                });
                out.clear(sym);
                for &a in table.aliases_of(sym) {
                    out.clear(a);
                }
            }
            *sets.get_mut(FlowKind::Out, jb) = out;
        }
    }

    insert_at_other_exit_points(func, table, cfg, sets);

    tracing::debug!(function = %func.name, "inserted releases");
}

/// Releases at exit points with no successor edge: early returns and the
/// root scope's normal exits. Everything still owned at a `Return` except
/// the return slot (whose ownership passes to the caller) is released
/// before the terminator.
fn insert_at_other_exit_points(
    func: &mut Function,
    table: &SymbolTable,
    cfg: &Cfg,
    sets: &mut FlowSets,
) {
    let ret = table.ret_index();
    for b in 0..func.blocks.len() {
        if b < cfg.num_blocks() && !cfg.is_reachable(b) {
            continue;
        }
        if !matches!(func.blocks[b].terminator, Terminator::Return) {
            continue;
        }
        let syms: Vec<usize> = sets
            .get(FlowKind::Out, b)
            .ones()
            .filter(|&s| Some(s) != ret)
            .collect();
        for sym in syms {
            if !sets.bit(FlowKind::Out, b, sym) {
                continue;
            }
            func.blocks[b].body.push(Instr::Release {
                var: table.var_at(sym),
            });
            sets.clear_bit(FlowKind::Out, b, sym);
            for &a in table.aliases_of(sym) {
                sets.clear_bit(FlowKind::Out, b, a);
            }
        }
    }
}

/// Iterator variant: each suspension is an additional release point.
///
/// A symbol owned at a `Yield` and never used afterwards must be released
/// before suspending — the consuming loop may never resume the iterator.
/// Runs before the normal release passes.
pub fn iterator_insert_auto_destroys(
    func: &mut Function,
    table: &SymbolTable,
    cfg: &Cfg,
    sets: &mut FlowSets,
) {
    let ret = table.ret_index();
    for b in 0..cfg.num_blocks() {
        if !cfg.is_reachable(b) {
            continue;
        }
        if !matches!(func.blocks[b].terminator, Terminator::Yield { .. }) {
            continue;
        }
        let dead: Vec<usize> = sets
            .get(FlowKind::Out, b)
            .ones()
            .filter(|&s| Some(s) != ret && !sets.bit(FlowKind::UsedLater, b, s))
            .collect();
        for sym in dead {
            if !sets.bit(FlowKind::Out, b, sym) {
                continue;
            }
            func.blocks[b].body.push(Instr::Release {
                var: table.var_at(sym),
            });
            clear_ownership_downstream(cfg, sets, b, sym);
            for &a in table.aliases_of(sym) {
                clear_ownership_downstream(cfg, sets, b, a);
            }
        }
    }
}

/// After releasing `sym` at the end of `from`, the converged bits
/// downstream still claim ownership — clear them so no later pass releases
/// the same unit again. Stops where a producer re-establishes ownership.
fn clear_ownership_downstream(cfg: &Cfg, sets: &mut FlowSets, from: usize, sym: usize) {
    sets.clear_bit(FlowKind::Out, from, sym);
    let mut visited = vec![false; cfg.num_blocks()];
    let mut stack: Vec<usize> = cfg.succs(from).to_vec();
    while let Some(b) = stack.pop() {
        if visited[b] {
            continue;
        }
        visited[b] = true;
        if !sets.bit(FlowKind::In, b, sym) && !sets.bit(FlowKind::Out, b, sym) {
            continue;
        }
        sets.clear_bit(FlowKind::In, b, sym);
        if sets.bit(FlowKind::Prod, b, sym) {
            continue;
        }
        sets.clear_bit(FlowKind::Out, b, sym);
        stack.extend_from_slice(cfg.succs(b));
    }
}
