//! Post-rewrite consistency checker.
//!
//! Re-walks the rewritten IR against the converged flow sets and raises an
//! internal error if any ownership invariant is broken: a consumption with
//! neither ownership nor a covering duplication, a second producer while
//! still owned, a duplicate release, ownership leaking past a function
//! exit, or a missing owned return value. These conditions indicate a bug
//! in the analysis or malformed input IR, never a user mistake — the
//! compilation halts rather than emit resource-management code that leaks
//! or double-frees.
//!
//! The walk simulates each reachable block from its IN set: `Retain` banks
//! a pending duplication, a consumption spends the pending duplication
//! first and the owned bit second, `Release` spends the owned bit.

use keel_ir::{Function, Instr, OccKind, ParamMode, Terminator, VarId};

use crate::bitset::BitSet;
use crate::cfg::Cfg;
use crate::error::FlowError;
use crate::flow::{FlowKind, FlowSets};
use crate::symbols::SymbolTable;

/// Validate the rewritten function. Cheap relative to the solvers; runs
/// unconditionally as a guard against silent miscompilation.
pub fn check_forward_ownership(
    func: &Function,
    table: &SymbolTable,
    cfg: &Cfg,
    sets: &FlowSets,
) -> Result<(), FlowError> {
    let nsyms = table.len();
    let ret = table.ret_index();

    for b in 0..func.blocks.len() {
        // Blocks past the adapter's view were added by the rewriter and
        // are reachable by construction.
        if b < cfg.num_blocks() && !cfg.is_reachable(b) {
            continue;
        }

        let mut owned = sets.get(FlowKind::In, b).clone();
        let mut copies = vec![0u32; nsyms];

        // Owned formals are produced implicitly on function entry.
        if b == func.entry.index() {
            for param in &func.params {
                if param.mode == ParamMode::Owned {
                    if let Some(sym) = table.index_of(param.var) {
                        owned.set(sym);
                    }
                }
            }
        }

        for instr in &func.blocks[b].body {
            match instr {
                Instr::Retain { var } => {
                    if let Some(sym) = table.index_of(*var) {
                        copies[sym] += 1;
                    }
                }
                Instr::Release { var } => {
                    if let Some(sym) = table.index_of(*var) {
                        if !owned.get(sym) {
                            return Err(error(func, *var, b, ErrorKind::DoubleRelease));
                        }
                        owned.clear(sym);
                        for &a in table.aliases_of(sym) {
                            owned.clear(a);
                        }
                    }
                }
                _ => {
                    for occ in instr.occurrences() {
                        let Some(sym) = table.index_of(occ.var) else {
                            continue;
                        };
                        match occ.kind {
                            OccKind::Produce => {
                                if owned.get(sym) {
                                    return Err(error(
                                        func,
                                        occ.var,
                                        b,
                                        ErrorKind::DoubleProduce,
                                    ));
                                }
                                owned.set(sym);
                                for &a in table.aliases_of(sym) {
                                    owned.set(a);
                                }
                            }
                            OccKind::Consume => {
                                spend(func, table, &mut owned, &mut copies, sym, occ.var, b)?;
                            }
                            OccKind::Use => {}
                        }
                    }
                }
            }
        }

        match &func.blocks[b].terminator {
            Terminator::Return => {
                if let Some(ri) = ret {
                    // A value-returning function hands exactly one owned
                    // unit to its caller. Iterators have already yielded
                    // theirs by the time they return.
                    if func.returns_owned && !func.is_iterator && !owned.get(ri) {
                        return Err(error(
                            func,
                            table.var_at(ri),
                            b,
                            ErrorKind::ReturnNotOwned,
                        ));
                    }
                }
                for sym in owned.ones() {
                    if Some(sym) == ret && func.returns_owned {
                        continue;
                    }
                    return Err(error(func, table.var_at(sym), b, ErrorKind::Leaked));
                }
            }
            Terminator::Yield { .. } => {
                if let Some(ri) = ret {
                    spend(func, table, &mut owned, &mut copies, ri, table.var_at(ri), b)?;
                }
            }
            Terminator::Jump { .. } | Terminator::Branch { .. } => {}
        }
    }

    tracing::debug!(function = %func.name, "ownership consistency verified");
    Ok(())
}

/// Spend one unit for a consumption: a banked duplication first, then the
/// owned bit, else the symbol was never owned here.
fn spend(
    func: &Function,
    table: &SymbolTable,
    owned: &mut BitSet,
    copies: &mut [u32],
    sym: usize,
    var: VarId,
    block: usize,
) -> Result<(), FlowError> {
    if copies[sym] > 0 {
        copies[sym] -= 1;
        return Ok(());
    }
    if owned.get(sym) {
        owned.clear(sym);
        for &a in table.aliases_of(sym) {
            owned.clear(a);
        }
        return Ok(());
    }
    Err(error(func, var, block, ErrorKind::ConsumedUnowned))
}

enum ErrorKind {
    ConsumedUnowned,
    Leaked,
    DoubleRelease,
    DoubleProduce,
    ReturnNotOwned,
}

fn error(func: &Function, var: VarId, block: usize, kind: ErrorKind) -> FlowError {
    let f = func.name.clone();
    let sym = func.var_name(var).to_string();
    let block = u32::try_from(block).unwrap_or(u32::MAX);
    match kind {
        ErrorKind::ConsumedUnowned => FlowError::ConsumedUnowned {
            func: f,
            sym,
            block,
        },
        ErrorKind::Leaked => FlowError::LeakedAtExit {
            func: f,
            sym,
            block,
        },
        ErrorKind::DoubleRelease => FlowError::DoubleRelease {
            func: f,
            sym,
            block,
        },
        ErrorKind::DoubleProduce => FlowError::DoubleProduce {
            func: f,
            sym,
            block,
        },
        ErrorKind::ReturnNotOwned => FlowError::ReturnNotOwned {
            func: f,
            sym,
            block,
        },
    }
}
