//! Transition computer: one ordered walk over each block's instructions,
//! classifying every tracked-symbol occurrence as produce, consume, or use
//! and recording the PROD/CONS/USE flow bits.
//!
//! Besides the per-block bits, the walk captures the *occurrence order* —
//! a consumption's position within its block decides whether it can
//! transfer ownership or needs a compiler-inserted duplication, so a
//! boolean per block is not enough. The rewriter and the forward solver
//! both replay the recorded order instead of re-deriving it.
//!
//! An address-taken symbol is treated as read for the remainder of its
//! block, and its direct aliases mirror every ownership transition —
//! single-block, one-level alias tracking as documented in the catalog.

use smallvec::SmallVec;

use keel_ir::{Function, Instr, OccKind, ParamMode};

use crate::bitset::BitSet;
use crate::flow::{FlowKind, FlowSets};
use crate::symbols::SymbolTable;

/// Where within a block an occurrence sits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OccSite {
    /// Before the first instruction — used for the implicit production of
    /// owned formals in the entry block.
    Entry,
    /// At the instruction with this body index.
    Instr(usize),
    /// In the block's terminator.
    Terminator,
}

/// One classified occurrence of a tracked symbol, in block order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Occurrence {
    pub site: OccSite,
    /// Dense symbol index.
    pub sym: usize,
    pub kind: OccKind,
    /// Direct aliases of `sym`; they mirror ownership transitions.
    pub aliases: SmallVec<[usize; 2]>,
}

/// Ordered occurrence records for every block.
pub struct Transitions {
    pub per_block: Vec<Vec<Occurrence>>,
    /// Dense index of the return slot, if tracked. A terminator-site
    /// consumption of the slot is a yield, which transfers the *current*
    /// unit unconditionally — later reads refer to the next production,
    /// so the block-granular "used later" test does not apply to it.
    pub(crate) ret: Option<usize>,
}

impl Transitions {
    /// For one block, the position (occurrence index) of the last read or
    /// consumption of each symbol, counting alias-mediated appearances.
    /// `usize::MAX` marks "never read".
    ///
    /// A consumption transfers ownership only if nothing — not even an
    /// alias — touches the symbol later in the block.
    pub(crate) fn last_positions(&self, block: usize, nsyms: usize) -> Vec<usize> {
        let mut last = vec![usize::MAX; nsyms];
        for (pos, occ) in self.per_block[block].iter().enumerate() {
            if matches!(occ.kind, OccKind::Use | OccKind::Consume) {
                last[occ.sym] = pos;
                for &a in &occ.aliases {
                    last[a] = pos;
                }
            }
        }
        last
    }

    /// Is `occ` a yield's consumption of the return slot? Those transfer
    /// the current unit unconditionally — the slot is re-produced before
    /// any later read.
    pub(crate) fn is_yield_transfer(&self, occ: &Occurrence) -> bool {
        occ.site == OccSite::Terminator
            && occ.kind == OccKind::Consume
            && Some(occ.sym) == self.ret
    }
}

/// Does the consumption `occ` at position `pos` transfer ownership out of
/// its symbol (as opposed to requiring an inserted duplication)?
///
/// True only when this is the symbol's last appearance in the block, no
/// alias appears later, and neither the symbol nor any alias is used in
/// the flow following the block.
pub(crate) fn transfers_ownership(
    occ: &Occurrence,
    pos: usize,
    last: &[usize],
    used_later: &BitSet,
) -> bool {
    debug_assert_eq!(occ.kind, OccKind::Consume);
    if last[occ.sym] != pos || used_later.get(occ.sym) {
        return false;
    }
    occ.aliases
        .iter()
        .all(|&a| last[a] <= pos && !used_later.get(a))
}

/// Walk every block once, filling PROD/CONS/USE bits and building the
/// ordered occurrence record.
///
/// Owned formals are recorded as entry-block producers first (they hold
/// ownership from the moment the function is entered); borrowed formals
/// never produce, so their consumptions always require duplication.
pub fn compute_transitions(
    func: &Function,
    table: &SymbolTable,
    sets: &mut FlowSets,
) -> Transitions {
    debug_assert_eq!(sets.num_blocks(), func.blocks.len());

    let mut per_block: Vec<Vec<Occurrence>> = vec![Vec::new(); func.blocks.len()];

    add_internal_defs(func, table, sets, &mut per_block);

    for (b, block) in func.blocks.iter().enumerate() {
        for (i, instr) in block.body.iter().enumerate() {
            debug_assert!(
                !matches!(instr, Instr::Retain { .. } | Instr::Release { .. }),
                "transition computation on already-rewritten IR"
            );
            for occ in instr.occurrences() {
                if let Some(sym) = table.index_of(occ.var) {
                    record(sets, &mut per_block[b], b, OccSite::Instr(i), sym, occ.kind, table);
                }
            }
        }
        for occ in block.terminator.occurrences(func.ret) {
            if let Some(sym) = table.index_of(occ.var) {
                record(sets, &mut per_block[b], b, OccSite::Terminator, sym, occ.kind, table);
            }
        }
    }

    tracing::debug!(function = %func.name, "computed ownership transitions");

    Transitions {
        per_block,
        ret: table.ret_index(),
    }
}

/// The implicit productions the source never spells out: every owned
/// formal gains ownership on function entry.
fn add_internal_defs(
    func: &Function,
    table: &SymbolTable,
    sets: &mut FlowSets,
    per_block: &mut [Vec<Occurrence>],
) {
    let entry = func.entry.index();
    for param in &func.params {
        if param.mode != ParamMode::Owned {
            continue;
        }
        if let Some(sym) = table.index_of(param.var) {
            record(
                sets,
                &mut per_block[entry],
                entry,
                OccSite::Entry,
                sym,
                OccKind::Produce,
                table,
            );
        }
    }
}

fn record(
    sets: &mut FlowSets,
    occs: &mut Vec<Occurrence>,
    block: usize,
    site: OccSite,
    sym: usize,
    kind: OccKind,
    table: &SymbolTable,
) {
    let aliases: SmallVec<[usize; 2]> = table.aliases_of(sym).iter().copied().collect();

    let mut mark = |s: usize| match kind {
        OccKind::Produce => sets.set_bit(FlowKind::Prod, block, s),
        OccKind::Consume => {
            // A consumption is also a read of the symbol.
            sets.set_bit(FlowKind::Cons, block, s);
            sets.set_bit(FlowKind::Use, block, s);
        }
        OccKind::Use => sets.set_bit(FlowKind::Use, block, s),
    };
    mark(sym);
    for &a in &aliases {
        mark(a);
    }

    occs.push(Occurrence {
        site,
        sym,
        kind,
        aliases,
    });
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use keel_ir::{FunctionBuilder, OccKind, Operand, ParamMode, ValueClass};

    use crate::flow::{FlowKind, FlowSets};
    use crate::symbols::SymbolTable;

    use super::{compute_transitions, OccSite};

    #[test]
    fn produce_consume_use_bits() {
        let mut b = FunctionBuilder::new("f");
        let x = b.local("x", ValueClass::Managed);
        let y = b.local("y", ValueClass::Managed);
        b.bind(x, vec![]);
        b.bind(y, vec![Operand::read(x)]);
        b.effect(vec![Operand::consume(y)]);
        b.ret();
        let func = b.finish();

        let table = SymbolTable::extract(&func);
        let mut sets = FlowSets::new(1, table.len());
        let trans = compute_transitions(&func, &table, &mut sets);

        let (xi, yi) = (0, 1);
        assert!(sets.bit(FlowKind::Prod, 0, xi));
        assert!(sets.bit(FlowKind::Prod, 0, yi));
        assert!(sets.bit(FlowKind::Use, 0, xi));
        assert!(!sets.bit(FlowKind::Cons, 0, xi));
        assert!(sets.bit(FlowKind::Cons, 0, yi));
        // A consumption counts as a read as well.
        assert!(sets.bit(FlowKind::Use, 0, yi));

        // Occurrence order: produce x, use x, produce y, consume y.
        let kinds: Vec<OccKind> = trans.per_block[0].iter().map(|o| o.kind).collect();
        assert_eq!(
            kinds,
            vec![
                OccKind::Produce,
                OccKind::Use,
                OccKind::Produce,
                OccKind::Consume
            ]
        );
    }

    #[test]
    fn owned_formals_produce_at_entry_borrowed_do_not() {
        let mut b = FunctionBuilder::new("f");
        let p = b.param("p", ValueClass::Managed, ParamMode::Owned);
        let q = b.param("q", ValueClass::Managed, ParamMode::Borrowed);
        b.effect(vec![Operand::read(p), Operand::read(q)]);
        b.ret();
        let func = b.finish();

        let table = SymbolTable::extract(&func);
        let mut sets = FlowSets::new(1, table.len());
        let trans = compute_transitions(&func, &table, &mut sets);

        let (pi, qi) = (0, 1);
        assert!(sets.bit(FlowKind::Prod, 0, pi));
        assert!(!sets.bit(FlowKind::Prod, 0, qi));
        assert_eq!(trans.per_block[0][0].site, OccSite::Entry);
        assert_eq!(trans.per_block[0][0].kind, OccKind::Produce);
    }

    #[test]
    fn terminator_occurrences_recorded() {
        let mut b = FunctionBuilder::new("gen");
        b.mark_iterator();
        let r = b.return_slot(ValueClass::Managed, true);
        let resume = b.new_block();
        b.bind(r, vec![]);
        b.yield_to(resume);
        b.position_at(resume);
        b.ret();
        let func = b.finish();

        let table = SymbolTable::extract(&func);
        let mut sets = FlowSets::new(2, table.len());
        let trans = compute_transitions(&func, &table, &mut sets);

        let ri = 0;
        // Yield consumes the return slot; Return merely reads it.
        assert!(sets.bit(FlowKind::Cons, 0, ri));
        assert!(sets.bit(FlowKind::Use, 1, ri));
        assert!(!sets.bit(FlowKind::Cons, 1, ri));
        assert_eq!(trans.per_block[0].last().map(|o| o.site), Some(OccSite::Terminator));
    }

    #[test]
    fn alias_transitions_mirror_onto_the_aliased_symbol() {
        let mut b = FunctionBuilder::new("f");
        let x = b.local("x", ValueClass::Managed);
        let r = b.local("r", ValueClass::Managed);
        b.bind(x, vec![]);
        b.addr_of(r, x);
        b.effect(vec![Operand::consume(r)]);
        b.ret();
        let func = b.finish();

        let mut table = SymbolTable::extract(&func);
        table.populate_aliases(&func);
        let mut sets = FlowSets::new(1, table.len());
        let _ = compute_transitions(&func, &table, &mut sets);

        let (xi, ri) = (0, 1);
        // Consuming the reference consumes the storage both names share.
        assert!(sets.bit(FlowKind::Cons, 0, ri));
        assert!(sets.bit(FlowKind::Cons, 0, xi));
        // The address-of itself reads x.
        assert!(sets.bit(FlowKind::Use, 0, xi));
    }
}
