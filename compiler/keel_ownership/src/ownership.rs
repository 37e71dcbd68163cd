//! Forward ownership solver: which symbols are owned entering each block
//! (IN) and must be owned leaving it (OUT).
//!
//! # Transfer function
//!
//! ```text
//! IN(b)  = ∩ over predecessors p of OUT(p)        (IN(entry) = ∅)
//! OUT(b) = gen(b) ∪ (IN(b) \ kill(b))
//! ```
//!
//! A symbol is owned entering a block only if it is owned leaving *all*
//! predecessors; mixed-ownership joins are reconciled later by the
//! rewriter, which releases at the owning predecessor.
//!
//! gen/kill come from the block's ordered occurrence record rather than
//! the set-level PROD/CONS bits, because the *order* of events decides the
//! block's net effect: a symbol whose final ownership event is a produce
//! is owned on exit no matter what came before, and one whose final event
//! is an ownership-transferring consumption (last appearance in the block,
//! nothing used later) is not.
//!
//! Non-entry blocks start from the full set, so the intersection-based
//! meet only ever shrinks IN — monotone over a bounded lattice, hence
//! guaranteed to terminate. Unreachable blocks keep empty sets.

use keel_ir::OccKind;

use crate::bitset::BitSet;
use crate::cfg::Cfg;
use crate::flow::{FlowKind, FlowSets};
use crate::transitions::{transfers_ownership, Transitions};

/// Run the IN/OUT fixpoint. Requires converged USED_LATER bits.
pub fn forward_flow_ownership(cfg: &Cfg, sets: &mut FlowSets, trans: &Transitions) {
    let nsyms = sets.nsyms();
    let entry = match cfg.reverse_postorder().first() {
        Some(&b) => b,
        None => return,
    };

    // Per-block net effect, derived once from the occurrence order.
    let mut gen_kill: Vec<(BitSet, BitSet)> = Vec::with_capacity(cfg.num_blocks());
    for b in 0..cfg.num_blocks() {
        gen_kill.push(block_gen_kill(trans, b, nsyms, sets.get(FlowKind::UsedLater, b)));
    }

    // Top-of-lattice initialization for everything reachable but the entry
    // (whose IN is empty by definition, making OUT(entry) just its gen).
    for &b in cfg.reverse_postorder() {
        let (gen, kill) = &gen_kill[b];
        if b == entry {
            *sets.get_mut(FlowKind::Out, b) = gen.clone();
        } else {
            sets.get_mut(FlowKind::In, b).set_all();
            let out = sets.get_mut(FlowKind::Out, b);
            out.set_all();
            out.subtract(kill);
            out.union_with(gen);
        }
    }

    let mut iterations = 0u32;
    loop {
        iterations += 1;
        let mut changed = false;

        for &b in cfg.reverse_postorder() {
            let mut new_in = BitSet::new(nsyms);
            if b != entry {
                new_in.set_all();
                for &p in cfg.preds(b) {
                    if cfg.is_reachable(p) {
                        new_in.intersect_with(sets.get(FlowKind::Out, p));
                    }
                }
            }

            let (gen, kill) = &gen_kill[b];
            let mut new_out = new_in.clone();
            new_out.subtract(kill);
            new_out.union_with(gen);

            if new_in != *sets.get(FlowKind::In, b) || new_out != *sets.get(FlowKind::Out, b) {
                *sets.get_mut(FlowKind::In, b) = new_in;
                *sets.get_mut(FlowKind::Out, b) = new_out;
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }

    tracing::debug!(iterations, "forward ownership converged");
}

/// Derive a block's gen/kill sets from its ordered occurrences.
///
/// Walk the occurrences tracking each symbol's final ownership event:
/// a produce puts it in gen; an ownership-transferring consumption puts it
/// in kill. Alias targets mirror whichever event their partner has.
fn block_gen_kill(
    trans: &Transitions,
    block: usize,
    nsyms: usize,
    used_later: &BitSet,
) -> (BitSet, BitSet) {
    let mut gen = BitSet::new(nsyms);
    let mut kill = BitSet::new(nsyms);

    let occs = &trans.per_block[block];
    if occs.is_empty() {
        return (gen, kill);
    }
    let last = trans.last_positions(block, nsyms);

    for (pos, occ) in occs.iter().enumerate() {
        match occ.kind {
            OccKind::Produce => {
                gen.set(occ.sym);
                kill.clear(occ.sym);
                for &a in &occ.aliases {
                    gen.set(a);
                    kill.clear(a);
                }
            }
            OccKind::Consume => {
                if trans.is_yield_transfer(occ) || transfers_ownership(occ, pos, &last, used_later) {
                    kill.set(occ.sym);
                    gen.clear(occ.sym);
                    for &a in &occ.aliases {
                        kill.set(a);
                        gen.clear(a);
                    }
                }
                // A consumption covered by an inserted duplication leaves
                // the owned state unchanged.
            }
            OccKind::Use => {}
        }
    }

    (gen, kill)
}
