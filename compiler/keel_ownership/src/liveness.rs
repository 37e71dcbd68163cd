//! Backward "used later" solver.
//!
//! Standard backward dataflow with fixed-point iteration over the
//! USED_LATER relation:
//!
//! ```text
//! USED_LATER(b) = ∪ over successors s of (USE(s) ∪ USED_LATER(s))
//! ```
//!
//! A symbol is used later at `b` exactly when some block *following* `b`
//! reads it; `b`'s own reads do not count (the forward solver and the
//! rewriter need "is this consumption the last use" at block granularity,
//! which the successor-only formulation preserves).
//!
//! Blocks are swept in postorder — successors before predecessors — which
//! converges fastest but is not required for correctness: the transfer
//! function is monotonic over a bounded lattice (bit vectors under union),
//! so any order terminates in at most O(blocks × symbols) iterations.

use crate::bitset::BitSet;
use crate::cfg::Cfg;
use crate::flow::{FlowKind, FlowSets};

/// Run the USED_LATER fixpoint. Initial state: all bits false.
///
/// Must converge before the forward ownership solver runs; ownership
/// transitions depend on "is this the last use".
pub fn backward_flow_use(cfg: &Cfg, sets: &mut FlowSets) {
    let nsyms = sets.nsyms();

    let mut iterations = 0u32;
    loop {
        iterations += 1;
        let mut changed = false;

        for &b in cfg.postorder() {
            let mut new = BitSet::new(nsyms);
            for &s in cfg.succs(b) {
                new.union_with(sets.get(FlowKind::Use, s));
                new.union_with(sets.get(FlowKind::UsedLater, s));
            }
            if new != *sets.get(FlowKind::UsedLater, b) {
                *sets.get_mut(FlowKind::UsedLater, b) = new;
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }

    tracing::debug!(iterations, "backward liveness converged");
}
