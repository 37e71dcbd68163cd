//! Flow-set store: one bit vector per (basic block, flow kind).
//!
//! The seven flow kinds together describe everything the solvers and the
//! rewriter know about a function:
//!
//! - `PROD(b,s)` — symbol `s` gains ownership in block `b`. At most one
//!   block per path establishes ownership of an ordinary symbol; the
//!   return slot of an iterator is the sanctioned exception (re-produced
//!   before every yield).
//! - `CONS(b,s)` — `s` is consumed at least once in `b`. No upper bound:
//!   one instruction may consume several symbols, or one symbol several
//!   times.
//! - `USE(b,s)` — `b` contains a read of `s` (consumptions read too).
//! - `USED_LATER(b,s)` — `s` is read somewhere in the flow *following*
//!   `b`. Valid after the backward solver converges.
//! - `EXIT(b,s)` — `b` marks the end of `s`'s declaring scope.
//! - `IN(b,s)` / `OUT(b,s)` — `s` is owned on entry to / must be owned on
//!   exit from `b`. Valid only after both solvers converge; reading them
//!   earlier is a caller error.

use crate::bitset::BitSet;

bitflags::bitflags! {
    /// Selection mask for flow-set dumps.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FlowKinds: u8 {
        const PROD       = 1 << 0;
        const CONS       = 1 << 1;
        const USE        = 1 << 2;
        const USED_LATER = 1 << 3;
        const EXIT       = 1 << 4;
        const IN         = 1 << 5;
        const OUT        = 1 << 6;
        const ALL        = 0x7f;
    }
}

/// One of the seven per-block flow relations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
    Prod,
    Cons,
    Use,
    UsedLater,
    Exit,
    In,
    Out,
}

impl FlowKind {
    /// All kinds in store order.
    pub const ALL: [FlowKind; 7] = [
        FlowKind::Prod,
        FlowKind::Cons,
        FlowKind::Use,
        FlowKind::UsedLater,
        FlowKind::Exit,
        FlowKind::In,
        FlowKind::Out,
    ];

    /// Display name used by dumps.
    pub fn name(self) -> &'static str {
        match self {
            FlowKind::Prod => "PROD",
            FlowKind::Cons => "CONS",
            FlowKind::Use => "USE",
            FlowKind::UsedLater => "USED_LATER",
            FlowKind::Exit => "EXIT",
            FlowKind::In => "IN",
            FlowKind::Out => "OUT",
        }
    }

    /// The dump-mask bit for this kind.
    pub fn mask(self) -> FlowKinds {
        match self {
            FlowKind::Prod => FlowKinds::PROD,
            FlowKind::Cons => FlowKinds::CONS,
            FlowKind::Use => FlowKinds::USE,
            FlowKind::UsedLater => FlowKinds::USED_LATER,
            FlowKind::Exit => FlowKinds::EXIT,
            FlowKind::In => FlowKinds::IN,
            FlowKind::Out => FlowKinds::OUT,
        }
    }

    #[inline]
    fn index(self) -> usize {
        match self {
            FlowKind::Prod => 0,
            FlowKind::Cons => 1,
            FlowKind::Use => 2,
            FlowKind::UsedLater => 3,
            FlowKind::Exit => 4,
            FlowKind::In => 5,
            FlowKind::Out => 6,
        }
    }
}

/// Owns every flow bit vector of one analysis session.
///
/// Built once the CFG has its final pre-analysis shape (after synthetic
/// exit joins are inserted); [`push_block`](Self::push_block) grows the
/// store for the rare blocks the rewriter adds while splitting edges.
#[derive(Clone, PartialEq, Eq)]
pub struct FlowSets {
    nsyms: usize,
    sets: [Vec<BitSet>; 7],
}

impl FlowSets {
    /// Create empty sets for `num_blocks` blocks over `nsyms` symbols.
    pub fn new(num_blocks: usize, nsyms: usize) -> Self {
        Self {
            nsyms,
            sets: std::array::from_fn(|_| {
                (0..num_blocks).map(|_| BitSet::new(nsyms)).collect()
            }),
        }
    }

    /// Number of blocks covered by the store.
    pub fn num_blocks(&self) -> usize {
        self.sets[0].len()
    }

    /// Number of tracked symbols (bit-vector capacity).
    pub fn nsyms(&self) -> usize {
        self.nsyms
    }

    /// Borrow the vector for `(kind, block)`.
    #[inline]
    pub fn get(&self, kind: FlowKind, block: usize) -> &BitSet {
        &self.sets[kind.index()][block]
    }

    /// Mutably borrow the vector for `(kind, block)`.
    #[inline]
    pub fn get_mut(&mut self, kind: FlowKind, block: usize) -> &mut BitSet {
        &mut self.sets[kind.index()][block]
    }

    /// Read one bit.
    #[inline]
    pub fn bit(&self, kind: FlowKind, block: usize, sym: usize) -> bool {
        self.get(kind, block).get(sym)
    }

    /// Set one bit.
    #[inline]
    pub fn set_bit(&mut self, kind: FlowKind, block: usize, sym: usize) {
        self.get_mut(kind, block).set(sym);
    }

    /// Clear one bit.
    #[inline]
    pub fn clear_bit(&mut self, kind: FlowKind, block: usize, sym: usize) {
        self.get_mut(kind, block).clear(sym);
    }

    /// Append empty vectors for a block added after the store was created.
    /// Returns the new block's index.
    pub fn push_block(&mut self) -> usize {
        let idx = self.num_blocks();
        for kind in &mut self.sets {
            kind.push(BitSet::new(self.nsyms));
        }
        idx
    }
}
