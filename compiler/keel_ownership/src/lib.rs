//! Ownership-flow analysis for the keel compiler.
//!
//! Given a function's IR (from `keel_ir`), this crate determines, for
//! every program point, which values are *owned* (responsible for eventual
//! release) versus *borrowed*, and inserts the compensating operations —
//! `Retain` before consumptions without ownership, `Release` at
//! end-of-life — that make resource lifetimes correct without programmer
//! annotation.
//!
//! # Pipeline
//!
//! One [`OwnershipFlow`] session per function, stages in order:
//!
//! 1. **Symbol catalog** ([`SymbolTable`]) — intern tracked values into a
//!    dense index space; build the intra-block alias map.
//! 2. **Exit locator** ([`exits`]) — find (and normalize with synthetic
//!    join blocks) where each symbol's scope ends; freeze the CFG adapter
//!    ([`Cfg`]).
//! 3. **Transition computer** ([`transitions`]) — classify every symbol
//!    occurrence as produce/consume/use, in order.
//! 4. **Backward liveness** ([`liveness`]) — fixpoint over USED_LATER.
//! 5. **Forward ownership** ([`ownership`]) — fixpoint over IN/OUT,
//!    dependent on liveness ("is this consumption the last use").
//! 6. **Rewriter** ([`rewrite`]) — insert `Retain`/`Release` so every
//!    path balances ownership exactly.
//! 7. **Consistency checker** ([`check`]) — post-condition validation;
//!    violations are internal errors ([`FlowError`]), never user
//!    diagnostics.
//!
//! # Design
//!
//! All seven flow relations are bit vectors ([`BitSet`]) indexed by dense
//! symbol IDs ([`FlowSets`]) — symbols are interned once and the hot
//! fixpoint loops run plain set algebra, with no per-symbol allocation.
//! Both solvers are monotonic over this bounded lattice, so termination
//! is guaranteed in at most O(blocks × symbols) iterations.
//!
//! The pass is single-threaded per function; sessions own disjoint state,
//! so callers may analyze independent functions in parallel.

pub mod bitset;
pub mod cfg;
pub mod check;
pub mod dump;
pub mod error;
pub mod exits;
pub mod flow;
pub mod liveness;
pub mod ownership;
pub mod rewrite;
pub mod session;
pub mod symbols;
pub mod transitions;

#[cfg(test)]
mod test_helpers;
#[cfg(test)]
mod tests;

pub use bitset::BitSet;
pub use cfg::Cfg;
pub use check::check_forward_ownership;
pub use dump::{dump_flow_sets, dump_symbol_stats, dump_symbols};
pub use error::FlowError;
pub use exits::{compute_exit_blocks, compute_scope_map, ExitMap, ScopeMap};
pub use flow::{FlowKind, FlowKinds, FlowSets};
pub use liveness::backward_flow_use;
pub use ownership::forward_flow_ownership;
pub use rewrite::{insert_auto_copies, insert_auto_destroys, iterator_insert_auto_destroys};
pub use session::{analyze_function, DebugLevel, FlowConfig, OwnershipFlow};
pub use symbols::SymbolTable;
pub use transitions::{compute_transitions, OccSite, Occurrence, Transitions};
