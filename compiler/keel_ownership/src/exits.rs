//! Exit locator: where does each symbol's declaring scope end?
//!
//! For every scope that declares tracked symbols, this pass finds the
//! blocks at which control leaves the scope along every CFG path:
//!
//! - **Edge exits** — edges from a block inside the scope to a block
//!   outside it. Where several such edges converge on one target (or the
//!   target is shared with unrelated flow), an empty synthetic join block
//!   is inserted on the edges so the EXIT bits have a single well-defined
//!   location per path. The join is real CFG structure — later passes see
//!   a normal block, not a side table.
//! - **Return exits** — `Return`-terminated blocks inside the scope, which
//!   leave every enclosing scope at once.
//!
//! This guarantees the rewriter always has exactly one release-insertion
//! point per path per symbol instead of duplicating insertion logic across
//! successor edges.
//!
//! Scopes are processed outermost-first, so a path that leaves several
//! scopes at once passes their join blocks innermost-first — releases end
//! up in declaration-nesting order.

use smallvec::SmallVec;

use keel_ir::{BlockId, Function, ScopeId, Terminator};

use crate::symbols::SymbolTable;

/// Block membership per scope: which blocks execute within each scope
/// (including nested scopes' blocks).
pub struct ScopeMap {
    members: Vec<Vec<usize>>,
}

impl ScopeMap {
    /// Blocks within `scope`, in block order.
    pub fn members(&self, scope: ScopeId) -> &[usize] {
        &self.members[scope.index()]
    }
}

/// Compute block membership for every scope.
pub fn compute_scope_map(func: &Function) -> ScopeMap {
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); func.scopes.len()];
    for (scope_idx, list) in members.iter_mut().enumerate() {
        let scope = ScopeId::new(
            u32::try_from(scope_idx).unwrap_or_else(|_| panic!("scope count exceeds u32::MAX")),
        );
        for (block_idx, block) in func.blocks.iter().enumerate() {
            if func.scope_contains(scope, block.scope) {
                list.push(block_idx);
            }
        }
    }
    ScopeMap { members }
}

/// Per-symbol exit blocks, in dense-index order.
pub struct ExitMap {
    per_sym: Vec<SmallVec<[BlockId; 2]>>,
}

impl ExitMap {
    /// The blocks marking the end of scope for the symbol at dense index
    /// `sym`.
    pub fn blocks_for(&self, sym: usize) -> &[BlockId] {
        &self.per_sym[sym]
    }
}

/// Locate (and where necessary create) the exit blocks of every tracked
/// symbol's declaring scope.
///
/// Mutates the CFG: synthetic join blocks are appended and exiting edges
/// redirected through them. Must therefore run before the CFG adapter and
/// the flow-set store are built.
pub fn compute_exit_blocks(
    func: &mut Function,
    table: &SymbolTable,
    scope_map: &ScopeMap,
) -> ExitMap {
    let nscopes = func.scopes.len();

    let mut syms_by_scope: Vec<Vec<usize>> = vec![Vec::new(); nscopes];
    for idx in 0..table.len() {
        syms_by_scope[func.var_scope(table.var_at(idx)).index()].push(idx);
    }

    let mut per_sym: Vec<SmallVec<[BlockId; 2]>> = vec![SmallVec::new(); table.len()];

    // Outermost scopes first: parents are always allocated before their
    // children, so ascending index order is outermost-first.
    for scope_idx in 0..nscopes {
        let syms = &syms_by_scope[scope_idx];
        if syms.is_empty() {
            continue;
        }
        let scope = ScopeId::new(
            u32::try_from(scope_idx).unwrap_or_else(|_| panic!("scope count exceeds u32::MAX")),
        );

        let mut exit_blocks: SmallVec<[BlockId; 4]> = SmallVec::new();

        // Collect the scope's current exit edges and return exits. Edge
        // targets are read from the live terminators — earlier scopes may
        // already have rerouted them through their own joins.
        let mut edges: Vec<(BlockId, BlockId)> = Vec::new();
        for &p in scope_map.members(scope) {
            let block = &func.blocks[p];
            if matches!(block.terminator, Terminator::Return) {
                exit_blocks.push(block.id);
            }
            for q in block.terminator.successors() {
                if !func.scope_contains(scope, func.blocks[q.index()].scope) {
                    edges.push((block.id, q));
                }
            }
        }

        // Group edges by target, preserving first-seen order.
        let mut targets: Vec<BlockId> = Vec::new();
        for &(_, q) in &edges {
            if !targets.contains(&q) {
                targets.push(q);
            }
        }

        for q in targets {
            let sources: Vec<BlockId> = edges
                .iter()
                .filter(|&&(_, t)| t == q)
                .map(|&(p, _)| p)
                .collect();

            let preds_of_q = func
                .blocks
                .iter()
                .filter(|b| b.terminator.successors().contains(&q))
                .count();

            let exit = if sources.len() == 1 && preds_of_q == 1 {
                // The target is a dedicated continuation of this scope; it
                // already is a single well-defined exit location.
                q
            } else {
                // Normalize: one empty join per (scope, target), placed in
                // the enclosing scope.
                let parent = func.scopes[scope.index()]
                    .parent
                    .unwrap_or_else(|| panic!("non-root scope without parent"));
                let join = func.split_edge(sources[0], q, parent);
                for &p in &sources[1..] {
                    func.blocks[p.index()].terminator.redirect(q, join);
                }
                join
            };
            for &s in syms {
                per_sym[s].push(exit);
            }
        }

        for &s in syms {
            per_sym[s].extend(exit_blocks.iter().copied());
        }
    }

    tracing::debug!(
        function = %func.name,
        blocks = func.blocks.len(),
        "located scope exits"
    );

    ExitMap { per_sym }
}
