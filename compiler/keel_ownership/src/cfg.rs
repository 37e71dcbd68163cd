//! CFG adapter: cached block count, predecessor/successor lists, and
//! traversal orders for one function.
//!
//! The adapter is built once per session, *after* the exit locator has
//! finished inserting synthetic join blocks, and is read-only from then
//! on. If the rewriter later splits an edge, the new forwarding block is
//! registered with the flow-set store directly; the adapter deliberately
//! stays frozen because every consumer of predecessor/successor data has
//! already collected its work list by that point.

use smallvec::SmallVec;

use keel_ir::Function;

/// Cached graph structure of one function's basic blocks.
pub struct Cfg {
    num_blocks: usize,
    preds: Vec<Vec<usize>>,
    succs: Vec<SmallVec<[usize; 4]>>,
    postorder: Vec<usize>,
    reverse_postorder: Vec<usize>,
    reachable: Vec<bool>,
}

impl Cfg {
    /// Build the adapter from the function's current block graph.
    pub fn build(func: &Function) -> Self {
        let num_blocks = func.blocks.len();

        // Successor lists, deduplicated so a two-armed branch to a single
        // target contributes one edge.
        let mut succs: Vec<SmallVec<[usize; 4]>> = Vec::with_capacity(num_blocks);
        for block in &func.blocks {
            let mut list: SmallVec<[usize; 4]> = SmallVec::new();
            for succ in block.terminator.successors() {
                let idx = succ.index();
                if !list.contains(&idx) {
                    list.push(idx);
                }
            }
            succs.push(list);
        }

        let mut preds: Vec<Vec<usize>> = vec![Vec::new(); num_blocks];
        for (block_idx, list) in succs.iter().enumerate() {
            for &succ_idx in list {
                preds[succ_idx].push(block_idx);
            }
        }

        let postorder = compute_postorder(func.entry.index(), &succs);
        let mut reverse_postorder = postorder.clone();
        reverse_postorder.reverse();

        let mut reachable = vec![false; num_blocks];
        for &b in &postorder {
            reachable[b] = true;
        }

        Self {
            num_blocks,
            preds,
            succs,
            postorder,
            reverse_postorder,
            reachable,
        }
    }

    /// Cached block count at build time.
    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    /// Distinct predecessors of `block`.
    #[inline]
    pub fn preds(&self, block: usize) -> &[usize] {
        &self.preds[block]
    }

    /// Distinct successors of `block`.
    #[inline]
    pub fn succs(&self, block: usize) -> &[usize] {
        &self.succs[block]
    }

    /// Postorder over reachable blocks (successors before predecessors) —
    /// the preferred sweep order for backward flow.
    #[inline]
    pub fn postorder(&self) -> &[usize] {
        &self.postorder
    }

    /// Reverse postorder over reachable blocks — the preferred sweep order
    /// for forward flow.
    #[inline]
    pub fn reverse_postorder(&self) -> &[usize] {
        &self.reverse_postorder
    }

    /// Is `block` reachable from the entry?
    #[inline]
    pub fn is_reachable(&self, block: usize) -> bool {
        self.reachable[block]
    }
}

/// Iterative DFS postorder from `entry`. An explicit stack avoids
/// recursion depth issues on deeply nested CFGs; only reachable blocks
/// are visited.
fn compute_postorder(entry: usize, succs: &[SmallVec<[usize; 4]>]) -> Vec<usize> {
    let num_blocks = succs.len();
    let mut visited = vec![false; num_blocks];
    let mut postorder = Vec::with_capacity(num_blocks);

    // Stack entries: (block_index, children_processed). When
    // children_processed is false we push successors; when true we emit.
    let mut stack: Vec<(usize, bool)> = vec![(entry, false)];

    while let Some(&mut (block_idx, ref mut children_done)) = stack.last_mut() {
        if *children_done {
            postorder.push(block_idx);
            stack.pop();
            continue;
        }
        *children_done = true;

        if visited[block_idx] {
            stack.pop();
            continue;
        }
        visited[block_idx] = true;

        for &succ_idx in &succs[block_idx] {
            if !visited[succ_idx] {
                stack.push((succ_idx, false));
            }
        }
    }

    postorder
}
