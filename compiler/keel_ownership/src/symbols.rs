//! Symbol catalog: the dense index space every flow bit addresses, plus
//! the intra-block alias map.
//!
//! Symbols are interned once into a fixed table in first-discovery order —
//! deterministic given the deterministic block/instruction traversal, which
//! keeps output reproducible across recompiles. All seven flow relations
//! then become plain bit-set operations over dense indices; the solvers
//! never touch a map keyed by variable identity.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use keel_ir::{Function, Instr, VarId};

/// The tracked symbols of one function, with dense indices and aliases.
pub struct SymbolTable {
    symbols: Vec<VarId>,
    index: FxHashMap<VarId, usize>,
    ret: Option<usize>,
    aliases: Vec<SmallVec<[usize; 2]>>,
}

impl SymbolTable {
    /// Scan every instruction of the function once and intern the distinct
    /// tracked symbols in first-discovery order.
    ///
    /// Parameters and the return slot are always included — even if
    /// apparently unused, they participate in ownership at the function
    /// boundary. Variables whose class is `Trivial` are skipped entirely.
    pub fn extract(func: &Function) -> Self {
        debug_assert!(
            !func.blocks.is_empty(),
            "symbol extraction before CFG construction"
        );

        let mut table = Self {
            symbols: Vec::new(),
            index: FxHashMap::default(),
            ret: None,
            aliases: Vec::new(),
        };

        for param in &func.params {
            table.intern(func, param.var);
        }
        if let Some(ret) = func.ret {
            table.ret = table.intern(func, ret);
        }

        for block in &func.blocks {
            for instr in &block.body {
                for occ in instr.occurrences() {
                    table.intern(func, occ.var);
                }
                // The alias destination of an address-of does not occur as
                // an ownership occurrence, but it is a tracked symbol.
                if let Instr::AddrOf { dst, .. } = instr {
                    table.intern(func, *dst);
                }
            }
            for occ in block.terminator.occurrences(func.ret) {
                table.intern(func, occ.var);
            }
        }

        table.aliases = vec![SmallVec::new(); table.symbols.len()];

        tracing::debug!(
            function = %func.name,
            nsyms = table.symbols.len(),
            "extracted symbols"
        );

        table
    }

    fn intern(&mut self, func: &Function, var: VarId) -> Option<usize> {
        if !func.var_class(var).is_tracked() {
            return None;
        }
        if let Some(&idx) = self.index.get(&var) {
            return Some(idx);
        }
        let idx = self.symbols.len();
        self.symbols.push(var);
        self.index.insert(var, idx);
        Some(idx)
    }

    /// Walk each block's statements and record alias pairs introduced by
    /// address-of shapes.
    ///
    /// Purely additive; the CFG is untouched. Aliasing is confined to a
    /// single block and the relation is *not* transitively closed — a
    /// documented approximation that trades soundness in rare cross-block
    /// or chained-reference cases for not needing full reference tracking.
    pub fn populate_aliases(&mut self, func: &Function) {
        for block in &func.blocks {
            for instr in &block.body {
                if let Instr::AddrOf { dst, src } = instr {
                    if let (Some(&d), Some(&s)) = (self.index.get(dst), self.index.get(src)) {
                        self.link(d, s);
                    }
                }
            }
        }
    }

    fn link(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        if !self.aliases[a].contains(&b) {
            self.aliases[a].push(b);
        }
        if !self.aliases[b].contains(&a) {
            self.aliases[b].push(a);
        }
    }

    /// Number of tracked symbols.
    #[inline]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Returns `true` if the function has no tracked symbols at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Dense index of `var`, if it is tracked.
    #[inline]
    pub fn index_of(&self, var: VarId) -> Option<usize> {
        self.index.get(&var).copied()
    }

    /// The variable at dense index `idx`.
    #[inline]
    pub fn var_at(&self, idx: usize) -> VarId {
        self.symbols[idx]
    }

    /// Dense index of the return slot, if the function has a tracked one.
    #[inline]
    pub fn ret_index(&self) -> Option<usize> {
        self.ret
    }

    /// Direct aliases of the symbol at `idx` (one level, not closed).
    #[inline]
    pub fn aliases_of(&self, idx: usize) -> &[usize] {
        &self.aliases[idx]
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use keel_ir::{FunctionBuilder, Operand, ParamMode, ValueClass};

    use super::SymbolTable;

    #[test]
    fn params_and_return_slot_always_included() {
        let mut b = FunctionBuilder::new("f");
        let p = b.param("p", ValueClass::Managed, ParamMode::Owned);
        let r = b.return_slot(ValueClass::Managed, true);
        // Neither p nor r is mentioned by any instruction.
        b.ret();
        let func = b.finish();

        let table = SymbolTable::extract(&func);
        assert_eq!(table.len(), 2);
        assert_eq!(table.index_of(p), Some(0));
        assert_eq!(table.index_of(r), Some(1));
        assert_eq!(table.ret_index(), Some(1));
    }

    #[test]
    fn trivial_variables_are_not_tracked() {
        let mut b = FunctionBuilder::new("f");
        let c = b.param("c", ValueClass::Trivial, ParamMode::Owned);
        let x = b.local("x", ValueClass::Managed);
        b.bind(x, vec![Operand::read(c)]);
        b.effect(vec![Operand::consume(x)]);
        b.ret();
        let func = b.finish();

        let table = SymbolTable::extract(&func);
        assert_eq!(table.len(), 1);
        assert_eq!(table.index_of(c), None);
        assert_eq!(table.index_of(x), Some(0));
    }

    #[test]
    fn first_discovery_order_is_traversal_order() {
        let mut b = FunctionBuilder::new("f");
        let x = b.local("x", ValueClass::Managed);
        let y = b.local("y", ValueClass::Managed);
        // y occurs before x in instruction order; declaration order must
        // not matter.
        b.bind(y, vec![]);
        b.bind(x, vec![Operand::read(y)]);
        b.ret();
        let func = b.finish();

        let table = SymbolTable::extract(&func);
        assert_eq!(table.index_of(y), Some(0));
        assert_eq!(table.index_of(x), Some(1));
    }

    #[test]
    fn address_of_records_a_symmetric_alias() {
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

        // First-discovery order: x (bind) then r (addr-of destination).
        assert_eq!(table.index_of(x), Some(0));
        assert_eq!(table.index_of(r), Some(1));
        assert_eq!(table.aliases_of(0), &[1]);
        assert_eq!(table.aliases_of(1), &[0]);
    }

    /// The alias relation is deliberately not transitively closed: with
    /// `r1 = &x; r2 = &r1`, `r2` and `x` are not recorded as aliases. This
    /// is the documented single-level approximation, kept as-is rather
    /// than silently strengthened.
    #[test]
    fn alias_chain_is_not_transitively_closed() {
        let mut b = FunctionBuilder::new("f");
        let x = b.local("x", ValueClass::Managed);
        let r1 = b.local("r1", ValueClass::Managed);
        let r2 = b.local("r2", ValueClass::Managed);
        b.bind(x, vec![]);
        b.addr_of(r1, x);
        b.addr_of(r2, r1);
        b.ret();
        let func = b.finish();

        let mut table = SymbolTable::extract(&func);
        table.populate_aliases(&func);

        // First-discovery order: x, r1, r2.
        assert_eq!(table.index_of(x), Some(0));
        assert_eq!(table.index_of(r1), Some(1));
        assert_eq!(table.index_of(r2), Some(2));
        assert!(!table.aliases_of(0).contains(&2));
        assert!(!table.aliases_of(2).contains(&0));
    }
}
