//! Textual dumps of analysis state — a development aid gated by the
//! session's debug level, not a stable output format.

use std::fmt::Write as _;

use keel_ir::Function;

use crate::flow::{FlowKind, FlowKinds, FlowSets};
use crate::symbols::SymbolTable;

/// List the tracked symbols with their indices, classes, scopes, and
/// aliases.
pub fn dump_symbols(func: &Function, table: &SymbolTable) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "symbols of `{}` ({} tracked):", func.name, table.len());
    for idx in 0..table.len() {
        let var = table.var_at(idx);
        let _ = write!(
            out,
            "  [{idx}] {} ({:?}, scope {})",
            func.var_name(var),
            func.var_class(var),
            func.var_scope(var).raw(),
        );
        if table.ret_index() == Some(idx) {
            let _ = write!(out, " [return slot]");
        }
        if !table.aliases_of(idx).is_empty() {
            let _ = write!(out, " aliases {:?}", table.aliases_of(idx));
        }
        let _ = writeln!(out);
    }
    out
}

/// Print the selected flow relations for every block, symbols by name.
pub fn dump_flow_sets(
    func: &Function,
    table: &SymbolTable,
    sets: &FlowSets,
    kinds: FlowKinds,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "flow sets of `{}`:", func.name);
    for b in 0..sets.num_blocks() {
        let _ = writeln!(out, "block {b}:");
        for kind in FlowKind::ALL {
            if !kinds.contains(kind.mask()) {
                continue;
            }
            let names: Vec<&str> = sets
                .get(kind, b)
                .ones()
                .map(|s| func.var_name(table.var_at(s)))
                .collect();
            let _ = writeln!(out, "  {:<10} {{{}}}", kind.name(), names.join(", "));
        }
    }
    out
}

/// Per-symbol view: for one symbol, which blocks carry each flow bit.
pub fn dump_symbol_stats(func: &Function, table: &SymbolTable, sets: &FlowSets, sym: usize) -> String {
    let var = table.var_at(sym);
    let mut out = String::new();
    let _ = writeln!(out, "symbol `{}` [{sym}]:", func.var_name(var));
    for kind in FlowKind::ALL {
        let blocks: Vec<usize> = (0..sets.num_blocks())
            .filter(|&b| sets.bit(kind, b, sym))
            .collect();
        let _ = writeln!(out, "  {:<10} {blocks:?}", kind.name());
    }
    out
}
