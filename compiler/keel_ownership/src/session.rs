//! Per-function analysis session.
//!
//! [`OwnershipFlow`] consolidates the state the pass threads between its
//! stages — symbol table, CFG adapter, flow sets, transition records,
//! exit map — and owns their lifecycle: everything is built for one
//! function, mutated in place until the fixpoints converge, consumed by
//! the rewriter, and discarded when the session ends. Nothing is shared
//! across functions, so callers may analyze independent functions on
//! independent threads.
//!
//! Stages must run in the order [`run`](OwnershipFlow::run) uses; calling
//! one before its inputs exist is a programming error in the driving pass
//! sequence and panics rather than returning a recoverable error.

use keel_ir::Function;

use crate::cfg::Cfg;
use crate::check;
use crate::dump::{dump_flow_sets, dump_symbol_stats, dump_symbols};
use crate::error::FlowError;
use crate::exits::{compute_exit_blocks, compute_scope_map, ExitMap};
use crate::flow::{FlowKind, FlowKinds, FlowSets};
use crate::liveness;
use crate::ownership;
use crate::rewrite;
use crate::symbols::SymbolTable;
use crate::transitions::{self, Transitions};

/// How chatty the session is. The original levels 0/1/2, as a type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum DebugLevel {
    #[default]
    Off,
    /// Dump converged flow sets.
    Verbose,
    /// Additionally dump the symbol catalog and per-symbol statistics.
    VeryVerbose,
}

/// Session configuration, threaded into the constructor — never
/// process-wide state.
#[derive(Clone, Copy, Debug, Default)]
pub struct FlowConfig {
    pub debug: DebugLevel,
}

/// One function's ownership-flow analysis session.
pub struct OwnershipFlow<'f> {
    func: &'f mut Function,
    config: FlowConfig,
    table: Option<SymbolTable>,
    exits: Option<ExitMap>,
    cfg: Option<Cfg>,
    sets: Option<FlowSets>,
    transitions: Option<Transitions>,
}

impl<'f> OwnershipFlow<'f> {
    /// Create a session for `func`.
    pub fn new(func: &'f mut Function, config: FlowConfig) -> Self {
        Self {
            func,
            config,
            table: None,
            exits: None,
            cfg: None,
            sets: None,
            transitions: None,
        }
    }

    /// Run every stage in order and validate the result.
    pub fn run(mut self) -> Result<(), FlowError> {
        tracing::debug!(function = %self.func.name, "ownership flow analysis");

        self.extract_symbols();
        if self.table.as_ref().is_some_and(SymbolTable::is_empty) {
            tracing::debug!(function = %self.func.name, "no tracked symbols, skipping");
            return Ok(());
        }
        self.populate_aliases();
        self.compute_exits();
        self.create_flow_sets();
        self.compute_transitions();
        self.backward_flow_use();
        self.forward_flow_ownership();

        if self.config.debug >= DebugLevel::Verbose {
            self.dump_converged_state();
        }

        self.insert_auto_copies();
        self.insert_auto_destroys();
        self.check_forward_ownership()
    }

    /// Build the symbol catalog (§ Symbol Catalog).
    pub fn extract_symbols(&mut self) {
        debug_assert!(self.table.is_none(), "extract_symbols ran twice");
        self.table = Some(SymbolTable::extract(self.func));
    }

    /// Build the alias map (§ Alias Map Builder).
    pub fn populate_aliases(&mut self) {
        let Some(table) = self.table.as_mut() else {
            panic!("populate_aliases before extract_symbols");
        };
        table.populate_aliases(self.func);
    }

    /// Locate scope exits, normalizing multi-exit scopes with synthetic
    /// join blocks, then freeze the CFG adapter (§ Exit Locator, § CFG
    /// Adapter). The adapter is built here because exit normalization is
    /// the last pre-analysis CFG mutation.
    pub fn compute_exits(&mut self) {
        let Some(table) = self.table.as_ref() else {
            panic!("compute_exits before extract_symbols");
        };
        let scope_map = compute_scope_map(self.func);
        self.exits = Some(compute_exit_blocks(self.func, table, &scope_map));
        self.cfg = Some(Cfg::build(self.func));
    }

    /// Allocate the seven flow relations and mark the EXIT bits
    /// (§ Flow Set Store).
    pub fn create_flow_sets(&mut self) {
        let (Some(table), Some(cfg), Some(exits)) =
            (self.table.as_ref(), self.cfg.as_ref(), self.exits.as_ref())
        else {
            panic!("create_flow_sets before compute_exits");
        };
        let mut sets = FlowSets::new(cfg.num_blocks(), table.len());
        for sym in 0..table.len() {
            for &e in exits.blocks_for(sym) {
                sets.set_bit(FlowKind::Exit, e.index(), sym);
            }
        }
        self.sets = Some(sets);
    }

    /// Classify every symbol occurrence and fill PROD/CONS/USE
    /// (§ Transition Computer).
    pub fn compute_transitions(&mut self) {
        let (Some(table), Some(sets)) = (self.table.as_ref(), self.sets.as_mut()) else {
            panic!("compute_transitions before create_flow_sets");
        };
        self.transitions = Some(transitions::compute_transitions(self.func, table, sets));
    }

    /// Converge USED_LATER (§ Backward Liveness Solver).
    pub fn backward_flow_use(&mut self) {
        let (Some(cfg), Some(sets)) = (self.cfg.as_ref(), self.sets.as_mut()) else {
            panic!("backward_flow_use before compute_transitions");
        };
        liveness::backward_flow_use(cfg, sets);
    }

    /// Converge IN/OUT (§ Forward Ownership Solver). Requires converged
    /// liveness — ownership transfer depends on "is this the last use".
    pub fn forward_flow_ownership(&mut self) {
        let (Some(cfg), Some(sets), Some(trans)) = (
            self.cfg.as_ref(),
            self.sets.as_mut(),
            self.transitions.as_ref(),
        ) else {
            panic!("forward_flow_ownership before backward_flow_use");
        };
        ownership::forward_flow_ownership(cfg, sets, trans);
    }

    /// Insert duplications before under-owned consumptions (§ Rewriter).
    pub fn insert_auto_copies(&mut self) {
        let (Some(table), Some(sets), Some(trans)) = (
            self.table.as_ref(),
            self.sets.as_ref(),
            self.transitions.as_ref(),
        ) else {
            panic!("insert_auto_copies before the solvers converged");
        };
        rewrite::insert_auto_copies(self.func, table, sets, trans);
    }

    /// Insert releases at scope exits, mixed-ownership edges, suspension
    /// points, and function exits (§ Rewriter).
    pub fn insert_auto_destroys(&mut self) {
        let (Some(table), Some(cfg), Some(sets), Some(exits)) = (
            self.table.as_ref(),
            self.cfg.as_ref(),
            self.sets.as_mut(),
            self.exits.as_ref(),
        ) else {
            panic!("insert_auto_destroys before the solvers converged");
        };
        if self.func.is_iterator {
            rewrite::iterator_insert_auto_destroys(self.func, table, cfg, sets);
        }
        rewrite::insert_auto_destroys(self.func, table, cfg, sets, exits);
    }

    /// Validate the rewritten function (§ Consistency Checker).
    pub fn check_forward_ownership(&self) -> Result<(), FlowError> {
        let (Some(table), Some(cfg), Some(sets)) = (
            self.table.as_ref(),
            self.cfg.as_ref(),
            self.sets.as_ref(),
        ) else {
            panic!("check_forward_ownership before the rewriter ran");
        };
        check::check_forward_ownership(self.func, table, cfg, sets)
    }

    fn dump_converged_state(&self) {
        let (Some(table), Some(sets)) = (self.table.as_ref(), self.sets.as_ref()) else {
            return;
        };
        tracing::debug!(
            "\n{}",
            dump_flow_sets(self.func, table, sets, FlowKinds::ALL)
        );
        if self.config.debug >= DebugLevel::VeryVerbose {
            tracing::debug!("\n{}", dump_symbols(self.func, table));
            for sym in 0..table.len() {
                tracing::debug!("\n{}", dump_symbol_stats(self.func, table, sets, sym));
            }
        }
    }
}

/// Analyze one function with the given configuration: the whole pass,
/// start to finish.
pub fn analyze_function(func: &mut Function, config: FlowConfig) -> Result<(), FlowError> {
    OwnershipFlow::new(func, config).run()
}
