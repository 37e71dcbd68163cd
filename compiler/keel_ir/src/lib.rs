//! Function-level IR for the keel compiler's resource-management passes.
//!
//! This crate defines the representation the ownership-flow pass
//! (`keel_ownership`) consumes and rewrites:
//!
//! - **[`Function`]** — a function body: parameters, scope tree, basic
//!   blocks, per-variable metadata.
//! - **[`Block`]** — a basic block: sequential instructions plus a
//!   terminator, tagged with the lexical scope it belongs to.
//! - **[`Instr`] / [`Terminator`]** — instructions whose operands carry the
//!   front end's ownership classification ([`Access`]): every occurrence of
//!   a variable is either a *produce* (ownership assigned into it), a
//!   *consume* (ownership transferred out of it), or a plain *use*.
//!
//! # Architecture
//!
//! Variables are named via [`VarId`] and denote storage locations, not SSA
//! values — a variable may be written more than once (the return slot of an
//! iterator is re-produced at every yield). Control flow uses [`BlockId`]
//! references between blocks; block identities are stable across the CFG
//! mutations the ownership pass performs ([`Function::push_block`],
//! [`Function::split_edge`], instruction insertion).
//!
//! The front end decides *what* produces or consumes ownership; this crate
//! only carries that answer. Nothing here inspects types beyond the
//! three-way [`ValueClass`] classification.

mod builder;
mod ir;

pub use builder::FunctionBuilder;
pub use ir::{
    Access, Block, BlockId, Function, Instr, OccKind, Occurrence, Operand, Param, ParamMode,
    Scope, ScopeId, Terminator, ValueClass, VarId, VarInfo,
};
