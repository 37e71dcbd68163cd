//! Internal-error tier for the ownership-flow pass.
//!
//! Nothing here is a user-facing diagnostic: the pass assumes a well-typed,
//! already-validated IR, so every variant indicates a bug in the analysis
//! itself or an invariant violation in its input. The driving compilation
//! aborts rather than emit code with a leak or double-release.

use thiserror::Error;

/// A violated ownership invariant, with enough context to localize the bug.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FlowError {
    /// A consumption was found for a symbol that is not owned at that point
    /// and has no compiler-inserted duplication covering it.
    #[error("in `{func}`: symbol `{sym}` consumed in block {block} without ever being owned")]
    ConsumedUnowned {
        func: String,
        sym: String,
        block: u32,
    },

    /// A symbol other than the return slot is still owned at a function
    /// exit with no release inserted on that path.
    #[error("in `{func}`: symbol `{sym}` owned at function exit (block {block}) but never released")]
    LeakedAtExit {
        func: String,
        sym: String,
        block: u32,
    },

    /// Two releases would run for the same unit of ownership.
    #[error("in `{func}`: duplicate release of symbol `{sym}` in block {block}")]
    DoubleRelease {
        func: String,
        sym: String,
        block: u32,
    },

    /// A symbol gained ownership twice on one path without an intervening
    /// consumption.
    #[error("in `{func}`: symbol `{sym}` gains a second owner in block {block}")]
    DoubleProduce {
        func: String,
        sym: String,
        block: u32,
    },

    /// The function returns by ownership transfer but its return slot is
    /// not owned at a `Return`.
    #[error("in `{func}`: return slot `{sym}` not owned at return in block {block}")]
    ReturnNotOwned {
        func: String,
        sym: String,
        block: u32,
    },
}
