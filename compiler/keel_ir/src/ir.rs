//! Core IR types: identifiers, instructions, terminators, blocks, functions.

use smallvec::{smallvec, SmallVec};

// ── ID newtypes ─────────────────────────────────────────────────────

/// Variable ID within a function.
///
/// Identifies a storage location (local variable, parameter, or the return
/// slot). IDs are allocated sequentially starting from 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct VarId(u32);

impl VarId {
    /// Create a new variable ID from a raw index.
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Basic block ID within a function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    /// Create a new block ID from a raw index.
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Lexical scope ID within a function. Scope 0 is the function root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ScopeId(u32);

impl ScopeId {
    /// The function's root scope.
    pub const ROOT: ScopeId = ScopeId(0);

    /// Create a new scope ID from a raw index.
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ── Classification ──────────────────────────────────────────────────

/// Resource classification for a variable's type.
///
/// Assigned by the front end after type resolution. Determines whether the
/// ownership-flow pass tracks the variable at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueClass {
    /// No release obligation. The value is purely stack/register.
    Trivial,

    /// Holds a resource that must eventually be released (reference count
    /// decrement, destructor call).
    Managed,

    /// Classification could not be resolved. Conservatively treated as
    /// managed.
    Unknown,
}

impl ValueClass {
    /// Returns `true` if variables of this class participate in ownership
    /// flow. `Unknown` is tracked conservatively.
    #[inline]
    pub fn is_tracked(self) -> bool {
        !matches!(self, ValueClass::Trivial)
    }
}

/// How a function receives a formal parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamMode {
    /// The function owns the argument on entry and is responsible for its
    /// eventual release (or transfer).
    Owned,

    /// The caller retains ownership. Consuming a borrowed formal always
    /// requires a compiler-inserted duplication.
    Borrowed,
}

/// A formal parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Param {
    /// The variable bound to this parameter.
    pub var: VarId,
    /// Whether the function owns the argument on entry.
    pub mode: ParamMode,
}

// ── Operands ────────────────────────────────────────────────────────

/// Ownership effect of one operand position, assigned by the front end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Access {
    /// Read without ownership transfer.
    Use,
    /// Ownership is transferred out of the variable into the operation.
    Consume,
}

/// A classified operand: a variable plus the front end's answer to "does
/// this occurrence consume ownership".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Operand {
    pub var: VarId,
    pub access: Access,
}

impl Operand {
    /// A reading operand (no ownership transfer).
    #[inline]
    pub fn read(var: VarId) -> Self {
        Self {
            var,
            access: Access::Use,
        }
    }

    /// A consuming operand (ownership transferred to the operation).
    #[inline]
    pub fn consume(var: VarId) -> Self {
        Self {
            var,
            access: Access::Consume,
        }
    }
}

// ── Instructions ────────────────────────────────────────────────────

/// A single instruction in a basic block.
///
/// The instruction set is deliberately small: the ownership-flow pass cares
/// only about the *shape* of each statement (which occurrences produce,
/// consume, or read ownership), not about what it computes. `Retain` and
/// `Release` never appear in front-end output; they are inserted by the
/// rewriter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instr {
    /// `dst = <owned rvalue>(args...)` — initialization, move-in, or a call
    /// whose result is owned. Establishes ownership of `dst`.
    Bind { dst: VarId, args: Vec<Operand> },

    /// A call or statement with no tracked result. Operands may be consumed
    /// (passed by ownership transfer) or merely read.
    Effect { args: Vec<Operand> },

    /// `dst = &src` — `dst` refers to `src`'s storage for the remainder of
    /// the block. Feeds the alias map; `src` counts as read.
    AddrOf { dst: VarId, src: VarId },

    /// Compiler-inserted duplication: manufactures a fresh owned reference
    /// for `var` so an under-owned consumption is satisfied.
    Retain { var: VarId },

    /// Compiler-inserted release of `var`'s owned resource.
    Release { var: VarId },
}

/// Kind of a variable occurrence within an instruction or terminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OccKind {
    /// Ownership assigned into the variable.
    Produce,
    /// Ownership transferred out of the variable.
    Consume,
    /// Plain read.
    Use,
}

/// One classified variable occurrence, in evaluation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Occurrence {
    pub var: VarId,
    pub kind: OccKind,
}

impl Occurrence {
    #[inline]
    fn new(var: VarId, kind: OccKind) -> Self {
        Self { var, kind }
    }
}

impl Instr {
    /// All variable occurrences of this instruction in evaluation order:
    /// operand reads/consumes first, then the produced destination.
    ///
    /// This is the classification hook the ownership-flow pass walks; it
    /// never inspects instructions any other way. `AddrOf` reports only a
    /// use of `src` — the `dst` alias gains no ownership of its own.
    pub fn occurrences(&self) -> SmallVec<[Occurrence; 4]> {
        match self {
            Instr::Bind { dst, args } => {
                let mut occs: SmallVec<[Occurrence; 4]> = args
                    .iter()
                    .map(|op| {
                        Occurrence::new(
                            op.var,
                            match op.access {
                                Access::Use => OccKind::Use,
                                Access::Consume => OccKind::Consume,
                            },
                        )
                    })
                    .collect();
                occs.push(Occurrence::new(*dst, OccKind::Produce));
                occs
            }

            Instr::Effect { args } => args
                .iter()
                .map(|op| {
                    Occurrence::new(
                        op.var,
                        match op.access {
                            Access::Use => OccKind::Use,
                            Access::Consume => OccKind::Consume,
                        },
                    )
                })
                .collect(),

            Instr::AddrOf { src, .. } => smallvec![Occurrence::new(*src, OccKind::Use)],

            Instr::Retain { var } => smallvec![Occurrence::new(*var, OccKind::Use)],

            Instr::Release { var } => smallvec![Occurrence::new(*var, OccKind::Consume)],
        }
    }
}

// ── Terminators ─────────────────────────────────────────────────────

/// Block terminator — how control leaves a basic block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Terminator {
    /// Return from the function. The return slot (if any) is read here;
    /// its ownership passes to the caller without being consumed by the
    /// terminator itself.
    Return,

    /// Unconditional jump.
    Jump { target: BlockId },

    /// Conditional branch on a boolean variable.
    Branch {
        cond: VarId,
        then_block: BlockId,
        else_block: BlockId,
    },

    /// Iterator suspension: yields the current value of the return slot
    /// (consuming it) and later resumes at `resume`. The slot is
    /// re-produced before every subsequent yield — the one sanctioned case
    /// of multiple producers for a single variable.
    Yield { resume: BlockId },
}

impl Terminator {
    /// Successor block IDs.
    pub fn successors(&self) -> SmallVec<[BlockId; 4]> {
        match self {
            Terminator::Return => SmallVec::new(),
            Terminator::Jump { target } => smallvec![*target],
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } => smallvec![*then_block, *else_block],
            Terminator::Yield { resume } => smallvec![*resume],
        }
    }

    /// Classified variable occurrences of this terminator. `ret` is the
    /// function's return slot, needed because `Return` and `Yield` touch it
    /// implicitly.
    pub fn occurrences(&self, ret: Option<VarId>) -> SmallVec<[Occurrence; 2]> {
        match self {
            Terminator::Return => match ret {
                Some(r) => smallvec![Occurrence::new(r, OccKind::Use)],
                None => SmallVec::new(),
            },
            Terminator::Jump { .. } => SmallVec::new(),
            Terminator::Branch { cond, .. } => smallvec![Occurrence::new(*cond, OccKind::Use)],
            Terminator::Yield { .. } => match ret {
                Some(r) => smallvec![Occurrence::new(r, OccKind::Consume)],
                None => SmallVec::new(),
            },
        }
    }

    /// Replace every successor edge to `from` with an edge to `to`.
    ///
    /// Returns the number of edges rewritten.
    pub fn redirect(&mut self, from: BlockId, to: BlockId) -> usize {
        let mut n = 0;
        let mut sub = |b: &mut BlockId| {
            if *b == from {
                *b = to;
                n += 1;
            }
        };
        match self {
            Terminator::Return => {}
            Terminator::Jump { target } => sub(target),
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } => {
                sub(then_block);
                sub(else_block);
            }
            Terminator::Yield { resume } => sub(resume),
        }
        n
    }
}

// ── Scopes ──────────────────────────────────────────────────────────

/// A node in the function's lexical scope tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scope {
    /// Enclosing scope; `None` only for the root.
    pub parent: Option<ScopeId>,
}

// ── Variables ───────────────────────────────────────────────────────

/// Per-variable metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VarInfo {
    /// Debug name, used in dumps and internal-error reports.
    pub name: String,
    /// Front-end resource classification.
    pub class: ValueClass,
    /// The scope the variable is declared in; its storage dies when that
    /// scope is left.
    pub scope: ScopeId,
}

// ── Blocks ──────────────────────────────────────────────────────────

/// A basic block: sequential instructions plus a terminator, tagged with
/// the lexical scope it executes in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    /// This block's identifier.
    pub id: BlockId,
    /// The innermost lexical scope this block belongs to.
    pub scope: ScopeId,
    /// Sequential instructions executed in order.
    pub body: Vec<Instr>,
    /// How control leaves this block.
    pub terminator: Terminator,
}

// ── Functions ───────────────────────────────────────────────────────

/// A complete function body.
///
/// Contains everything the ownership-flow pass needs: classified
/// parameters, the scope tree, basic blocks, and per-variable metadata.
/// The pass mutates it in place (inserted `Retain`/`Release` instructions,
/// synthetic join blocks) without invalidating any existing [`BlockId`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Function {
    /// The function's name (for dumps and internal-error context).
    pub name: String,
    /// Formal parameters. Parameter variables are declared in the root scope.
    pub params: Vec<Param>,
    /// The return slot, if the function returns a value.
    pub ret: Option<VarId>,
    /// Whether the return slot's value is transferred to the caller by
    /// ownership (as opposed to a trivial copy).
    pub returns_owned: bool,
    /// Whether this is a coroutine-style iterator (has `Yield` terminators).
    pub is_iterator: bool,
    /// The entry block ID.
    pub entry: BlockId,
    /// Basic blocks; `blocks[id.index()]` is the block with that ID.
    pub blocks: Vec<Block>,
    /// The lexical scope tree; `scopes[0]` is the root.
    pub scopes: Vec<Scope>,
    /// Per-variable metadata, indexed by `VarId::index()`.
    pub vars: Vec<VarInfo>,
}

impl Function {
    /// Look up a variable's classification.
    #[inline]
    pub fn var_class(&self, var: VarId) -> ValueClass {
        self.vars[var.index()].class
    }

    /// Look up a variable's debug name.
    #[inline]
    pub fn var_name(&self, var: VarId) -> &str {
        &self.vars[var.index()].name
    }

    /// Look up a variable's declaring scope.
    #[inline]
    pub fn var_scope(&self, var: VarId) -> ScopeId {
        self.vars[var.index()].scope
    }

    /// Does scope `outer` contain scope `inner` (reflexively)?
    pub fn scope_contains(&self, outer: ScopeId, inner: ScopeId) -> bool {
        let mut cur = inner;
        loop {
            if cur == outer {
                return true;
            }
            match self.scopes[cur.index()].parent {
                Some(p) => cur = p,
                None => return false,
            }
        }
    }

    /// Return the [`BlockId`] the next [`push_block`](Self::push_block)
    /// call will use.
    pub fn next_block_id(&self) -> BlockId {
        BlockId::new(
            u32::try_from(self.blocks.len())
                .unwrap_or_else(|_| panic!("block count exceeds u32::MAX")),
        )
    }

    /// Append a new basic block.
    ///
    /// # Panics
    ///
    /// Debug-panics if `block.id` does not match the next sequential index.
    pub fn push_block(&mut self, block: Block) {
        debug_assert_eq!(
            block.id,
            self.next_block_id(),
            "block ID {} does not match expected index {}",
            block.id.raw(),
            self.next_block_id().raw(),
        );
        self.blocks.push(block);
    }

    /// Split the edge `pred → succ` by inserting an empty forwarding block.
    ///
    /// Every edge from `pred` to `succ` is redirected to the new block,
    /// which jumps to `succ`. The new block is placed in `scope`. Existing
    /// block identities are unchanged.
    ///
    /// # Panics
    ///
    /// Debug-panics if `pred` has no edge to `succ`.
    pub fn split_edge(&mut self, pred: BlockId, succ: BlockId, scope: ScopeId) -> BlockId {
        let id = self.next_block_id();
        let rewritten = self.blocks[pred.index()].terminator.redirect(succ, id);
        debug_assert!(
            rewritten > 0,
            "split_edge: block {} has no edge to block {}",
            pred.raw(),
            succ.raw(),
        );
        self.push_block(Block {
            id,
            scope,
            body: Vec::new(),
            terminator: Terminator::Jump { target: succ },
        });
        id
    }
}
