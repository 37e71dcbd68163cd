//! Construction helper for [`Function`] bodies.
//!
//! Follows the "position at a block, emit instructions, terminate" pattern.
//! The front end lowers source text through a builder like this one; the
//! ownership-flow pass's tests use it directly to assemble CFG shapes.

use crate::ir::{
    Block, BlockId, Function, Instr, Operand, Param, ParamMode, Scope, ScopeId, Terminator,
    ValueClass, VarId, VarInfo,
};

/// In-progress basic block.
struct BlockBuilder {
    id: BlockId,
    scope: ScopeId,
    body: Vec<Instr>,
    terminator: Option<Terminator>,
}

impl BlockBuilder {
    fn new(id: BlockId, scope: ScopeId) -> Self {
        Self {
            id,
            scope,
            body: Vec::new(),
            terminator: None,
        }
    }
}

/// Builder for an in-progress [`Function`].
///
/// Owns block, scope, and variable state while the function is assembled;
/// consumed by [`finish`](FunctionBuilder::finish).
pub struct FunctionBuilder {
    name: String,
    params: Vec<Param>,
    ret: Option<VarId>,
    returns_owned: bool,
    is_iterator: bool,
    blocks: Vec<BlockBuilder>,
    current: BlockId,
    scopes: Vec<Scope>,
    scope_stack: Vec<ScopeId>,
    vars: Vec<VarInfo>,
}

impl FunctionBuilder {
    /// Create a builder with a root scope and an entry block already
    /// allocated.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            ret: None,
            returns_owned: false,
            is_iterator: false,
            blocks: vec![BlockBuilder::new(BlockId::new(0), ScopeId::ROOT)],
            current: BlockId::new(0),
            scopes: vec![Scope { parent: None }],
            scope_stack: vec![ScopeId::ROOT],
            vars: Vec::new(),
        }
    }

    // ── Signature ───────────────────────────────────────────────

    /// Declare a formal parameter (always in the root scope).
    pub fn param(&mut self, name: impl Into<String>, class: ValueClass, mode: ParamMode) -> VarId {
        let var = self.fresh_var(name, class, ScopeId::ROOT);
        self.params.push(Param { var, mode });
        var
    }

    /// Declare the return slot (always in the root scope). `owned` records
    /// whether the function transfers ownership of the returned value to
    /// its caller.
    pub fn return_slot(&mut self, class: ValueClass, owned: bool) -> VarId {
        debug_assert!(self.ret.is_none(), "return slot declared twice");
        let var = self.fresh_var("ret", class, ScopeId::ROOT);
        self.ret = Some(var);
        self.returns_owned = owned;
        var
    }

    /// Mark the function as a coroutine-style iterator.
    pub fn mark_iterator(&mut self) {
        self.is_iterator = true;
    }

    // ── Scopes and variables ────────────────────────────────────

    /// Open a nested lexical scope; subsequent blocks and locals belong to
    /// it until [`exit_scope`](Self::exit_scope).
    pub fn enter_scope(&mut self) -> ScopeId {
        let id = ScopeId::new(
            u32::try_from(self.scopes.len())
                .unwrap_or_else(|_| panic!("scope count exceeds u32::MAX")),
        );
        let parent = *self
            .scope_stack
            .last()
            .unwrap_or_else(|| panic!("scope stack empty"));
        self.scopes.push(Scope { parent: Some(parent) });
        self.scope_stack.push(id);
        id
    }

    /// Close the innermost scope.
    pub fn exit_scope(&mut self) {
        debug_assert!(self.scope_stack.len() > 1, "cannot exit the root scope");
        self.scope_stack.pop();
    }

    /// Declare a local variable in the current scope.
    pub fn local(&mut self, name: impl Into<String>, class: ValueClass) -> VarId {
        let scope = *self
            .scope_stack
            .last()
            .unwrap_or_else(|| panic!("scope stack empty"));
        self.fresh_var(name, class, scope)
    }

    fn fresh_var(&mut self, name: impl Into<String>, class: ValueClass, scope: ScopeId) -> VarId {
        let id = VarId::new(
            u32::try_from(self.vars.len())
                .unwrap_or_else(|_| panic!("variable count exceeds u32::MAX")),
        );
        self.vars.push(VarInfo {
            name: name.into(),
            class,
            scope,
        });
        id
    }

    // ── Blocks ──────────────────────────────────────────────────

    /// Allocate a new empty block in the current scope and return its ID.
    pub fn new_block(&mut self) -> BlockId {
        let scope = *self
            .scope_stack
            .last()
            .unwrap_or_else(|| panic!("scope stack empty"));
        let id = BlockId::new(
            u32::try_from(self.blocks.len())
                .unwrap_or_else(|_| panic!("block count exceeds u32::MAX")),
        );
        self.blocks.push(BlockBuilder::new(id, scope));
        id
    }

    /// Set the current insertion point.
    pub fn position_at(&mut self, block: BlockId) {
        debug_assert!(
            block.index() < self.blocks.len(),
            "BlockId {} out of bounds (have {} blocks)",
            block.raw(),
            self.blocks.len(),
        );
        self.current = block;
    }

    /// The entry block (always block 0).
    #[inline]
    pub fn entry_block(&self) -> BlockId {
        BlockId::new(0)
    }

    // ── Instructions ────────────────────────────────────────────

    /// Emit `dst = <owned rvalue>(args...)`.
    pub fn bind(&mut self, dst: VarId, args: Vec<Operand>) {
        self.emit(Instr::Bind { dst, args });
    }

    /// Emit a call/statement with no tracked result.
    pub fn effect(&mut self, args: Vec<Operand>) {
        self.emit(Instr::Effect { args });
    }

    /// Emit `dst = &src`.
    pub fn addr_of(&mut self, dst: VarId, src: VarId) {
        self.emit(Instr::AddrOf { dst, src });
    }

    fn emit(&mut self, instr: Instr) {
        let block = &mut self.blocks[self.current.index()];
        debug_assert!(
            block.terminator.is_none(),
            "emitting into terminated block {}",
            block.id.raw(),
        );
        block.body.push(instr);
    }

    // ── Terminators ─────────────────────────────────────────────

    /// Terminate the current block with `Return`.
    pub fn ret(&mut self) {
        self.terminate(Terminator::Return);
    }

    /// Terminate the current block with an unconditional jump.
    pub fn jump(&mut self, target: BlockId) {
        self.terminate(Terminator::Jump { target });
    }

    /// Terminate the current block with a conditional branch.
    pub fn branch(&mut self, cond: VarId, then_block: BlockId, else_block: BlockId) {
        self.terminate(Terminator::Branch {
            cond,
            then_block,
            else_block,
        });
    }

    /// Terminate the current block with an iterator suspension resuming at
    /// `resume`.
    pub fn yield_to(&mut self, resume: BlockId) {
        self.terminate(Terminator::Yield { resume });
    }

    fn terminate(&mut self, terminator: Terminator) {
        let block = &mut self.blocks[self.current.index()];
        debug_assert!(
            block.terminator.is_none(),
            "block {} terminated twice",
            block.id.raw(),
        );
        block.terminator = Some(terminator);
    }

    // ── Finish ──────────────────────────────────────────────────

    /// Produce the finished [`Function`].
    ///
    /// # Panics
    ///
    /// Panics if any block lacks a terminator.
    pub fn finish(self) -> Function {
        let blocks = self
            .blocks
            .into_iter()
            .map(|b| {
                let terminator = b
                    .terminator
                    .unwrap_or_else(|| panic!("block {} has no terminator", b.id.raw()));
                Block {
                    id: b.id,
                    scope: b.scope,
                    body: b.body,
                    terminator,
                }
            })
            .collect();
        Function {
            name: self.name,
            params: self.params,
            ret: self.ret,
            returns_owned: self.returns_owned,
            is_iterator: self.is_iterator,
            entry: BlockId::new(0),
            blocks,
            scopes: self.scopes,
            vars: self.vars,
        }
    }
}
