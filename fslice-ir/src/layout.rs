//! Function layout: the linear order of blocks and of instructions within
//! each block.
//!
//! `cranelift-codegen`'s `Layout` stores this order as an intrusive doubly
//! linked list threaded through side tables, so that inserting an
//! instruction anywhere is O(1). This IR never holds functions large enough
//! for that to matter (the rewriter processes one function at a time and
//! discards its layout afterwards), so the layout here is the much simpler
//! `Vec<Inst>`-per-block representation; what matters is the insertion
//! discipline (placed immediately before the target instruction), not its
//! asymptotic cost.

use crate::entities::{Block, Inst};
use std::collections::HashMap;

#[derive(Clone, Debug, Default)]
pub struct Layout {
    block_order: Vec<Block>,
    block_insts: HashMap<Block, Vec<Inst>>,
    inst_block: HashMap<Inst, Block>,
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `block` to the end of the function's block order.
    pub fn append_block(&mut self, block: Block) {
        self.block_order.push(block);
        self.block_insts.entry(block).or_default();
    }

    /// Append `inst` to the end of `block`.
    pub fn append_inst(&mut self, block: Block, inst: Inst) {
        self.block_insts.entry(block).or_default().push(inst);
        self.inst_block.insert(inst, block);
    }

    /// Insert `new_inst` immediately before `before` in `before`'s block.
    /// This is the sole insertion primitive the rewriter uses to splice in
    /// instrumentation.
    pub fn insert_inst_before(&mut self, before: Inst, new_inst: Inst) {
        let block = self.inst_block[&before];
        let insts = self.block_insts.get_mut(&block).expect("block has instructions");
        let idx = insts
            .iter()
            .position(|&i| i == before)
            .expect("`before` must already be laid out in its block");
        insts.insert(idx, new_inst);
        self.inst_block.insert(new_inst, block);
    }

    /// Blocks in program order.
    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.block_order.iter().copied()
    }

    /// The first block in layout order, i.e. the entry block.
    pub fn entry_block(&self) -> Option<Block> {
        self.block_order.first().copied()
    }

    /// Instructions of `block`, in program order. Empty if `block` has no
    /// instructions or hasn't been laid out.
    pub fn block_insts(&self, block: Block) -> &[Inst] {
        self.block_insts.get(&block).map_or(&[], Vec::as_slice)
    }

    pub fn inst_block(&self, inst: Inst) -> Option<Block> {
        self.inst_block.get(&inst).copied()
    }

    /// The instruction immediately after `inst` in its own block, if any.
    pub fn next_inst(&self, inst: Inst) -> Option<Inst> {
        let block = self.inst_block[&inst];
        let insts = &self.block_insts[&block];
        let idx = insts.iter().position(|&i| i == inst)?;
        insts.get(idx + 1).copied()
    }

    /// Remove `inst` from its block. Used by the rewriter to delete a
    /// memory intrinsic after replacing it with a runtime call; the
    /// instruction's data stays in the data-flow graph's table (unreachable,
    /// never walked again) rather than being compacted out.
    pub fn remove_inst(&mut self, inst: Inst) {
        let block = self.inst_block.remove(&inst).expect("inst must be laid out to be removed");
        self.block_insts.get_mut(&block).expect("block has instructions").retain(|&i| i != inst);
    }

    /// All instructions across all blocks, in program order — the list of
    /// original instructions the rewriter snapshots before instrumenting, so
    /// that newly inserted instructions are never themselves re-instrumented.
    pub fn all_insts(&self) -> Vec<Inst> {
        self.block_order
            .iter()
            .flat_map(|b| self.block_insts(*b).iter().copied())
            .collect()
    }
}
