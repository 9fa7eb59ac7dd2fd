//! A single function: its signature, data-flow graph, and layout.

use crate::dfg::DataFlowGraph;
use crate::entities::{Block, StackSlot, Type, Value};
use crate::layout::Layout;
use crate::stackslot::{StackSlotData, StackSlots};

/// A function's parameter and return types. Function arguments are
/// represented as the entry block's parameters (`dfg.block_params`), the
/// same choice `cranelift-codegen` makes, so there is exactly one notion of
/// "argument value" rather than two that must be kept in sync.
#[derive(Clone, Debug, Default)]
pub struct Signature {
    pub params: Vec<Type>,
    pub ret: Option<Type>,
}

/// One function in a [`crate::module::Module`].
#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    pub signature: Signature,
    pub dfg: DataFlowGraph,
    pub layout: Layout,
    pub stack_slots: StackSlots,
}

impl Function {
    pub fn new(name: impl Into<String>, signature: Signature) -> Self {
        let mut dfg = DataFlowGraph::new();
        let mut layout = Layout::new();
        let entry = dfg.make_block();
        layout.append_block(entry);
        for &ty in &signature.params {
            dfg.append_block_param(entry, ty);
        }
        Function { name: name.into(), signature, dfg, layout, stack_slots: StackSlots::new() }
    }

    /// Allocate a new stack slot of `size` bytes, used by the rewriter to
    /// back one logical variable's shadow taint value.
    pub fn create_stack_slot(&mut self, size: u32) -> StackSlot {
        self.stack_slots.push(StackSlotData::new(size))
    }

    /// The function's entry block, created by [`Function::new`] and always
    /// first in layout order.
    pub fn entry_block(&self) -> Block {
        self.layout.entry_block().expect("a function always has an entry block")
    }

    /// The function's arguments, as the entry block's parameters.
    pub fn arguments(&self) -> &[Value] {
        self.dfg.block_params(self.entry_block())
    }

    /// Append a new block to the function (not yet wired into any branch).
    pub fn make_block(&mut self) -> Block {
        let block = self.dfg.make_block();
        self.layout.append_block(block);
        block
    }
}
