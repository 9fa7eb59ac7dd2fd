//! The data-flow graph: tracks instructions, values, and block parameters.
//!
//! Mirrors `cranelift-codegen::ir::dfg::DataFlowGraph` in spirit (entity
//! tables keyed by [`Inst`]/[`Value`]/[`Block`]) but trimmed down to exactly
//! what the taint rewriter needs: at most one result per instruction (this
//! IR has no multi-return instructions), block parameters standing in for
//! phi-nodes, and no value aliasing/union-find machinery of its own — the
//! rewriter brings its own DSU for logical variables, entirely separate
//! from this module.

use crate::entities::{Block, Inst, Type, Value};
use crate::instructions::{ExtFuncData, ExtFuncRef, InstructionData};
use cranelift_entity::PrimaryMap;

/// What a [`Value`] denotes: either the single result of an instruction, or
/// the Nth parameter of a block (the phi-equivalent this IR uses).
#[derive(Copy, Clone, Debug)]
pub enum ValueDef {
    Result(Inst),
    Param(Block, u32),
}

#[derive(Clone, Debug)]
struct ValueData {
    def: ValueDef,
    ty: Type,
}

#[derive(Clone, Debug, Default)]
struct BlockData {
    params: Vec<Value>,
}

/// Owns every instruction, value, and block-parameter list in a function.
#[derive(Clone, Debug, Default)]
pub struct DataFlowGraph {
    insts: PrimaryMap<Inst, InstructionData>,
    /// At most one result per instruction; `None` for void instructions
    /// (stores, returns, branches, memory intrinsics).
    results: PrimaryMap<Inst, Option<Value>>,
    values: PrimaryMap<Value, ValueData>,
    blocks: PrimaryMap<Block, BlockData>,
    ext_funcs: PrimaryMap<ExtFuncRef, ExtFuncData>,
}

impl DataFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an instruction with no result (store, return, branch, ...).
    pub fn make_inst(&mut self, data: InstructionData) -> Inst {
        let inst = self.insts.push(data);
        let none = self.results.push(None);
        debug_assert_eq!(inst, none);
        inst
    }

    /// Insert an instruction and attach a freshly-allocated result value of
    /// type `ty`.
    pub fn make_inst_result(&mut self, data: InstructionData, ty: Type) -> (Inst, Value) {
        let inst = self.insts.push(data);
        let value = self.values.push(ValueData { def: ValueDef::Result(inst), ty });
        let pushed = self.results.push(Some(value));
        debug_assert_eq!(inst, pushed);
        (inst, value)
    }

    pub fn inst_data(&self, inst: Inst) -> &InstructionData {
        &self.insts[inst]
    }

    pub fn inst_data_mut(&mut self, inst: Inst) -> &mut InstructionData {
        &mut self.insts[inst]
    }

    pub fn replace_inst(&mut self, inst: Inst, data: InstructionData) {
        self.insts[inst] = data;
    }

    /// The result of `inst`, if it has one.
    pub fn inst_result(&self, inst: Inst) -> Option<Value> {
        self.results[inst]
    }

    pub fn value_type(&self, value: Value) -> Type {
        self.values[value].ty
    }

    pub fn value_def(&self, value: Value) -> ValueDef {
        self.values[value].def
    }

    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    /// Create a new, empty block.
    pub fn make_block(&mut self) -> Block {
        self.blocks.push(BlockData::default())
    }

    /// Append a new parameter of type `ty` to `block`, returning its
    /// `Value`. This is how phi-node destinations are represented.
    pub fn append_block_param(&mut self, block: Block, ty: Type) -> Value {
        let num = self.blocks[block].params.len() as u32;
        let value = self.values.push(ValueData { def: ValueDef::Param(block, num), ty });
        self.blocks[block].params.push(value);
        value
    }

    pub fn block_params(&self, block: Block) -> &[Value] {
        &self.blocks[block].params
    }

    /// Declare (or look up) an external function by name, used both for
    /// ordinary callees and for the well-known libc symbols renamed during
    /// known-symbol interception.
    pub fn declare_ext_func(&mut self, name: impl Into<String>) -> ExtFuncRef {
        self.ext_funcs.push(ExtFuncData { name: name.into() })
    }

    pub fn ext_func_name(&self, func: ExtFuncRef) -> &str {
        &self.ext_funcs[func].name
    }

    /// Rename an external function symbol in place — used by known-symbol
    /// interception (`memset` -> `__fslice_memset`, etc.) without disturbing
    /// any `ExtFuncRef` already held by call instructions.
    pub fn rename_ext_func(&mut self, func: ExtFuncRef, new_name: impl Into<String>) {
        self.ext_funcs[func].name = new_name.into();
    }

    pub fn ext_funcs(&self) -> impl Iterator<Item = (ExtFuncRef, &str)> {
        self.ext_funcs.iter().map(|(r, d)| (r, d.name.as_str()))
    }
}
