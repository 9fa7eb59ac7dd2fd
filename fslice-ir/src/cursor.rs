//! A small cursor for splicing instructions into a function's layout.
//!
//! Trimmed from `cranelift-codegen::cursor::FuncCursor`: that cursor
//! supports inserting before *and* after an arbitrary position, walking
//! forward/backward, and several other pass idioms this crate's only
//! consumer (the taint rewriter) never needs. The rewriter has exactly one
//! insertion discipline — immediately before the instruction being
//! instrumented — so that's the only thing this cursor does.

use crate::entities::{Inst, Type, Value};
use crate::function::Function;
use crate::instructions::InstructionData;

/// A cursor fixed at a position immediately before one existing
/// instruction in a function.
pub struct FuncCursor<'f> {
    func: &'f mut Function,
    before: Inst,
}

impl<'f> FuncCursor<'f> {
    /// Create a cursor that inserts immediately before `before`.
    pub fn before(func: &'f mut Function, before: Inst) -> Self {
        FuncCursor { func, before }
    }

    /// Insert a void instruction (store, return, memory intrinsic, ...)
    /// before the cursor's target instruction.
    pub fn ins(&mut self, data: InstructionData) -> Inst {
        let inst = self.func.dfg.make_inst(data);
        self.func.layout.insert_inst_before(self.before, inst);
        inst
    }

    /// Insert an instruction that produces a result before the cursor's
    /// target instruction, returning the new value.
    pub fn ins_result(&mut self, data: InstructionData, ty: Type) -> (Inst, Value) {
        let (inst, value) = self.func.dfg.make_inst_result(data, ty);
        self.func.layout.insert_inst_before(self.before, inst);
        (inst, value)
    }

    pub fn func(&self) -> &Function {
        self.func
    }

    pub fn func_mut(&mut self) -> &mut Function {
        self.func
    }
}
