//! Per-function rewriting: logical-variable labeling followed by
//! per-instruction instrumentation.

use crate::error::RewriteError;
use crate::vset::{VSetArena, VSetId};
use fslice_ir::{
    BlockCall, ExtFuncRef, FuncCursor, Function, Inst, InstructionData, MemIntrinsicKind, StackSlot, Type,
    Value,
};
use log::{debug, trace};
use std::collections::{HashMap, HashSet};

/// The taint ABI's value type: an integer-pointer-sized word, wide enough
/// to hold a packed `{id, offset, is_obj}` label.
const TAINT_TY: Type = Type::Pointer;

/// Per-function statistics, rolled up into the module-wide [`crate::RewriteStats`].
#[derive(Clone, Copy, Debug, Default)]
pub struct FunctionStats {
    pub logical_variables: u32,
    pub instructions_instrumented: usize,
}

/// Owns the DSU arena and value/slot bookkeeping for one function rewrite.
/// Constructed fresh per function, discarded once that function is done.
/// Deliberately holds no reference to the [`Function`] it rewrites — every
/// method that needs one takes `func: &mut Function` as a plain parameter,
/// so a long-lived cursor never has to compete with `&mut self` for the
/// same borrow.
#[derive(Default)]
pub struct FunctionRewriter {
    arena: VSetArena,
    value_to_vset: HashMap<Value, VSetId>,
    var_slots: Vec<StackSlot>,
    runtime_funcs: HashMap<String, ExtFuncRef>,
}

impl FunctionRewriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the full per-function pass: label logical variables, allocate
    /// their shadow slots, then instrument every original instruction.
    pub fn run(&mut self, func: &mut Function) -> Result<FunctionStats, RewriteError> {
        let originals = func.layout.all_insts();
        if originals.is_empty() {
            return Ok(FunctionStats::default());
        }

        self.init_vsets(func, &originals);
        self.combine_vsets(func, &originals);
        let num_vars = self.arena.label();
        trace!("{}: {num_vars} logical variables", func.name);
        self.allocate_slots(func, num_vars);
        self.emit_prologue(func, &originals);

        let mut instrumented = 0;
        for inst in originals {
            if self.instrument(func, inst)? {
                instrumented += 1;
            }
        }
        debug!("{}: instrumented {instrumented} instructions", func.name);

        Ok(FunctionStats { logical_variables: num_vars, instructions_instrumented: instrumented })
    }

    fn is_constant(func: &Function, value: Value) -> bool {
        match func.dfg.value_def(value) {
            fslice_ir::ValueDef::Result(inst) => func.dfg.inst_data(inst).is_const(),
            fslice_ir::ValueDef::Param(..) => false,
        }
    }

    /// Whether `value` is used anywhere in `originals` — as an ordinary
    /// operand or as a block-call argument (the latter covers φ-incoming
    /// edges).
    fn used_values(func: &Function, originals: &[Inst]) -> HashSet<Value> {
        let mut used = HashSet::new();
        for &inst in originals {
            for v in func.dfg.inst_data(inst).arguments() {
                used.insert(v);
            }
        }
        used
    }

    /// Allocate one VSet per used, trackable value: every block parameter
    /// (function arguments are the entry block's parameters) and every
    /// value-producing instruction result, excluding branches, compares,
    /// constants, and floating-point values (untracked — they never get a
    /// shadow slot).
    fn init_vsets(&mut self, func: &Function, originals: &[Inst]) {
        let used = Self::used_values(func, originals);

        for block in func.layout.blocks() {
            for &param in func.dfg.block_params(block) {
                if used.contains(&param) && !func.dfg.value_type(param).is_float() {
                    let vset = self.arena.make_node(true);
                    self.value_to_vset.insert(param, vset);
                }
            }
        }

        for &inst in originals {
            let data = func.dfg.inst_data(inst);
            if data.is_branch_or_compare() || data.is_store_or_return() || data.is_const() {
                continue;
            }
            if let Some(result) = func.dfg.inst_result(inst) {
                if used.contains(&result) && !func.dfg.value_type(result).is_float() {
                    let vset = self.arena.make_node(true);
                    self.value_to_vset.insert(result, vset);
                }
            }
        }
    }

    /// Union each φ-join: a jump/branch's block-call arguments with the
    /// destination block's parameters, for every non-constant argument.
    fn combine_vsets(&mut self, func: &Function, originals: &[Inst]) {
        for &inst in originals {
            match func.dfg.inst_data(inst) {
                InstructionData::Jump { to } => self.combine_block_call(func, to),
                InstructionData::Brif { then, else_, .. } => {
                    self.combine_block_call(func, then);
                    self.combine_block_call(func, else_);
                }
                _ => {}
            }
        }
    }

    fn combine_block_call(&mut self, func: &Function, call: &BlockCall) {
        let params = func.dfg.block_params(call.block);
        for (&param, &arg) in params.iter().zip(call.args.iter()) {
            if Self::is_constant(func, arg) {
                continue;
            }
            if let (Some(&pv), Some(&av)) = (self.value_to_vset.get(&param), self.value_to_vset.get(&arg)) {
                self.arena.union(pv, av);
            }
        }
    }

    fn allocate_slots(&mut self, func: &mut Function, num_vars: u32) {
        self.var_slots = (0..num_vars).map(|_| func.create_stack_slot(TAINT_TY.bytes())).collect();
    }

    fn slot_of(&mut self, value: Value) -> Option<StackSlot> {
        let vset = *self.value_to_vset.get(&value)?;
        let idx = self.arena.index_of(vset);
        Some(self.var_slots[idx as usize])
    }

    /// Insert a void instruction immediately before `before`, via the same
    /// cursor the IR crate exposes for exactly this insertion discipline:
    /// every inserted instruction lands immediately before the original
    /// instruction it instruments.
    fn insert(func: &mut Function, before: Inst, data: InstructionData) -> Inst {
        FuncCursor::before(func, before).ins(data)
    }

    fn insert_result(func: &mut Function, before: Inst, data: InstructionData, ty: Type) -> Value {
        FuncCursor::before(func, before).ins_result(data, ty).1
    }

    /// Zero-initialize every shadow slot, once, before the function's first
    /// original instruction.
    fn emit_prologue(&mut self, func: &mut Function, originals: &[Inst]) {
        let first = originals[0];
        for &slot in &self.var_slots {
            let addr = Self::insert_result(func, first, InstructionData::StackAddr { slot }, Type::Pointer);
            let zero = Self::insert_result(func, first, InstructionData::IConst { value: 0, ty: TAINT_TY }, TAINT_TY);
            Self::insert(func, first, InstructionData::Store { ptr: addr, value: zero });
        }
    }

    fn ext_func(&mut self, func: &mut Function, name: &str) -> ExtFuncRef {
        if let Some(&f) = self.runtime_funcs.get(name) {
            return f;
        }
        let f = func.dfg.declare_ext_func(name);
        self.runtime_funcs.insert(name.to_string(), f);
        f
    }

    /// Load the current taint of `value` just before `before`: from its
    /// shadow slot if it has one, otherwise intern it as a constant (zero-
    /// extending narrower integers first), otherwise the untainted
    /// sentinel for floats and other untracked types.
    fn read_taint(&mut self, func: &mut Function, before: Inst, value: Value) -> Value {
        if let Some(slot) = self.slot_of(value) {
            let addr = Self::insert_result(func, before, InstructionData::StackAddr { slot }, Type::Pointer);
            return Self::insert_result(func, before, InstructionData::Load { ptr: addr, ty: TAINT_TY }, TAINT_TY);
        }

        let ty = func.dfg.value_type(value);
        if ty.is_float() {
            return Self::insert_result(func, before, InstructionData::IConst { value: 0, ty: TAINT_TY }, TAINT_TY);
        }

        let widened = if ty.bytes() < TAINT_TY.bytes() {
            Self::insert_result(func, before, InstructionData::Cast { arg: value, ty: TAINT_TY }, TAINT_TY)
        } else {
            value
        };
        let value_fn = self.ext_func(func, "__fslice_value");
        Self::insert_result(
            func,
            before,
            InstructionData::Call { func: value_fn, args: [widened].into_iter().collect(), result_ty: Some(TAINT_TY) },
            TAINT_TY,
        )
    }

    fn store_taint(&mut self, func: &mut Function, before: Inst, value: Value, taint: Value) {
        if let Some(slot) = self.slot_of(value) {
            let addr = Self::insert_result(func, before, InstructionData::StackAddr { slot }, Type::Pointer);
            Self::insert(func, before, InstructionData::Store { ptr: addr, value: taint });
        }
    }

    /// Cast a pointer-typed value to the runtime's `uintptr` operand type —
    /// a distinct IR value even though the two types share a representation
    /// in this IR, matching the explicit ptrtoint step a real front end
    /// would require.
    fn as_uintptr(func: &mut Function, before: Inst, ptr: Value) -> Value {
        Self::insert_result(func, before, InstructionData::Cast { arg: ptr, ty: Type::Pointer }, Type::Pointer)
    }

    /// Instrument one original instruction. Returns whether any
    /// instrumentation was actually inserted (constants, branches, and
    /// compares get none).
    fn instrument(&mut self, func: &mut Function, inst: Inst) -> Result<bool, RewriteError> {
        let data = func.dfg.inst_data(inst).clone();
        match data {
            InstructionData::Load { ptr, ty } => {
                self.require_pointer(func, inst, ptr)?;
                let result = func.dfg.inst_result(inst);
                let size = ty.bytes();
                let load_fn = self.ext_func(func, &format!("__fslice_load{size}"));
                let addr = Self::as_uintptr(func, inst, ptr);
                let taint = Self::insert_result(
                    func,
                    inst,
                    InstructionData::Call { func: load_fn, args: [addr].into_iter().collect(), result_ty: Some(TAINT_TY) },
                    TAINT_TY,
                );
                if let Some(result) = result {
                    self.store_taint(func, inst, result, taint);
                }
                Ok(true)
            }

            InstructionData::Store { ptr, value } => {
                self.require_pointer(func, inst, ptr)?;
                let size = func.dfg.value_type(value).bytes();
                let store_fn = self.ext_func(func, &format!("__fslice_store{size}"));
                let taint = self.read_taint(func, inst, value);
                let addr = Self::as_uintptr(func, inst, ptr);
                Self::insert(
                    func,
                    inst,
                    InstructionData::Call { func: store_fn, args: [addr, taint].into_iter().collect(), result_ty: None },
                );
                Ok(true)
            }

            InstructionData::Binary { op, lhs, rhs, .. } => {
                // Skip if the result has no shadow slot (float-typed or
                // dead): no consumer can ever read this op's taint, so
                // don't even call `__fslice_op2` — unlike Load/Store, the
                // call here has no side effect worth keeping other than the
                // value it produces.
                let Some(result) = func.dfg.inst_result(inst) else {
                    return Ok(false);
                };
                if self.slot_of(result).is_none() {
                    return Ok(false);
                }
                let op2_fn = self.ext_func(func, "__fslice_op2");
                let t1 = self.read_taint(func, inst, lhs);
                let t2 = self.read_taint(func, inst, rhs);
                let op_name = Self::insert_result(func, inst, InstructionData::OpName { op }, Type::Pointer);
                let taint = Self::insert_result(
                    func,
                    inst,
                    InstructionData::Call {
                        func: op2_fn,
                        args: [op_name, t1, t2].into_iter().collect(),
                        result_ty: Some(TAINT_TY),
                    },
                    TAINT_TY,
                );
                self.store_taint(func, inst, result, taint);
                Ok(true)
            }

            InstructionData::Cast { arg, .. } => {
                let result = func.dfg.inst_result(inst);
                let taint = self.read_taint(func, inst, arg);
                if let Some(result) = result {
                    self.store_taint(func, inst, result, taint);
                }
                Ok(true)
            }

            InstructionData::Call { args, .. } => {
                let store_arg_fn = self.ext_func(func, "__fslice_store_arg");
                for (i, arg) in args.iter().enumerate() {
                    let taint = self.read_taint(func, inst, *arg);
                    let idx = Self::insert_result(func, inst, InstructionData::IConst { value: i as i64, ty: Type::Pointer }, Type::Pointer);
                    Self::insert(
                        func,
                        inst,
                        InstructionData::Call {
                            func: store_arg_fn,
                            args: [idx, taint].into_iter().collect(),
                            result_ty: None,
                        },
                    );
                }

                if let Some(result) = func.dfg.inst_result(inst) {
                    let next = func
                        .layout
                        .next_inst(inst)
                        .ok_or_else(|| RewriteError::CallHasNoSuccessor { function: func.name.clone(), inst })?;
                    let load_ret_fn = self.ext_func(func, "__fslice_load_ret");
                    let taint = Self::insert_result(
                        func,
                        next,
                        InstructionData::Call { func: load_ret_fn, args: Default::default(), result_ty: Some(TAINT_TY) },
                        TAINT_TY,
                    );
                    self.store_taint(func, next, result, taint);
                }
                Ok(true)
            }

            InstructionData::Return { value } => {
                if let Some(value) = value {
                    let store_ret_fn = self.ext_func(func, "__fslice_store_ret");
                    let taint = self.read_taint(func, inst, value);
                    Self::insert(
                        func,
                        inst,
                        InstructionData::Call { func: store_ret_fn, args: [taint].into_iter().collect(), result_ty: None },
                    );
                    Ok(true)
                } else {
                    Ok(false)
                }
            }

            InstructionData::MemIntrinsic { kind, dst, src_or_val, len } => {
                let name = match kind {
                    MemIntrinsicKind::Memset => "__fslice_memset",
                    MemIntrinsicKind::Memcpy => "__fslice_memcpy",
                    MemIntrinsicKind::Memmove => "__fslice_memmove",
                };
                let runtime_fn = self.ext_func(func, name);
                let operand = if kind == MemIntrinsicKind::Memset {
                    let ty = func.dfg.value_type(src_or_val);
                    if ty.bytes() < Type::Int(32).bytes() {
                        Self::insert_result(func, inst, InstructionData::Cast { arg: src_or_val, ty: Type::Int(32) }, Type::Int(32))
                    } else {
                        src_or_val
                    }
                } else {
                    Self::as_uintptr(func, inst, src_or_val)
                };
                Self::insert_result(
                    func,
                    inst,
                    InstructionData::Call {
                        func: runtime_fn,
                        args: [dst, operand, len].into_iter().collect(),
                        result_ty: Some(Type::Pointer),
                    },
                    Type::Pointer,
                );
                func.layout.remove_inst(inst);
                Ok(true)
            }

            InstructionData::Jump { .. }
            | InstructionData::Brif { .. }
            | InstructionData::Icmp { .. }
            | InstructionData::IConst { .. }
            | InstructionData::StackAddr { .. }
            | InstructionData::OpName { .. } => Ok(false),
        }
    }

    fn require_pointer(&self, func: &Function, inst: Inst, value: Value) -> Result<(), RewriteError> {
        let ty = func.dfg.value_type(value);
        if ty == Type::Pointer {
            Ok(())
        } else {
            Err(RewriteError::NotAPointer { inst, found: ty })
        }
    }
}
