//! Instruction representation.
//!
//! Deliberately small: only the instruction classes `fslice-rewriter` needs
//! to recognize are represented. A real front end's IR has many more
//! (vector ops, exception handling, atomics, ...); those are exactly the
//! "unknown instructions are silently passed through uninstrumented" case
//! and have no representation here because this crate models the
//! rewriter's *input contract*, not a general-purpose compiler IR.

use crate::entities::{Block, StackSlot, Type, Value};
use smallvec::SmallVec;
use std::fmt;

/// A small inline vector of block-call arguments or call arguments —
/// most instructions in practice have 0-4 operands, so this avoids a heap
/// allocation for the common case (same rationale `cranelift-codegen` gives
/// for using `SmallVec` in its own instruction operand storage).
pub type ValueList = SmallVec<[Value; 4]>;

/// One incoming edge of a block-parameter join: the block-argument-form
/// equivalent of an SSA phi-node incoming pair `(value, predecessor)`.
#[derive(Clone, Debug)]
pub struct BlockCall {
    pub block: Block,
    pub args: ValueList,
}

/// The operator mnemonic carried by a [`InstructionData::Binary`]
/// instruction, interned as a `&'static str` ("per-operator cache keyed by
/// interned string... define equality on byte content").
pub type BinOp = &'static str;

/// The payload of a single instruction.
///
/// Every variant that produces a result value is captured at the call site
/// as a `Some(Value)` result recorded in [`crate::dfg::DataFlowGraph`];
/// `InstructionData` itself only describes operands, not results, mirroring
/// `cranelift-codegen`'s split between instruction data and result lists.
#[derive(Clone, Debug)]
pub enum InstructionData {
    /// `L = *P` — a load through a pointer-typed operand.
    Load { ptr: Value, ty: Type },
    /// `*P = V` — a store through a pointer-typed operand.
    Store { ptr: Value, value: Value },
    /// `R = V1 op V2` — a binary arithmetic or logical operator.
    Binary { op: BinOp, lhs: Value, rhs: Value, ty: Type },
    /// A unary cast (zext/sext/trunc/bitcast/ptrtoint/inttoptr): taint
    /// propagates unchanged through it.
    Cast { arg: Value, ty: Type },
    /// `R = f(a_0..a_{k-1})`. `result_ty` is `None` for a void call.
    Call { func: ExtFuncRef, args: ValueList, result_ty: Option<Type> },
    /// `return V` or a bare `return`.
    Return { value: Option<Value> },
    /// An unconditional jump carrying block-parameter arguments — the
    /// phi-join mechanism. Not itself instrumented (branches are excluded
    /// from `tracks_value`), but its `BlockCall` feeds the DSU union pass.
    Jump { to: BlockCall },
    /// A conditional branch. Like `Jump`, contributes incoming values to
    /// the DSU pass but is never itself a logical variable.
    Brif { cond: Value, then: BlockCall, else_: BlockCall },
    /// An integer or boolean comparison. Excluded from `tracks_value`
    /// ("not a branch, invoke, or compare").
    Icmp { cc: &'static str, lhs: Value, rhs: Value },
    /// A compile-time integer constant.
    IConst { value: i64, ty: Type },
    /// `memset`/`memcpy`/`memmove`, recognized *before* generic `Call`
    /// handling so the rewriter can rewrite/delete it rather than
    /// instrument it as an ordinary call.
    MemIntrinsic { kind: MemIntrinsicKind, dst: Value, src_or_val: Value, len: Value },
    /// `R = &ss` — the address of a function-local stack slot. Only ever
    /// introduced by the rewriter itself, to address a logical variable's
    /// shadow storage; never produced by a front end and never instrumented.
    StackAddr { slot: StackSlot },
    /// `R = &"op"` — a reference to an interned operator-name string. Only
    /// ever introduced by the rewriter, to supply the `const char *op`
    /// argument of a `__fslice_op2` call.
    OpName { op: BinOp },
}

/// Which libc memory primitive a [`InstructionData::MemIntrinsic`] denotes.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum MemIntrinsicKind {
    Memset,
    Memcpy,
    Memmove,
}

/// An opaque reference to an external function symbol (e.g. `malloc`, a
/// user-defined callee). Known-symbol interception renames the
/// [`ExtFuncData::name`] this refers to.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExtFuncRef(u32);
cranelift_entity::entity_impl!(ExtFuncRef, "fn");

/// Declaration of an external (possibly later-defined) function.
#[derive(Clone, Debug)]
pub struct ExtFuncData {
    pub name: String,
}

impl InstructionData {
    /// Operands read by this instruction, in the IR's native order.
    pub fn arguments(&self) -> ValueList {
        match self {
            InstructionData::Load { ptr, .. } => SmallVec::from_slice(&[*ptr]),
            InstructionData::Store { ptr, value } => SmallVec::from_slice(&[*ptr, *value]),
            InstructionData::Binary { lhs, rhs, .. } => SmallVec::from_slice(&[*lhs, *rhs]),
            InstructionData::Cast { arg, .. } => SmallVec::from_slice(&[*arg]),
            InstructionData::Call { args, .. } => args.clone(),
            InstructionData::Return { value } => value.into_iter().copied().collect(),
            InstructionData::Jump { to } => to.args.clone(),
            InstructionData::Brif { cond, then, else_ } => {
                let mut v = SmallVec::from_slice(&[*cond]);
                v.extend(then.args.iter().copied());
                v.extend(else_.args.iter().copied());
                v
            }
            InstructionData::Icmp { lhs, rhs, .. } => SmallVec::from_slice(&[*lhs, *rhs]),
            InstructionData::IConst { .. } => SmallVec::new(),
            InstructionData::MemIntrinsic { dst, src_or_val, len, .. } => {
                SmallVec::from_slice(&[*dst, *src_or_val, *len])
            }
            InstructionData::StackAddr { .. } => SmallVec::new(),
            InstructionData::OpName { .. } => SmallVec::new(),
        }
    }

    /// True for instructions excluded from `tracks_value` regardless of use
    /// count: branches and compares.
    pub fn is_branch_or_compare(&self) -> bool {
        matches!(
            self,
            InstructionData::Jump { .. } | InstructionData::Brif { .. } | InstructionData::Icmp { .. }
        )
    }

    /// True for instructions that are sinks rather than logical-variable
    /// producers even if used ("excluding stores and returns").
    pub fn is_store_or_return(&self) -> bool {
        matches!(self, InstructionData::Store { .. } | InstructionData::Return { .. })
    }

    /// True for compile-time constants: these never get a logical variable
    /// of their own, regardless of use count (the rewriter interns their
    /// taint on demand at each use instead of giving them a shadow slot).
    pub fn is_const(&self) -> bool {
        matches!(self, InstructionData::IConst { .. })
    }

    /// Name this instruction by what it denotes, for pretty-printing.
    pub fn opcode(&self) -> Opcode {
        match self {
            InstructionData::Load { .. } => Opcode::Load,
            InstructionData::Store { .. } => Opcode::Store,
            InstructionData::Binary { .. } => Opcode::Binary,
            InstructionData::Cast { .. } => Opcode::Cast,
            InstructionData::Call { .. } => Opcode::Call,
            InstructionData::Return { .. } => Opcode::Return,
            InstructionData::Jump { .. } => Opcode::Jump,
            InstructionData::Brif { .. } => Opcode::Brif,
            InstructionData::Icmp { .. } => Opcode::Icmp,
            InstructionData::IConst { .. } => Opcode::IConst,
            InstructionData::MemIntrinsic { .. } => Opcode::MemIntrinsic,
            InstructionData::StackAddr { .. } => Opcode::StackAddr,
            InstructionData::OpName { .. } => Opcode::OpName,
        }
    }
}

impl fmt::Display for InstructionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstructionData::Load { ptr, ty } => write!(f, "load.{ty} {ptr}"),
            InstructionData::Store { ptr, value } => write!(f, "store {value}, {ptr}"),
            InstructionData::Binary { op, lhs, rhs, ty } => write!(f, "{op}.{ty} {lhs}, {rhs}"),
            InstructionData::Cast { arg, ty } => write!(f, "cast.{ty} {arg}"),
            InstructionData::Call { args, .. } => {
                write!(f, "call(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            InstructionData::Return { value } => match value {
                Some(v) => write!(f, "return {v}"),
                None => write!(f, "return"),
            },
            InstructionData::Jump { to } => write!(f, "jump {}", to.block),
            InstructionData::Brif { cond, then, else_ } => {
                write!(f, "brif {cond}, {}, {}", then.block, else_.block)
            }
            InstructionData::Icmp { cc, lhs, rhs } => write!(f, "icmp.{cc} {lhs}, {rhs}"),
            InstructionData::IConst { value, ty } => write!(f, "iconst.{ty} {value}"),
            InstructionData::MemIntrinsic { kind, dst, src_or_val, len } => {
                write!(f, "{kind:?} {dst}, {src_or_val}, {len}")
            }
            InstructionData::StackAddr { slot } => write!(f, "stack_addr {slot}"),
            InstructionData::OpName { op } => write!(f, "opname(\"{op}\")"),
        }
    }
}

/// Names an instruction's class without carrying its operands — mirrors
/// `cranelift-codegen`'s `Opcode` enum, trimmed to this IR's instruction set.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Opcode {
    Load,
    Store,
    Binary,
    Cast,
    Call,
    Return,
    Jump,
    Brif,
    Icmp,
    IConst,
    MemIntrinsic,
    StackAddr,
    OpName,
}
