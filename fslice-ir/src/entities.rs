//! Opaque entity references used throughout the IR.
//!
//! Instructions, blocks, and values are never referenced by Rust pointer or
//! index directly; each gets its own newtype wrapping a `u32` index into a
//! table owned by [`crate::function::Function`]. This keeps references
//! `Copy`, small, and impossible to confuse with one another at compile
//! time, following the same scheme `cranelift-entity` uses for its own
//! `Block`/`Inst`/`Value` references.

use cranelift_entity::entity_impl;
use std::fmt;

/// A reference to a basic block.
///
/// Order of creation is stable but arbitrary; it need not match layout
/// order (see [`crate::layout::Layout`]).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// A reference to an SSA value: either an instruction result or a block
/// parameter (the latter standing in for what a textual phi-node would be
/// in a non-block-argument SSA form — see [`crate::instructions::InstructionData::Jump`]).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(u32);
entity_impl!(Value, "v");

/// A reference to an instruction.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inst(u32);
entity_impl!(Inst, "inst");

/// A reference to a function-local stack slot, used by the rewriter to
/// give each logical variable a home for its shadow taint value.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StackSlot(u32);
entity_impl!(StackSlot, "ss");

/// A scalar or pointer type wide enough to describe every value this IR
/// tracks. Only the handful of widths the taint rewriter instruments
/// (1, 2, 4, 8, 16, 32, or 64 bytes) plus a generic pointer and a float
/// marker (untracked by the rewriter) are represented.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Type {
    /// An integer of the given bit width (8, 16, 32, 64, 128, 256, or 512).
    Int(u16),
    /// A pointer-sized integer used for addresses.
    Pointer,
    /// A floating-point value of the given bit width. Untracked by the
    /// rewriter: `tracks_value` is always false for it.
    Float(u16),
}

impl Type {
    /// Byte size of this type, used to pick the `__fslice_load<S>`/
    /// `__fslice_store<S>` instantiation.
    pub fn bytes(self) -> u32 {
        match self {
            Type::Int(bits) | Type::Float(bits) => u32::from(bits) / 8,
            Type::Pointer => 8,
        }
    }

    /// True for [`Type::Float`] — untracked.
    pub fn is_float(self) -> bool {
        matches!(self, Type::Float(_))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int(bits) => write!(f, "i{bits}"),
            Type::Pointer => write!(f, "ptr"),
            Type::Float(bits) => write!(f, "f{bits}"),
        }
    }
}
