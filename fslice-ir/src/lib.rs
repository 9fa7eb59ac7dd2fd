//! A minimal typed SSA IR: the input and output contract of the FSlice
//! taint rewriter.
//!
//! This crate stands in for the "IR provider" collaborator a host compiler's
//! front end would normally supply: some front end lowers source to SSA IR
//! and hands it to the rewriter. A real
//! front end's IR is much richer than what's modeled here; this crate only
//! needs to carry the handful of instruction classes the rewriter actually
//! instruments — loads, stores, binary ops, casts, calls, returns, the
//! block-parameter form of phi-nodes, comparisons/branches (recognized but
//! never instrumented), the three `memset`/`memcpy`/`memmove` intrinsics,
//! and stack slots for the rewriter's own shadow storage.

pub mod cursor;
pub mod dfg;
pub mod entities;
pub mod function;
pub mod instructions;
pub mod layout;
pub mod module;
pub mod stackslot;

pub use cursor::FuncCursor;
pub use dfg::{DataFlowGraph, ValueDef};
pub use entities::{Block, Inst, StackSlot, Type, Value};
pub use function::{Function, Signature};
pub use instructions::{BlockCall, ExtFuncRef, InstructionData, MemIntrinsicKind, Opcode, ValueList};
pub use layout::Layout;
pub use module::Module;
pub use stackslot::StackSlotData;
