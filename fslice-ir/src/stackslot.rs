//! Stack slots.
//!
//! A function-local chunk of stack memory addressed by
//! [`crate::instructions::InstructionData::StackAddr`]. The only producer of
//! these in this workspace is the taint rewriter, which allocates one slot
//! per logical variable to hold its shadow taint value across the function.

use crate::entities::StackSlot;
use cranelift_entity::PrimaryMap;
use std::fmt;

/// Size in bytes of a stack slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StackSlotData {
    pub size: u32,
}

impl StackSlotData {
    pub fn new(size: u32) -> Self {
        StackSlotData { size }
    }
}

impl fmt::Display for StackSlotData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "explicit_slot {}", self.size)
    }
}

pub type StackSlots = PrimaryMap<StackSlot, StackSlotData>;
