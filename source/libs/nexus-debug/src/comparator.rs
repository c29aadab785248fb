// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Bit layout of the data and instruction address comparator registers.
//!
//! Data comparator: doubleword-aligned address in the upper bits, then
//! `TRANSLATED | WRITE | READ` in bits 2..0. Instruction comparator: word-aligned
//! address, `ENABLED` in bit 1. A value of zero disables either comparator.

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct DataFlags: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        /// Match translated (effective) addresses; set for every armed watch.
        const TRANSLATED = 1 << 2;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct InstructionFlags: u32 {
        const ENABLED = 1 << 1;
    }
}

/// Low address bits ignored by the data comparator.
pub const DATA_GRANULE_MASK: u32 = 0x7;
/// Low address bits ignored by the instruction comparator.
pub const INSTRUCTION_GRANULE_MASK: u32 = 0x3;

/// Raw data comparator value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DataComparator(u32);

impl DataComparator {
    pub const DISABLED: Self = Self(0);

    /// Misaligned addresses are masked down to the comparator granule.
    pub fn new(address: u32, read: bool, write: bool) -> Self {
        let mut flags = DataFlags::TRANSLATED;
        flags.set(DataFlags::READ, read);
        flags.set(DataFlags::WRITE, write);
        Self((address & !DATA_GRANULE_MASK) | flags.bits())
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn address(self) -> u32 {
        self.0 & !DATA_GRANULE_MASK
    }

    pub fn flags(self) -> DataFlags {
        DataFlags::from_bits_truncate(self.0)
    }

    /// Whether an access of the given direction at `addr` trips this comparator.
    pub fn matches(self, addr: u32, store: bool) -> bool {
        let flags = self.flags();
        let direction = if store { DataFlags::WRITE } else { DataFlags::READ };
        flags.contains(DataFlags::TRANSLATED | direction)
            && (addr & !DATA_GRANULE_MASK) == self.address()
    }
}

/// Raw instruction comparator value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InstructionComparator(u32);

impl InstructionComparator {
    pub const DISABLED: Self = Self(0);

    pub fn new(address: u32) -> Self {
        Self((address & !INSTRUCTION_GRANULE_MASK) | InstructionFlags::ENABLED.bits())
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn address(self) -> u32 {
        self.0 & !INSTRUCTION_GRANULE_MASK
    }

    pub fn matches(self, pc: u32) -> bool {
        InstructionFlags::from_bits_truncate(self.0).contains(InstructionFlags::ENABLED)
            && (pc & !INSTRUCTION_GRANULE_MASK) == self.address()
    }
}
