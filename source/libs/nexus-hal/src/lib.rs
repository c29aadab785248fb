// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Memory bus seam used by instruction emulation and drivers
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: 3 unit tests, `tests/bus.rs`

#![cfg_attr(not(test), no_std)]

/// Access width of a single bus transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Width {
    Byte,
    Half,
    Word,
}

impl Width {
    pub const fn bytes(self) -> u32 {
        match self {
            Width::Byte => 1,
            Width::Half => 2,
            Width::Word => 4,
        }
    }

    /// Truncates `value` to the bits this width transfers.
    pub const fn truncate(self, value: u32) -> u32 {
        match self {
            Width::Byte => value & 0xff,
            Width::Half => value & 0xffff,
            Width::Word => value,
        }
    }
}

/// Basic bus access trait; values are zero-extended into `u32`.
pub trait Bus {
    fn read(&self, addr: u32, width: Width) -> u32;
    fn write(&self, addr: u32, width: Width, value: u32);

    /// Fetches the instruction word at `addr`.
    fn fetch(&self, addr: u32) -> u32 {
        self.read(addr, Width::Word)
    }
}

/// Direct access to the caller's own address space.
pub struct MmioBus {
    _private: (),
}

impl MmioBus {
    /// # Safety
    /// Every address later passed to [`Bus::read`]/[`Bus::write`] must be mapped, suitably
    /// aligned for the width and valid for that access in the current address space.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl Bus for MmioBus {
    fn read(&self, addr: u32, width: Width) -> u32 {
        let addr = addr as usize;
        // SAFETY: validity of `addr` is the contract of `MmioBus::new`.
        unsafe {
            match width {
                Width::Byte => core::ptr::read_volatile(addr as *const u8) as u32,
                Width::Half => core::ptr::read_volatile(addr as *const u16) as u32,
                Width::Word => core::ptr::read_volatile(addr as *const u32),
            }
        }
    }

    fn write(&self, addr: u32, width: Width, value: u32) {
        let addr = addr as usize;
        // SAFETY: validity of `addr` is the contract of `MmioBus::new`.
        unsafe {
            match width {
                Width::Byte => core::ptr::write_volatile(addr as *mut u8, value as u8),
                Width::Half => core::ptr::write_volatile(addr as *mut u16, value as u16),
                Width::Word => core::ptr::write_volatile(addr as *mut u32, value),
            }
        }
    }
}
