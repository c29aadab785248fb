// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Saved execution context handed to exception callbacks
//! PUBLIC API: ExceptionContext, Cause, CoreId, ThreadId
//! INVARIANTS: GPR index is 0..32; callbacks only touch state through the accessors below

use bitflags::bitflags;
use core::fmt;

pub const GPR_COUNT: usize = 32;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoreId(u16);

impl CoreId {
    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_raw())
    }
}

/// Scheduler identity of a thread (the kernel's thread control block address).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(u32);

impl ThreadId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

bitflags! {
    /// Data-storage cause register bits reported with a data fault.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Cause: u32 {
        /// Translation not found.
        const NOT_MAPPED = 1 << 30;
        /// Access denied by protection.
        const PROTECTION = 1 << 27;
        /// The faulting access was a store.
        const STORE = 1 << 25;
        /// The access matched the data address comparator.
        const COMPARATOR_MATCH = 1 << 22;
    }
}

/// Register state of an interrupted (or callback) execution context.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExceptionContext {
    gpr: [u32; GPR_COUNT],
    pc: u32,
    cause: u32,
    fault_address: u32,
    core: u32,
}

impl ExceptionContext {
    pub const fn new() -> Self {
        Self {
            gpr: [0; GPR_COUNT],
            pc: 0,
            cause: 0,
            fault_address: 0,
            core: 0,
        }
    }

    #[inline]
    pub fn gpr(&self, index: usize) -> u32 {
        self.gpr[index]
    }

    #[inline]
    pub fn set_gpr(&mut self, index: usize, value: u32) {
        self.gpr[index] = value;
    }

    /// Return address: the instruction that trapped.
    #[inline]
    pub fn pc(&self) -> u32 {
        self.pc
    }

    #[inline]
    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
    }

    #[inline]
    pub fn advance_pc(&mut self) {
        self.pc = self.pc.wrapping_add(4);
    }

    #[inline]
    pub fn cause(&self) -> Cause {
        Cause::from_bits_retain(self.cause)
    }

    #[inline]
    pub fn set_cause(&mut self, cause: Cause) {
        self.cause = cause.bits();
    }

    #[inline]
    pub fn fault_address(&self) -> u32 {
        self.fault_address
    }

    #[inline]
    pub fn set_fault_address(&mut self, addr: u32) {
        self.fault_address = addr;
    }

    /// Core the context was captured on, as recorded by the kernel (may be garbage).
    #[inline]
    pub fn core_hint(&self) -> u32 {
        self.core
    }

    #[inline]
    pub fn set_core_hint(&mut self, core: u32) {
        self.core = core;
    }
}
