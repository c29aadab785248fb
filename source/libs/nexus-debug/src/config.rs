// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Static sizing of the debug facility.

use static_assertions::const_assert;

use crate::platform::Platform;

/// Upper bound on cores the dispatcher keeps exception slots for.
pub const MAX_CORES: usize = 3;

/// Bytes of dedicated stack per core used while a callback runs.
pub const FAULT_STACK_SIZE: usize = 0x1000;

/// Queued hit records per watch kind; older unconsumed hits are kept, newer ones dropped.
pub const HIT_RING_CAPACITY: usize = 64;

/// Threads whose last programmed comparator value is remembered.
pub const THREAD_CACHE_CAPACITY: usize = 32;

const_assert!(HIT_RING_CAPACITY.is_power_of_two());
const_assert!(FAULT_STACK_SIZE % 16 == 0);
const_assert!(MAX_CORES > 0 && MAX_CORES <= u16::MAX as usize);

/// Runtime parameters of [`crate::ExceptionDispatcher`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Cores to install the dispatcher on, `1..=MAX_CORES`.
    pub cores: usize,
}

impl DispatcherConfig {
    /// One slot per core the platform schedules on.
    pub fn for_platform<P: Platform + ?Sized>(platform: &P) -> Self {
        Self { cores: platform.core_count() }
    }
}
