// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Seam between the debug facility and the host kernel
//! OWNERS: @kernel-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Exercised through the simulated platform in `tests/support`
//! DEPENDS_ON: nexus_hal::Bus (memory access during emulation)
//! INVARIANTS:
//!   - vector entries and the switch hook are swapped, never overwritten blindly: the
//!     previous value is always handed back so it can be restored
//!   - comparator writes target the core the caller is running on

use alloc::sync::Arc;
use core::fmt;

use nexus_hal::Bus;

use crate::context::{CoreId, ExceptionContext, ThreadId};
use crate::vector::Vector;

/// Receiver of a kernel exception vector; the kernel calls it on the faulting core.
pub trait ExceptionSink: Send + Sync {
    fn on_exception(&self, vector: Vector, interrupted: &mut ExceptionContext);
}

/// Receiver of scheduler thread-switch notifications.
pub trait SwitchHook: Send + Sync {
    /// Called on the core that is about to run `thread`.
    fn on_switch(&self, thread: ThreadId);
}

/// One link of a kernel exception chain.
#[derive(Clone)]
pub struct ChainEntry {
    pub sink: Arc<dyn ExceptionSink>,
    /// Top of the stack the kernel switches to before calling `sink`.
    pub stack_top: usize,
}

impl fmt::Debug for ChainEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainEntry")
            .field("stack_top", &format_args!("{:#x}", self.stack_top))
            .finish_non_exhaustive()
    }
}

/// Kernel services consumed by the dispatcher and the watchpoint manager.
pub trait Platform: Bus + Send + Sync + 'static {
    /// Number of cores the scheduler runs threads on.
    fn core_count(&self) -> usize;

    /// Core the caller is executing on.
    fn current_core(&self) -> CoreId;

    /// Runs `job` on a thread pinned to `core` and waits for it to finish.
    fn run_on_core(&self, core: CoreId, job: &mut dyn FnMut());

    /// Installs `entry` for `vector` on `core`, returning the entry it replaces.
    fn swap_vector(
        &self,
        core: CoreId,
        vector: Vector,
        entry: Option<ChainEntry>,
    ) -> Option<ChainEntry>;

    /// Makes `context` the current context of the running core while a callback executes.
    fn set_current_context(&self, context: &mut ExceptionContext);

    /// Loads `context` and continues it. On hardware this does not return to the caller.
    fn resume(&self, context: &mut ExceptionContext);

    /// Terminates the process with a diagnostic.
    fn fatal(&self, reason: fmt::Arguments<'_>) -> !;

    /// Programs the data address comparator of the running core.
    fn write_data_comparator(&self, value: u32);

    /// Programs the instruction address comparator of the running core.
    fn write_instruction_comparator(&self, value: u32);

    /// Replaces the global thread-switch hook, returning the previous one.
    fn swap_switch_hook(&self, hook: Option<Arc<dyn SwitchHook>>) -> Option<Arc<dyn SwitchHook>>;
}
