// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Per-core exception dispatcher layered onto the kernel exception chain
//! OWNERS: @kernel-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: `tests/dispatch.rs` (reentrancy, cross-core, fatal paths, chaining)
//! PUBLIC API: ExceptionDispatcher::{new, initialize, teardown, set_callback, dispatch}
//! INVARIANTS:
//!   - at most one callback runs per core; the in-handler flag is only taken by CAS and a
//!     lost CAS returns immediately (spinning in trap context can wedge the core)
//!   - the flag is released before the interrupted context is resumed
//!   - an unhandled or failed vector terminates the process, it is never ignored
//!   - callback lookup is lock-free; a registration is only dereferenced by the holder of
//!     the slot flag, so replaced registrations are retired and freed once every slot
//!     flag can be taken (at teardown) or when the dispatcher is dropped

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::UnsafeCell;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

use spin::Mutex;

use crate::config::{DispatcherConfig, FAULT_STACK_SIZE, MAX_CORES};
use crate::context::{CoreId, ExceptionContext};
use crate::error::{Error, Result};
use crate::platform::{ChainEntry, ExceptionSink, Platform};
use crate::vector::Vector;

/// Handler for one exception vector. Returning `false` escalates to a fatal error.
pub trait ExceptionCallback: Send + Sync {
    fn handle(&self, interrupted: &mut ExceptionContext) -> bool;
}

impl<F> ExceptionCallback for F
where
    F: Fn(&mut ExceptionContext) -> bool + Send + Sync,
{
    fn handle(&self, interrupted: &mut ExceptionContext) -> bool {
        self(interrupted)
    }
}

struct Registration {
    callback: Arc<dyn ExceptionCallback>,
}

/// Registration pointer swapped out of a slot; freed when the dispatcher is dropped.
struct Retired(NonNull<Registration>);

// SAFETY: the pointee is only read through shared references and is `Send + Sync`.
unsafe impl Send for Retired {}

#[repr(C, align(16))]
struct FaultStack([u8; FAULT_STACK_SIZE]);

struct ExceptionSlot {
    in_handler: AtomicBool,
    context: UnsafeCell<ExceptionContext>,
    stack: Box<FaultStack>,
    callbacks: [AtomicPtr<Registration>; Vector::COUNT],
    chain: Mutex<[Option<ChainEntry>; Vector::COUNT]>,
}

// SAFETY: `context` is only touched by the holder of `in_handler`.
unsafe impl Sync for ExceptionSlot {}

impl ExceptionSlot {
    fn new() -> Self {
        Self {
            in_handler: AtomicBool::new(false),
            context: UnsafeCell::new(ExceptionContext::new()),
            stack: Box::new(FaultStack([0; FAULT_STACK_SIZE])),
            callbacks: [const { AtomicPtr::new(ptr::null_mut()) }; Vector::COUNT],
            chain: Mutex::new([const { None }; Vector::COUNT]),
        }
    }

    fn stack_top(&self) -> usize {
        self.stack.0.as_ptr() as usize + FAULT_STACK_SIZE
    }

    fn try_enter(&self) -> Option<HandlerGuard<'_>> {
        self.in_handler
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| HandlerGuard { slot: self })
    }

    fn callback(&self, vector: Vector) -> Option<&dyn ExceptionCallback> {
        let raw = self.callbacks[vector.ordinal()].load(Ordering::Acquire);
        // SAFETY: called with the slot flag held; registrations are only freed while every
        // slot flag is taken or from `Drop`.
        unsafe { raw.as_ref() }.map(|reg| reg.callback.as_ref())
    }
}

/// Ownership of a slot's in-handler state; dropping it returns the slot to idle.
struct HandlerGuard<'a> {
    slot: &'a ExceptionSlot,
}

impl HandlerGuard<'_> {
    /// Callback execution context of the owning slot.
    fn context(&mut self) -> &mut ExceptionContext {
        // SAFETY: the guard is the unique holder of `in_handler` for this slot.
        unsafe { &mut *self.slot.context.get() }
    }
}

impl Drop for HandlerGuard<'_> {
    fn drop(&mut self) {
        self.slot.in_handler.store(false, Ordering::Release);
    }
}

/// Process-wide exception dispatcher with one slot per core.
pub struct ExceptionDispatcher<P: Platform> {
    platform: Arc<P>,
    slots: Vec<ExceptionSlot>,
    installed: AtomicBool,
    dropped: AtomicUsize,
    retired: Mutex<Vec<Retired>>,
}

impl<P: Platform> ExceptionDispatcher<P> {
    /// Allocates fault stacks and context records for `config.cores` cores.
    pub fn new(platform: Arc<P>, config: DispatcherConfig) -> Result<Self> {
        if config.cores == 0 || config.cores > MAX_CORES {
            return Err(Error::InvalidCoreCount { cores: config.cores, max: MAX_CORES });
        }
        Ok(Self {
            platform,
            slots: (0..config.cores).map(|_| ExceptionSlot::new()).collect(),
            installed: AtomicBool::new(false),
            dropped: AtomicUsize::new(0),
            retired: Mutex::new(Vec::new()),
        })
    }

    pub fn cores(&self) -> usize {
        self.slots.len()
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    /// Faults discarded because their core was already inside a callback.
    pub fn dropped_faults(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Installs the dispatcher on every managed vector of every core, keeping the
    /// replaced chain entries for [`Self::teardown`].
    pub fn initialize(self: &Arc<Self>) -> Result<()> {
        if self.installed.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyInitialized);
        }
        for idx in 0..self.slots.len() {
            let core = CoreId::from_raw(idx as u16);
            self.platform.run_on_core(core, &mut || self.install_on(core));
        }
        log::info!(
            "nexus-debug: dispatcher installed on {} core(s), {} vector(s) each",
            self.slots.len(),
            Vector::MANAGED.len()
        );
        Ok(())
    }

    fn install_on(self: &Arc<Self>, core: CoreId) {
        let slot = &self.slots[core.as_index()];
        let sink: Arc<dyn ExceptionSink> = self.clone();
        let mut chain = slot.chain.lock();
        for vector in Vector::MANAGED {
            let entry = ChainEntry { sink: Arc::clone(&sink), stack_top: slot.stack_top() };
            chain[vector.ordinal()] = self.platform.swap_vector(core, vector, Some(entry));
        }
    }

    /// Puts back the chain entries that were active before [`Self::initialize`].
    pub fn teardown(&self) -> Result<()> {
        if !self.installed.swap(false, Ordering::AcqRel) {
            return Err(Error::NotInitialized);
        }
        for (idx, slot) in self.slots.iter().enumerate() {
            let core = CoreId::from_raw(idx as u16);
            self.platform.run_on_core(core, &mut || {
                let mut chain = slot.chain.lock();
                for vector in Vector::MANAGED {
                    let previous = chain[vector.ordinal()].take();
                    self.platform.swap_vector(core, vector, previous);
                }
            });
        }
        let freed = self.reclaim_retired();
        log::info!(
            "nexus-debug: dispatcher removed, previous handlers restored ({} retired callback(s) freed)",
            freed
        );
        Ok(())
    }

    /// Frees retired registrations when no slot is inside a callback. Holding every
    /// slot flag keeps new faults from reaching a registration while they are freed.
    fn reclaim_retired(&self) -> usize {
        let guards: Vec<HandlerGuard<'_>> = self.slots.iter().filter_map(ExceptionSlot::try_enter).collect();
        if guards.len() != self.slots.len() {
            return 0;
        }
        let retired = core::mem::take(&mut *self.retired.lock());
        let freed = retired.len();
        for reg in retired {
            // SAFETY: retired pointers came from `Box::into_raw`, are no longer reachable
            // from any callback table and no slot is running a callback.
            drop(unsafe { Box::from_raw(reg.0.as_ptr()) });
        }
        drop(guards);
        freed
    }

    /// Registers `callback` for `vector` on every core, replacing any earlier one.
    pub fn set_callback<C>(&self, vector: Vector, callback: C)
    where
        C: ExceptionCallback + 'static,
    {
        let callback: Arc<dyn ExceptionCallback> = Arc::new(callback);
        let mut retired = self.retired.lock();
        for slot in &self.slots {
            let fresh = Box::into_raw(Box::new(Registration { callback: Arc::clone(&callback) }));
            let old = slot.callbacks[vector.ordinal()].swap(fresh, Ordering::AcqRel);
            if let Some(old) = NonNull::new(old) {
                retired.push(Retired(old));
            }
        }
        log::debug!("nexus-debug: callback registered for {}", vector);
    }

    pub fn callback_registered(&self, vector: Vector) -> bool {
        self.slots
            .iter()
            .all(|slot| !slot.callbacks[vector.ordinal()].load(Ordering::Acquire).is_null())
    }

    fn slot_index(&self, interrupted: &ExceptionContext) -> usize {
        let hint = interrupted.core_hint() as usize;
        if hint < self.slots.len() {
            hint
        } else {
            self.platform.current_core().as_index()
        }
    }

    /// Trampoline body: runs the callback registered for `vector` against `interrupted`.
    pub fn dispatch(&self, vector: Vector, interrupted: &mut ExceptionContext) {
        let idx = self.slot_index(interrupted);
        let Some(slot) = self.slots.get(idx) else {
            self.platform.fatal(format_args!("{} Exception occurred on unmanaged core {}", vector, idx));
        };
        let Some(mut guard) = slot.try_enter() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        self.platform.set_current_context(guard.context());

        let handled = match slot.callback(vector) {
            Some(callback) => callback.handle(interrupted),
            None => false,
        };
        drop(guard);

        if handled {
            self.platform.resume(interrupted);
            return;
        }
        self.platform.fatal(format_args!("{} Exception occurred", vector));
    }
}

impl<P: Platform> ExceptionSink for ExceptionDispatcher<P> {
    fn on_exception(&self, vector: Vector, interrupted: &mut ExceptionContext) {
        self.dispatch(vector, interrupted);
    }
}

impl<P: Platform> Drop for ExceptionDispatcher<P> {
    fn drop(&mut self) {
        let live = self
            .slots
            .iter()
            .flat_map(|slot| slot.callbacks.iter())
            .filter_map(|cell| NonNull::new(cell.swap(ptr::null_mut(), Ordering::AcqRel)));
        let retired = core::mem::take(&mut *self.retired.lock());
        for reg in live.chain(retired.into_iter().map(|r| r.0)) {
            // SAFETY: every pointer came from `Box::into_raw` and `&mut self` proves no
            // trap is still reading it.
            drop(unsafe { Box::from_raw(reg.as_ptr()) });
        }
    }
}
