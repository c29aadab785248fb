// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Data/instruction watchpoints on top of the per-core address comparators
//! OWNERS: @kernel-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: `tests/watch.rs`, `tests/end_to_end.rs`
//! PUBLIC API: WatchpointManager::{set_data_watch, unset_data_watch, set_instruction_watch,
//!             unset_instruction_watch, consume_data_hits, consume_instruction_hits,
//!             initialize, shutdown}
//! DEPENDS_ON: nexus_sync::{RingBuffer, BoundedMap}, ExceptionDispatcher, Platform
//! INVARIANTS:
//!   - descriptors and comparator values are atomics; trap handlers and the switch hook
//!     only ever load them
//!   - hits are recorded from trap context into lock-free rings and drained by the host
//!   - reconfiguring a watch discards hits queued for the previous configuration
//!
//! The comparators are per-core registers that every thread shares, so the switch hook
//! reprograms them for the incoming thread. Each core keeps a small per-thread cache of
//! the value last written for that thread; a hit skips the register write. Every entry
//! of a core's cache equals the value its register currently holds: whenever the
//! register changes, the cache of that core is emptied. Threads that do not fit in the
//! cache are simply reprogrammed on every switch.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use nexus_sync::{BoundedMap, RingBuffer};
use spin::Mutex;

use crate::comparator::{DataComparator, InstructionComparator};
use crate::config::{HIT_RING_CAPACITY, MAX_CORES, THREAD_CACHE_CAPACITY};
use crate::context::{Cause, CoreId, ExceptionContext, ThreadId};
use crate::dispatch::ExceptionDispatcher;
use crate::emulate;
use crate::error::{Error, Result};
use crate::platform::{Platform, SwitchHook};
use crate::vector::Vector;

/// A data access that tripped the data watch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataHit {
    pub fault_address: u32,
    pub return_pc: u32,
}

/// Execution of the watched instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstructionHit {
    pub return_pc: u32,
}

/// Length of the watched data range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u32)]
pub enum WatchSize {
    Byte = 1,
    Half = 2,
    Word = 4,
    /// Full comparator granule.
    #[default]
    Double = 8,
}

impl WatchSize {
    pub const fn bytes(self) -> u32 {
        self as u32
    }
}

/// Snapshot of the configured data watch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataWatch {
    pub base_address: u32,
    pub size: u32,
    pub read: bool,
    pub write: bool,
}

/// Snapshot of the configured instruction watch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstructionWatch {
    pub address: u32,
}

const ACCESS_READ: u32 = 1 << 0;
const ACCESS_WRITE: u32 = 1 << 1;

type ThreadCache = BoundedMap<ThreadId, u32, THREAD_CACHE_CAPACITY>;

/// Last value programmed into one core's comparator and the threads known to want it.
struct ComparatorCache {
    programmed: AtomicU32,
    threads: ThreadCache,
}

impl ComparatorCache {
    const fn new() -> Self {
        Self { programmed: AtomicU32::new(0), threads: BoundedMap::new() }
    }

    /// Records that the register now holds `value`.
    fn note_write(&self, value: u32) {
        if self.programmed.swap(value, Ordering::AcqRel) != value {
            self.threads.clear();
        }
    }

    fn is_current(&self, thread: ThreadId, value: u32) -> bool {
        self.threads.try_get(&thread) == Some(value)
    }

    fn reset(&self) {
        self.programmed.store(0, Ordering::Release);
        self.threads.clear();
    }
}

/// Comparator caches of one core.
struct CoreCaches {
    data: ComparatorCache,
    instruction: ComparatorCache,
}

pub struct WatchpointManager<P: Platform> {
    platform: Arc<P>,

    data_base: AtomicU32,
    data_size: AtomicU32,
    data_access: AtomicU32,
    data_comparator: AtomicU32,

    instruction_address: AtomicU32,
    instruction_comparator: AtomicU32,

    data_hits: RingBuffer<DataHit, HIT_RING_CAPACITY>,
    instruction_hits: RingBuffer<InstructionHit, HIT_RING_CAPACITY>,

    caches: [CoreCaches; MAX_CORES],

    initialized: AtomicBool,
    previous_hook: Mutex<Option<Arc<dyn SwitchHook>>>,
}

impl<P: Platform> WatchpointManager<P> {
    pub fn new(platform: Arc<P>) -> Self {
        Self {
            platform,
            data_base: AtomicU32::new(0),
            data_size: AtomicU32::new(0),
            data_access: AtomicU32::new(0),
            data_comparator: AtomicU32::new(0),
            instruction_address: AtomicU32::new(0),
            instruction_comparator: AtomicU32::new(0),
            data_hits: RingBuffer::new(),
            instruction_hits: RingBuffer::new(),
            caches: [const {
                CoreCaches { data: ComparatorCache::new(), instruction: ComparatorCache::new() }
            }; MAX_CORES],
            initialized: AtomicBool::new(false),
            previous_hook: Mutex::new(None),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Hooks the data and breakpoint vectors and takes over the thread-switch hook.
    pub fn initialize(self: &Arc<Self>, dispatcher: &ExceptionDispatcher<P>) -> Result<()> {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyInitialized);
        }
        let this = Arc::clone(self);
        dispatcher.set_callback(Vector::Dsi, move |ctx: &mut ExceptionContext| {
            this.handle_data_fault(ctx)
        });
        let this = Arc::clone(self);
        dispatcher.set_callback(Vector::Breakpoint, move |ctx: &mut ExceptionContext| {
            this.handle_instruction_break(ctx)
        });

        let hook: Arc<dyn SwitchHook> = Arc::clone(self) as Arc<dyn SwitchHook>;
        *self.previous_hook.lock() = self.platform.swap_switch_hook(Some(hook));
        log::info!("nexus-debug: watchpoints initialized");
        Ok(())
    }

    /// Restores the previous switch hook and disarms both comparators on every core.
    pub fn shutdown(&self) -> Result<()> {
        if !self.initialized.swap(false, Ordering::AcqRel) {
            return Err(Error::NotInitialized);
        }
        let previous = self.previous_hook.lock().take();
        self.platform.swap_switch_hook(previous);

        self.unset_data_watch();
        self.unset_instruction_watch();
        for idx in 0..self.platform.core_count() {
            self.platform.run_on_core(CoreId::from_raw(idx as u16), &mut || {
                self.platform.write_data_comparator(0);
                self.platform.write_instruction_comparator(0);
            });
        }
        for caches in &self.caches {
            caches.data.reset();
            caches.instruction.reset();
        }
        log::info!("nexus-debug: watchpoints shut down");
        Ok(())
    }

    /// Watches `[address, address + size)`. The comparator itself only sees the
    /// enclosing doubleword; the exact range is enforced when recording hits.
    pub fn set_data_watch(&self, address: u32, read: bool, write: bool, size: WatchSize) {
        let comparator = DataComparator::new(address, read, write);
        let mut access = 0;
        if read {
            access |= ACCESS_READ;
        }
        if write {
            access |= ACCESS_WRITE;
        }
        self.data_base.store(address, Ordering::Release);
        self.data_size.store(size.bytes(), Ordering::Release);
        self.data_access.store(access, Ordering::Release);
        self.data_comparator.store(comparator.raw(), Ordering::Release);
        self.data_hits.clear();
        self.program_data(comparator.raw());
        log::debug!(
            "nexus-debug: data watch {:#010x}+{} r={} w={} (comparator {:#010x})",
            address,
            size.bytes(),
            read,
            write,
            comparator.raw()
        );
    }

    pub fn unset_data_watch(&self) {
        self.data_comparator.store(0, Ordering::Release);
        self.data_base.store(0, Ordering::Release);
        self.data_size.store(0, Ordering::Release);
        self.data_access.store(0, Ordering::Release);
        self.data_hits.clear();
        self.program_data(0);
        log::debug!("nexus-debug: data watch cleared");
    }

    pub fn set_instruction_watch(&self, address: u32) {
        let comparator = InstructionComparator::new(address);
        self.instruction_address.store(comparator.address(), Ordering::Release);
        self.instruction_comparator.store(comparator.raw(), Ordering::Release);
        self.instruction_hits.clear();
        self.program_instruction(comparator.raw());
        log::debug!("nexus-debug: instruction watch {:#010x}", comparator.address());
    }

    pub fn unset_instruction_watch(&self) {
        self.instruction_comparator.store(0, Ordering::Release);
        self.instruction_address.store(0, Ordering::Release);
        self.instruction_hits.clear();
        self.program_instruction(0);
        log::debug!("nexus-debug: instruction watch cleared");
    }

    pub fn data_watch(&self) -> Option<DataWatch> {
        if self.data_comparator.load(Ordering::Acquire) == 0 {
            return None;
        }
        let access = self.data_access.load(Ordering::Acquire);
        Some(DataWatch {
            base_address: self.data_base.load(Ordering::Acquire),
            size: self.data_size.load(Ordering::Acquire),
            read: access & ACCESS_READ != 0,
            write: access & ACCESS_WRITE != 0,
        })
    }

    pub fn instruction_watch(&self) -> Option<InstructionWatch> {
        if self.instruction_comparator.load(Ordering::Acquire) == 0 {
            return None;
        }
        Some(InstructionWatch { address: self.instruction_address.load(Ordering::Acquire) })
    }

    /// Drains data hits recorded since the previous call, oldest first.
    pub fn consume_data_hits(&self) -> Vec<DataHit> {
        core::iter::from_fn(|| self.data_hits.pop()).collect()
    }

    /// Drains instruction hits recorded since the previous call, oldest first.
    pub fn consume_instruction_hits(&self) -> Vec<InstructionHit> {
        core::iter::from_fn(|| self.instruction_hits.pop()).collect()
    }

    fn local_caches(&self) -> Option<&CoreCaches> {
        self.caches.get(self.platform.current_core().as_index())
    }

    /// Writes the running core's data comparator and keeps its cache coherent.
    fn program_data(&self, value: u32) {
        self.platform.write_data_comparator(value);
        if let Some(caches) = self.local_caches() {
            caches.data.note_write(value);
        }
    }

    fn program_instruction(&self, value: u32) {
        self.platform.write_instruction_comparator(value);
        if let Some(caches) = self.local_caches() {
            caches.instruction.note_write(value);
        }
    }

    fn in_data_range(&self, addr: u32) -> bool {
        let base = self.data_base.load(Ordering::Acquire);
        let size = self.data_size.load(Ordering::Acquire);
        addr.wrapping_sub(base) < size
    }

    /// DSI callback. Only comparator matches are claimed; any other data fault is left
    /// to the dispatcher's fatal path.
    pub fn handle_data_fault(&self, ctx: &mut ExceptionContext) -> bool {
        if !ctx.cause().contains(Cause::COMPARATOR_MATCH) {
            return false;
        }
        let pc = ctx.pc();
        let inst = self.platform.fetch(pc);
        let op = match emulate::decode(inst) {
            Ok(op) => op,
            Err(err) => self.platform.fatal(format_args!("DSI at {:#010x}: {}", pc, err)),
        };
        let fault_address = ctx.fault_address();

        // The emulated access would hit the comparator again.
        self.platform.write_data_comparator(0);
        op.execute(ctx, &*self.platform);
        self.program_data(self.data_comparator.load(Ordering::Acquire));
        ctx.advance_pc();

        if self.in_data_range(fault_address) {
            // full ring: hit dropped
            let _ = self.data_hits.push(DataHit { fault_address, return_pc: pc });
        }
        true
    }

    /// Breakpoint callback. The comparator is disarmed on this core so the instruction
    /// can run; that also drops the core's instruction cache, so the next thread switch
    /// arms it again.
    pub fn handle_instruction_break(&self, ctx: &mut ExceptionContext) -> bool {
        let pc = ctx.pc();
        let armed = InstructionComparator::from_raw(self.instruction_comparator.load(Ordering::Acquire));
        if armed.matches(pc) && pc == self.instruction_address.load(Ordering::Acquire) {
            let _ = self.instruction_hits.push(InstructionHit { return_pc: pc });
        }
        self.program_instruction(0);
        true
    }
}

impl<P: Platform> SwitchHook for WatchpointManager<P> {
    fn on_switch(&self, thread: ThreadId) {
        let data = self.data_comparator.load(Ordering::Acquire);
        let instruction = self.instruction_comparator.load(Ordering::Acquire);
        let Some(caches) = self.local_caches() else {
            self.platform.write_data_comparator(data);
            self.platform.write_instruction_comparator(instruction);
            return;
        };

        if !caches.data.is_current(thread, data) {
            self.program_data(data);
            // cache full: this thread is reprogrammed on every switch
            let _ = caches.data.threads.insert(thread, data);
        }
        if !caches.instruction.is_current(thread, instruction) {
            self.program_instruction(instruction);
            let _ = caches.instruction.threads.insert(thread, instruction);
        }
    }
}
