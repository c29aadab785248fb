// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Host simulation of the kernel services the debug facility relies on.
//!
//! Memory is a sparse big-endian byte map. Each core has its own comparators and vector
//! table; the "current core" of a host thread is a thread-local set by [`pin`].
//! `fatal` panics so tests can observe it with `#[should_panic]`.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use nexus_debug::comparator::{DataComparator, InstructionComparator};
use nexus_debug::emulate;
use nexus_debug::{
    Cause, ChainEntry, CoreId, ExceptionContext, ExceptionSink, Platform, SwitchHook, ThreadId, Vector,
};
use nexus_hal::{Bus, Width};

thread_local! {
    static CURRENT_CORE: Cell<u16> = const { Cell::new(0) };
}

/// Makes the calling host thread behave as if it runs on `core`.
pub fn pin(core: CoreId) {
    CURRENT_CORE.with(|c| c.set(core.as_raw()));
}

fn on_core<R>(core: CoreId, f: impl FnOnce() -> R) -> R {
    let saved = CURRENT_CORE.with(|c| c.replace(core.as_raw()));
    let out = f();
    CURRENT_CORE.with(|c| c.set(saved));
    out
}

pub fn core(n: u16) -> CoreId {
    CoreId::from_raw(n)
}

struct CoreState {
    data_comparator: u32,
    instruction_comparator: u32,
    data_writes: usize,
    instruction_writes: usize,
    vectors: [Option<ChainEntry>; Vector::COUNT],
}

pub struct SimPlatform {
    cores: Vec<Mutex<CoreState>>,
    memory: Mutex<HashMap<u32, u8>>,
    hook: Mutex<Option<Arc<dyn SwitchHook>>>,
    resumes: AtomicUsize,
    contexts_set: AtomicUsize,
}

impl SimPlatform {
    pub fn new(cores: usize) -> Arc<Self> {
        Arc::new(Self {
            cores: (0..cores)
                .map(|_| {
                    Mutex::new(CoreState {
                        data_comparator: 0,
                        instruction_comparator: 0,
                        data_writes: 0,
                        instruction_writes: 0,
                        vectors: [const { None }; Vector::COUNT],
                    })
                })
                .collect(),
            memory: Mutex::new(HashMap::new()),
            hook: Mutex::new(None),
            resumes: AtomicUsize::new(0),
            contexts_set: AtomicUsize::new(0),
        })
    }

    pub fn data_comparator(&self, core: CoreId) -> u32 {
        self.cores[core.as_index()].lock().data_comparator
    }

    pub fn instruction_comparator(&self, core: CoreId) -> u32 {
        self.cores[core.as_index()].lock().instruction_comparator
    }

    pub fn data_writes(&self, core: CoreId) -> usize {
        self.cores[core.as_index()].lock().data_writes
    }

    pub fn instruction_writes(&self, core: CoreId) -> usize {
        self.cores[core.as_index()].lock().instruction_writes
    }

    pub fn vector_installed(&self, core: CoreId, vector: Vector) -> bool {
        self.cores[core.as_index()].lock().vectors[vector.ordinal()].is_some()
    }

    pub fn resumes(&self) -> usize {
        self.resumes.load(Ordering::SeqCst)
    }

    pub fn contexts_set(&self) -> usize {
        self.contexts_set.load(Ordering::SeqCst)
    }

    pub fn has_switch_hook(&self) -> bool {
        self.hook.lock().is_some()
    }

    pub fn store_code(&self, pc: u32, inst: u32) {
        self.write(pc, Width::Word, inst);
    }

    /// Schedules `thread` on `core`, running the switch hook there.
    pub fn switch_to(&self, core: CoreId, thread: ThreadId) {
        let hook = self.hook.lock().clone();
        if let Some(hook) = hook {
            on_core(core, || hook.on_switch(thread));
        }
    }

    /// Delivers `vector` to whatever the kernel chain of `core` holds, leaving the core
    /// hint of `ctx` untouched.
    pub fn deliver(&self, core: CoreId, vector: Vector, ctx: &mut ExceptionContext) {
        let entry = self.cores[core.as_index()].lock().vectors[vector.ordinal()].clone();
        match entry {
            Some(entry) => on_core(core, || entry.sink.on_exception(vector, ctx)),
            None => panic!("kernel: unhandled {} on core {}", vector, core),
        }
    }

    /// Raises `vector` on `core` the way the kernel would, stamping the core hint.
    pub fn raise(&self, core: CoreId, vector: Vector, ctx: &mut ExceptionContext) {
        ctx.set_core_hint(core.as_raw() as u32);
        self.deliver(core, vector, ctx);
    }

    /// Executes the load/store at `ctx.pc()` on `core`, trapping on comparator matches.
    pub fn execute(&self, core: CoreId, ctx: &mut ExceptionContext) {
        let pc = ctx.pc();
        let iabr = InstructionComparator::from_raw(self.instruction_comparator(core));
        if iabr.matches(pc) {
            self.raise(core, Vector::Breakpoint, ctx);
            if ctx.pc() != pc {
                return;
            }
        }

        let op = emulate::decode(self.fetch(pc)).expect("simulated code must be a D-form load/store");
        let ea = op.effective_address(ctx);
        let dabr = DataComparator::from_raw(self.data_comparator(core));
        if dabr.matches(ea, op.is_store()) {
            let mut cause = Cause::COMPARATOR_MATCH;
            cause.set(Cause::STORE, op.is_store());
            ctx.set_cause(cause);
            ctx.set_fault_address(ea);
            self.raise(core, Vector::Dsi, ctx);
            return;
        }
        op.execute(ctx, self);
        ctx.advance_pc();
    }
}

impl Bus for SimPlatform {
    fn read(&self, addr: u32, width: Width) -> u32 {
        let mem = self.memory.lock();
        (0..width.bytes()).fold(0, |acc, i| {
            (acc << 8) | *mem.get(&addr.wrapping_add(i)).unwrap_or(&0) as u32
        })
    }

    fn write(&self, addr: u32, width: Width, value: u32) {
        let n = width.bytes();
        let mut mem = self.memory.lock();
        for i in 0..n {
            mem.insert(addr.wrapping_add(i), (value >> (8 * (n - 1 - i))) as u8);
        }
    }
}

impl Platform for SimPlatform {
    fn core_count(&self) -> usize {
        self.cores.len()
    }

    fn current_core(&self) -> CoreId {
        CoreId::from_raw(CURRENT_CORE.with(|c| c.get()))
    }

    fn run_on_core(&self, core: CoreId, job: &mut dyn FnMut()) {
        on_core(core, job);
    }

    fn swap_vector(&self, core: CoreId, vector: Vector, entry: Option<ChainEntry>) -> Option<ChainEntry> {
        let mut state = self.cores[core.as_index()].lock();
        std::mem::replace(&mut state.vectors[vector.ordinal()], entry)
    }

    fn set_current_context(&self, _context: &mut ExceptionContext) {
        self.contexts_set.fetch_add(1, Ordering::SeqCst);
    }

    fn resume(&self, _context: &mut ExceptionContext) {
        self.resumes.fetch_add(1, Ordering::SeqCst);
    }

    fn fatal(&self, reason: fmt::Arguments<'_>) -> ! {
        panic!("fatal: {}", reason)
    }

    fn write_data_comparator(&self, value: u32) {
        let mut state = self.cores[self.current_core().as_index()].lock();
        state.data_comparator = value;
        state.data_writes += 1;
    }

    fn write_instruction_comparator(&self, value: u32) {
        let mut state = self.cores[self.current_core().as_index()].lock();
        state.instruction_comparator = value;
        state.instruction_writes += 1;
    }

    fn swap_switch_hook(&self, hook: Option<Arc<dyn SwitchHook>>) -> Option<Arc<dyn SwitchHook>> {
        std::mem::replace(&mut *self.hook.lock(), hook)
    }
}

/// Chain entry that only counts what reaches it.
#[derive(Default)]
pub struct CountingSink {
    pub hits: AtomicUsize,
}

impl ExceptionSink for CountingSink {
    fn on_exception(&self, _vector: Vector, _interrupted: &mut ExceptionContext) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }
}

/// Switch hook that only counts switches.
#[derive(Default)]
pub struct CountingHook {
    pub switches: AtomicUsize,
}

impl SwitchHook for CountingHook {
    fn on_switch(&self, _thread: ThreadId) {
        self.switches.fetch_add(1, Ordering::SeqCst);
    }
}
