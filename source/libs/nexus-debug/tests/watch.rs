// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Watchpoint manager against the simulated kernel
//! OWNERS: @kernel-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: 14 tests
//!
//! TEST_SCENARIOS:
//!   - data access at the watched base is emulated and recorded once
//!   - comparator matches outside the watched range are emulated but not recorded
//!   - reconfiguration discards queued hits
//!   - unsupported or unattributable data faults are fatal
//!   - the switch hook only touches the comparator when the thread's cached value is stale
//!   - caches are per core: migration and foreign register writes force a reprogram
//!   - threads that do not fit in the cache are reprogrammed on every switch
//!   - instruction watch records the hit and re-arms on the next switch
//!   - shutdown disarms every core and restores the previous hook

mod support;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use nexus_debug::comparator::{DataComparator, InstructionComparator};
use nexus_debug::config::THREAD_CACHE_CAPACITY;
use nexus_debug::emulate::{encode, opcode};
use nexus_debug::{
    Cause, DataHit, DataWatch, Debugger, Error, ExceptionContext, InstructionHit, InstructionWatch,
    Platform, SwitchHook, ThreadId, Vector, WatchSize,
};
use nexus_hal::{Bus, Width};
use support::{core, pin, CountingHook, SimPlatform};

const CODE: u32 = 0x0100_0000;
const DATA: u32 = 0x1000_0040;
const THREAD_A: ThreadId = ThreadId::from_raw(0x1001_0000);
const THREAD_B: ThreadId = ThreadId::from_raw(0x1002_0000);

fn debugger(cores: usize) -> (Arc<SimPlatform>, Debugger<SimPlatform>) {
    let platform = SimPlatform::new(cores);
    let debugger = Debugger::new(Arc::clone(&platform)).expect("debugger");
    debugger.initialize().expect("initialize");
    (platform, debugger)
}

/// `stw r5, disp(r4)` at `CODE` with `r4 = DATA`.
fn store_word(platform: &SimPlatform, disp: i16, value: u32) -> ExceptionContext {
    platform.store_code(CODE, encode(opcode::STW, 5, 4, disp));
    let mut ctx = ExceptionContext::new();
    ctx.set_pc(CODE);
    ctx.set_gpr(4, DATA);
    ctx.set_gpr(5, value);
    ctx
}

#[test]
fn store_at_base_is_emulated_and_recorded() {
    let (platform, debugger) = debugger(3);
    pin(core(0));
    debugger.set_data_breakpoint_sized(DATA, false, true, WatchSize::Word);
    assert_eq!(platform.data_comparator(core(0)), DataComparator::new(DATA, false, true).raw());

    let mut ctx = store_word(&platform, 0, 0xcafe_f00d);
    platform.execute(core(0), &mut ctx);

    assert_eq!(platform.read(DATA, Width::Word), 0xcafe_f00d);
    assert_eq!(ctx.pc(), CODE + 4);
    assert_eq!(platform.data_comparator(core(0)), DataComparator::new(DATA, false, true).raw());
    assert_eq!(
        debugger.consume_data_break_info(),
        vec![DataHit { fault_address: DATA, return_pc: CODE }]
    );
    assert!(debugger.consume_data_break_info().is_empty());
}

#[test]
fn same_granule_outside_range_is_not_recorded() {
    let (platform, debugger) = debugger(1);
    debugger.set_data_breakpoint_sized(DATA, false, true, WatchSize::Word);

    let mut ctx = store_word(&platform, 4, 0x1234_5678);
    platform.execute(core(0), &mut ctx);

    assert_eq!(platform.read(DATA + 4, Width::Word), 0x1234_5678);
    assert_eq!(ctx.pc(), CODE + 4);
    assert!(debugger.consume_data_break_info().is_empty());
}

#[test]
fn read_only_watch_ignores_stores() {
    let (platform, debugger) = debugger(1);
    debugger.set_data_breakpoint(DATA, true, false);

    let mut ctx = store_word(&platform, 0, 7);
    platform.execute(core(0), &mut ctx);
    assert!(debugger.consume_data_break_info().is_empty());

    platform.store_code(CODE + 4, encode(opcode::LHZU, 6, 4, 2));
    platform.execute(core(0), &mut ctx);
    assert_eq!(ctx.gpr(6), 7);
    assert_eq!(ctx.gpr(4), DATA + 2);
    assert_eq!(
        debugger.consume_data_break_info(),
        vec![DataHit { fault_address: DATA + 2, return_pc: CODE + 4 }]
    );
}

#[test]
fn reconfiguring_discards_queued_hits() {
    let (platform, debugger) = debugger(1);
    debugger.set_data_breakpoint(DATA, true, true);
    platform.execute(core(0), &mut store_word(&platform, 0, 1));
    debugger.unset_data_breakpoint();
    assert!(debugger.consume_data_break_info().is_empty());
    assert_eq!(platform.data_comparator(core(0)), 0);
    assert_eq!(debugger.watchpoints().data_watch(), None);

    debugger.set_data_breakpoint(DATA, true, true);
    platform.execute(core(0), &mut store_word(&platform, 0, 2));
    debugger.set_data_breakpoint(DATA + 0x100, true, true);
    assert!(debugger.consume_data_break_info().is_empty());
}

#[test]
fn descriptor_keeps_the_exact_base() {
    let (platform, debugger) = debugger(1);
    debugger.set_data_breakpoint_sized(DATA + 3, true, false, WatchSize::Byte);
    assert_eq!(
        debugger.watchpoints().data_watch(),
        Some(DataWatch { base_address: DATA + 3, size: 1, read: true, write: false })
    );
    assert_eq!(DataComparator::from_raw(platform.data_comparator(core(0))).address(), DATA);
}

#[test]
#[should_panic(expected = "unsupported instruction")]
fn unsupported_instruction_is_fatal() {
    let (platform, _debugger) = debugger(1);
    // lmw r28, 0(r4)
    platform.store_code(CODE, encode(46, 28, 4, 0));
    let mut ctx = ExceptionContext::new();
    ctx.set_pc(CODE);
    ctx.set_cause(Cause::COMPARATOR_MATCH);
    platform.raise(core(0), Vector::Dsi, &mut ctx);
}

#[test]
#[should_panic(expected = "DSI Exception occurred")]
fn ordinary_data_fault_is_fatal() {
    let (platform, _debugger) = debugger(1);
    let mut ctx = store_word(&platform, 0, 0);
    ctx.set_cause(Cause::NOT_MAPPED | Cause::STORE);
    platform.raise(core(0), Vector::Dsi, &mut ctx);
}

#[test]
fn switch_hook_writes_only_stale_comparators() {
    let (platform, debugger) = debugger(2);
    pin(core(0));
    debugger.set_data_breakpoint(DATA, false, true);
    let expected = DataComparator::new(DATA, false, true).raw();

    let before = platform.data_writes(core(1));
    platform.switch_to(core(1), THREAD_A);
    assert_eq!(platform.data_comparator(core(1)), expected);
    platform.switch_to(core(1), THREAD_A);
    assert_eq!(platform.data_writes(core(1)), before + 1);

    platform.switch_to(core(1), THREAD_B);
    assert_eq!(platform.data_writes(core(1)), before + 2);

    debugger.unset_data_breakpoint();
    platform.switch_to(core(1), THREAD_A);
    assert_eq!(platform.data_comparator(core(1)), 0);
    assert_eq!(platform.data_writes(core(1)), before + 3);
}

#[test]
fn instruction_watch_records_and_rearms() {
    let (platform, debugger) = debugger(1);
    let pc = CODE + 0x10;
    debugger.set_instruction_breakpoint(pc);
    let armed = InstructionComparator::new(pc).raw();
    assert_eq!(platform.instruction_comparator(core(0)), armed);
    assert_eq!(debugger.watchpoints().instruction_watch(), Some(InstructionWatch { address: pc }));

    platform.write(DATA, Width::Word, 0x0bad_f00d);
    platform.store_code(pc, encode(opcode::LWZ, 3, 4, 0));
    let mut ctx = ExceptionContext::new();
    ctx.set_pc(pc);
    ctx.set_gpr(4, DATA);
    platform.execute(core(0), &mut ctx);

    assert_eq!(ctx.gpr(3), 0x0bad_f00d);
    assert_eq!(ctx.pc(), pc + 4);
    assert_eq!(debugger.consume_instruction_break_info(), vec![InstructionHit { return_pc: pc }]);
    assert_eq!(platform.instruction_comparator(core(0)), 0);

    platform.switch_to(core(0), THREAD_A);
    assert_eq!(platform.instruction_comparator(core(0)), armed);
}

#[test]
fn shutdown_disarms_every_core_and_restores_hook() {
    let platform = SimPlatform::new(3);
    let previous = Arc::new(CountingHook::default());
    let hook: Arc<dyn SwitchHook> = previous.clone();
    platform.swap_switch_hook(Some(hook));

    let debugger = Debugger::new(Arc::clone(&platform)).expect("debugger");
    debugger.initialize().expect("initialize");
    assert!(debugger.is_initialized());
    debugger.set_data_breakpoint(DATA, true, true);
    debugger.set_instruction_breakpoint(CODE);
    for n in 0..3 {
        platform.switch_to(core(n), THREAD_A);
    }
    assert_eq!(previous.switches.load(Ordering::SeqCst), 0);

    debugger.shutdown().expect("shutdown");
    assert!(!debugger.is_initialized());
    for n in 0..3 {
        assert_eq!(platform.data_comparator(core(n)), 0);
        assert_eq!(platform.instruction_comparator(core(n)), 0);
        assert!(!platform.vector_installed(core(n), Vector::Dsi));
    }
    assert_eq!(debugger.watchpoints().data_watch(), None);
    assert_eq!(debugger.watchpoints().instruction_watch(), None);

    platform.switch_to(core(0), THREAD_B);
    assert_eq!(previous.switches.load(Ordering::SeqCst), 1);
    assert_eq!(debugger.shutdown(), Err(Error::NotInitialized));
}

#[test]
fn second_initialize_is_rejected() {
    let (_platform, debugger) = debugger(1);
    assert_eq!(debugger.initialize(), Err(Error::AlreadyInitialized));
    assert!(debugger.is_initialized());
}

#[test]
fn migrating_thread_reprograms_a_core_holding_an_old_watch() {
    let (platform, debugger) = debugger(2);
    pin(core(0));
    let thread_c = ThreadId::from_raw(0x1003_0000);
    let old = DataComparator::new(DATA, false, true).raw();
    let new = DataComparator::new(DATA + 0x1000, false, true).raw();

    debugger.set_data_breakpoint(DATA, false, true);
    platform.switch_to(core(1), thread_c);
    assert_eq!(platform.data_comparator(core(1)), old);

    debugger.set_data_breakpoint(DATA + 0x1000, false, true);
    platform.switch_to(core(0), THREAD_A);
    platform.switch_to(core(1), THREAD_A);
    assert_eq!(platform.data_comparator(core(1)), new);
}

#[test]
fn register_overwritten_by_another_thread_is_reprogrammed() {
    let (platform, debugger) = debugger(2);
    pin(core(0));
    let x = DataComparator::new(DATA, true, true).raw();
    let y = DataComparator::new(DATA + 0x80, true, true).raw();

    debugger.set_data_breakpoint(DATA, true, true);
    platform.switch_to(core(1), THREAD_A);
    debugger.set_data_breakpoint(DATA + 0x80, true, true);
    platform.switch_to(core(1), THREAD_B);
    assert_eq!(platform.data_comparator(core(1)), y);

    debugger.set_data_breakpoint(DATA, true, true);
    platform.switch_to(core(1), THREAD_A);
    assert_eq!(platform.data_comparator(core(1)), x);
}

#[test]
fn evicted_thread_is_reprogrammed_every_switch() {
    let (platform, debugger) = debugger(2);
    pin(core(0));
    debugger.set_data_breakpoint(DATA, false, true);

    for n in 0..(THREAD_CACHE_CAPACITY + 4) as u32 {
        platform.switch_to(core(1), ThreadId::from_raw(0x2000_0000 + n * 0x100));
    }
    let overflow = ThreadId::from_raw(0x3000_0000);
    let before = platform.data_writes(core(1));
    platform.switch_to(core(1), overflow);
    platform.switch_to(core(1), overflow);
    assert_eq!(platform.data_writes(core(1)), before + 2);
    assert_eq!(
        platform.data_comparator(core(1)),
        DataComparator::new(DATA, false, true).raw()
    );

    // cached threads still skip the write
    let before = platform.data_writes(core(1));
    platform.switch_to(core(1), ThreadId::from_raw(0x2000_0000));
    assert_eq!(platform.data_writes(core(1)), before);
}
