// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Host-facing debug API bundling the dispatcher and the watchpoints
//! OWNERS: @kernel-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: `tests/end_to_end.rs`
//! PUBLIC API: Debugger::{new, initialize, shutdown, set_data_breakpoint,
//!             unset_data_breakpoint, consume_data_break_info, consume_instruction_break_info}

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::config::DispatcherConfig;
use crate::dispatch::ExceptionDispatcher;
use crate::error::Result;
use crate::platform::Platform;
use crate::watch::{DataHit, InstructionHit, WatchSize, WatchpointManager};

pub struct Debugger<P: Platform> {
    dispatcher: Arc<ExceptionDispatcher<P>>,
    watchpoints: Arc<WatchpointManager<P>>,
}

impl<P: Platform> Debugger<P> {
    /// Sizes the dispatcher for every core the platform schedules on.
    pub fn new(platform: Arc<P>) -> Result<Self> {
        let config = DispatcherConfig::for_platform(&*platform);
        let dispatcher = Arc::new(ExceptionDispatcher::new(Arc::clone(&platform), config)?);
        let watchpoints = Arc::new(WatchpointManager::new(platform));
        Ok(Self { dispatcher, watchpoints })
    }

    pub fn initialize(&self) -> Result<()> {
        self.dispatcher.initialize()?;
        if let Err(err) = self.watchpoints.initialize(&self.dispatcher) {
            let _ = self.dispatcher.teardown();
            return Err(err);
        }
        Ok(())
    }

    pub fn shutdown(&self) -> Result<()> {
        self.watchpoints.shutdown()?;
        self.dispatcher.teardown()
    }

    pub fn is_initialized(&self) -> bool {
        self.watchpoints.is_initialized()
    }

    /// Watches the doubleword at `address`.
    pub fn set_data_breakpoint(&self, address: u32, read: bool, write: bool) {
        self.set_data_breakpoint_sized(address, read, write, WatchSize::Double);
    }

    pub fn set_data_breakpoint_sized(&self, address: u32, read: bool, write: bool, size: WatchSize) {
        self.watchpoints.set_data_watch(address, read, write, size);
    }

    pub fn unset_data_breakpoint(&self) {
        self.watchpoints.unset_data_watch();
    }

    pub fn set_instruction_breakpoint(&self, address: u32) {
        self.watchpoints.set_instruction_watch(address);
    }

    pub fn unset_instruction_breakpoint(&self) {
        self.watchpoints.unset_instruction_watch();
    }

    pub fn consume_data_break_info(&self) -> Vec<DataHit> {
        self.watchpoints.consume_data_hits()
    }

    pub fn consume_instruction_break_info(&self) -> Vec<InstructionHit> {
        self.watchpoints.consume_instruction_hits()
    }

    pub fn dispatcher(&self) -> &Arc<ExceptionDispatcher<P>> {
        &self.dispatcher
    }

    pub fn watchpoints(&self) -> &Arc<WatchpointManager<P>> {
        &self.watchpoints
    }
}
