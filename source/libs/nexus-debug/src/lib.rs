// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: In-process debug facility: per-core exception dispatch and hardware watchpoints
//! OWNERS: @kernel-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests per module, integration tests under `tests/`
//! DEPENDS_ON: nexus-sync (trap-safe containers), nexus-hal (memory bus)
//!
//! [`ExceptionDispatcher`] installs itself into the kernel exception chain of every core
//! and routes each managed vector to a registered callback. [`WatchpointManager`] builds
//! data and instruction watches on top of it; [`Debugger`] is the host-facing facade.
//! Everything that touches the kernel goes through the [`Platform`] trait.

#![cfg_attr(not(test), no_std)]
#![forbid(clippy::unwrap_used)]

extern crate alloc;

pub mod comparator;
pub mod config;
pub mod context;
pub mod debugger;
pub mod dispatch;
pub mod emulate;
pub mod error;
pub mod platform;
pub mod vector;
pub mod watch;

pub use config::DispatcherConfig;
pub use context::{Cause, CoreId, ExceptionContext, ThreadId};
pub use debugger::Debugger;
pub use dispatch::{ExceptionCallback, ExceptionDispatcher};
pub use error::{Error, Result};
pub use platform::{ChainEntry, ExceptionSink, Platform, SwitchHook};
pub use vector::Vector;
pub use watch::{DataHit, DataWatch, InstructionHit, InstructionWatch, WatchSize, WatchpointManager};
