// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

/// Result alias for debug facility configuration calls.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors reported to the host program. Fault-context failures are never reported this way;
/// they are either dropped or escalated through [`crate::Platform::fatal`].
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The requested core count is zero or above the static slot table.
    #[error("invalid core count {cores} (supported 1..={max})")]
    InvalidCoreCount { cores: usize, max: usize },
    /// `initialize` was called twice without an intervening shutdown.
    #[error("debug facility already initialized")]
    AlreadyInitialized,
    /// The operation needs an initialized facility.
    #[error("debug facility not initialized")]
    NotInitialized,
}
