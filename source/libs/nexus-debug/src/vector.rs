// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Kernel exception vector categories. The ordinal indexes every per-vector table.

use core::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Vector {
    SystemReset = 0,
    MachineCheck = 1,
    /// Data storage interrupt; raised by the data address comparator.
    Dsi = 2,
    /// Instruction storage interrupt.
    Isi = 3,
    ExternalInterrupt = 4,
    Alignment = 5,
    Program = 6,
    FloatingPoint = 7,
    Decrementer = 8,
    SystemCall = 9,
    Trace = 10,
    PerformanceMonitor = 11,
    /// Raised by the instruction address comparator.
    Breakpoint = 12,
    SystemInterrupt = 13,
    /// Inter-core interrupt.
    Ici = 14,
}

impl Vector {
    pub const COUNT: usize = 15;

    pub const ALL: [Vector; Self::COUNT] = [
        Vector::SystemReset,
        Vector::MachineCheck,
        Vector::Dsi,
        Vector::Isi,
        Vector::ExternalInterrupt,
        Vector::Alignment,
        Vector::Program,
        Vector::FloatingPoint,
        Vector::Decrementer,
        Vector::SystemCall,
        Vector::Trace,
        Vector::PerformanceMonitor,
        Vector::Breakpoint,
        Vector::SystemInterrupt,
        Vector::Ici,
    ];

    /// Vectors the dispatcher installs itself on. ICI stays with the kernel.
    pub const MANAGED: [Vector; Self::COUNT - 1] = [
        Vector::SystemReset,
        Vector::MachineCheck,
        Vector::Dsi,
        Vector::Isi,
        Vector::ExternalInterrupt,
        Vector::Alignment,
        Vector::Program,
        Vector::FloatingPoint,
        Vector::Decrementer,
        Vector::SystemCall,
        Vector::Trace,
        Vector::PerformanceMonitor,
        Vector::Breakpoint,
        Vector::SystemInterrupt,
    ];

    #[inline]
    pub const fn ordinal(self) -> usize {
        self as usize
    }

    pub const fn from_ordinal(ordinal: usize) -> Option<Self> {
        if ordinal < Self::COUNT {
            Some(Self::ALL[ordinal])
        } else {
            None
        }
    }

    pub const fn is_managed(self) -> bool {
        !matches!(self, Vector::Ici)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Vector::SystemReset => "SystemReset",
            Vector::MachineCheck => "MachineCheck",
            Vector::Dsi => "DSI",
            Vector::Isi => "ISI",
            Vector::ExternalInterrupt => "ExternalInterrupt",
            Vector::Alignment => "Alignment",
            Vector::Program => "Program",
            Vector::FloatingPoint => "FloatingPoint",
            Vector::Decrementer => "Decrementer",
            Vector::SystemCall => "SystemCall",
            Vector::Trace => "Trace",
            Vector::PerformanceMonitor => "PerformanceMonitor",
            Vector::Breakpoint => "Breakpoint",
            Vector::SystemInterrupt => "SystemInterrupt",
            Vector::Ici => "ICI",
        }
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
