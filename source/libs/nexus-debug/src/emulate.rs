// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Software re-execution of a trapped D-form load/store
//! OWNERS: @kernel-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests below + `tests/watch.rs`
//! INVARIANTS:
//!   - only word/halfword/byte loads and stores (with and without base update) decode
//!   - anything else is rejected; callers must not attempt partial emulation
//!
//! Encoding: `opcode[0:5] rT[6:10] rA[11:15] D[16:31]`, big-endian bit numbering.
//! EA = (rA|0) + sign_extend(D); update forms write EA back to rA.

use nexus_hal::{Bus, Width};

use crate::context::ExceptionContext;

/// Primary opcodes of the supported instructions.
pub mod opcode {
    pub const LWZ: u32 = 32;
    pub const LWZU: u32 = 33;
    pub const LBZ: u32 = 34;
    pub const LBZU: u32 = 35;
    pub const STW: u32 = 36;
    pub const STWU: u32 = 37;
    pub const STB: u32 = 38;
    pub const STBU: u32 = 39;
    pub const LHZ: u32 = 40;
    pub const LHZU: u32 = 41;
    pub const LHA: u32 = 42;
    pub const LHAU: u32 = 43;
    pub const STH: u32 = 44;
    pub const STHU: u32 = 45;
}

/// Builds a D-form instruction word.
pub const fn encode(primary: u32, rt: u32, ra: u32, displacement: i16) -> u32 {
    (primary << 26) | ((rt & 0x1f) << 21) | ((ra & 0x1f) << 16) | (displacement as u16 as u32)
}

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unsupported instruction {0:#010x}")]
    Unsupported(u32),
    /// Update form with rA = 0, or a load with update targeting its own base.
    #[error("invalid instruction form {0:#010x}")]
    InvalidForm(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Load { sign_extend: bool },
    Store,
}

/// A decoded load/store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryOp {
    pub direction: Direction,
    pub width: Width,
    pub update: bool,
    pub rt: usize,
    pub ra: usize,
    pub displacement: i16,
}

pub fn decode(inst: u32) -> Result<MemoryOp, DecodeError> {
    use opcode::*;

    const PLAIN: Direction = Direction::Load { sign_extend: false };
    let primary = inst >> 26;
    let (direction, width) = match primary {
        LWZ | LWZU => (PLAIN, Width::Word),
        LBZ | LBZU => (PLAIN, Width::Byte),
        LHZ | LHZU => (PLAIN, Width::Half),
        LHA | LHAU => (Direction::Load { sign_extend: true }, Width::Half),
        STW | STWU => (Direction::Store, Width::Word),
        STB | STBU => (Direction::Store, Width::Byte),
        STH | STHU => (Direction::Store, Width::Half),
        _ => return Err(DecodeError::Unsupported(inst)),
    };
    let op = MemoryOp {
        direction,
        width,
        update: primary & 1 == 1,
        rt: ((inst >> 21) & 0x1f) as usize,
        ra: ((inst >> 16) & 0x1f) as usize,
        displacement: inst as u16 as i16,
    };
    if op.update && (op.ra == 0 || (op.is_load() && op.ra == op.rt)) {
        return Err(DecodeError::InvalidForm(inst));
    }
    Ok(op)
}

impl MemoryOp {
    pub fn is_load(&self) -> bool {
        matches!(self.direction, Direction::Load { .. })
    }

    pub fn is_store(&self) -> bool {
        self.direction == Direction::Store
    }

    pub fn effective_address(&self, ctx: &ExceptionContext) -> u32 {
        let base = if self.ra == 0 { 0 } else { ctx.gpr(self.ra) };
        base.wrapping_add(self.displacement as i32 as u32)
    }

    /// Performs the access against `bus` and updates the registers in `ctx`.
    /// The program counter is left alone. Returns the effective address.
    pub fn execute<B: Bus + ?Sized>(&self, ctx: &mut ExceptionContext, bus: &B) -> u32 {
        let ea = self.effective_address(ctx);
        match self.direction {
            Direction::Load { sign_extend } => {
                let raw = bus.read(ea, self.width);
                let value = if sign_extend { raw as u16 as i16 as i32 as u32 } else { raw };
                ctx.set_gpr(self.rt, value);
            }
            Direction::Store => bus.write(ea, self.width, self.width.truncate(ctx.gpr(self.rt))),
        }
        if self.update {
            ctx.set_gpr(self.ra, ea);
        }
        ea
    }
}
