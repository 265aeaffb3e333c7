use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{
    config::arch_config::{WordType, XLEN},
    isa::riscv::trigger::TriggerMatch,
    ram::MemError,
};

pub mod trap_controller;

/// Trap Cause
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Trap {
    Interrupt(Interrupt),
    Exception(Exception),
}

/// Interrupt
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
pub enum Interrupt {
    SupervisorSoft = 1,
    MachineSoft = 3,
    SupervisorTimer = 5,
    MachineTimer = 7,
    SupervisorExternal = 9,
    MachineExternal = 11,
}

/// Exception
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
pub enum Exception {
    InstructionMisaligned = 0,
    InstructionFault = 1,
    IllegalInstruction = 2,
    Breakpoint = 3,
    LoadMisaligned = 4,
    LoadFault = 5,
    StoreMisaligned = 6,
    StoreFault = 7,
    UserEnvCall = 8,
    SupervisorEnvCall = 9,
    MachineEnvCall = 11,
    InstructionPageFault = 12,
    LoadPageFault = 13,
    StorePageFault = 15,
}

impl Interrupt {
    /// Bit of this interrupt in `mip` / `mie`.
    pub fn mask(self) -> WordType {
        1 << u64::from(self)
    }
}

impl Exception {
    pub fn from_memory_err(err: MemError) -> Self {
        match err {
            MemError::LoadMisaligned => Exception::LoadMisaligned,
            MemError::LoadFault => Exception::LoadFault,
            MemError::StoreMisaligned => Exception::StoreMisaligned,
            MemError::StoreFault => Exception::StoreFault,
        }
    }

    pub fn from_instr_fetch_err(err: MemError) -> Self {
        match err {
            MemError::LoadMisaligned | MemError::StoreMisaligned => {
                Exception::InstructionMisaligned
            }
            MemError::LoadFault | MemError::StoreFault => Exception::InstructionFault,
        }
    }

    pub fn is_memory_fault(self) -> bool {
        matches!(
            self,
            Exception::LoadMisaligned
                | Exception::LoadFault
                | Exception::StoreMisaligned
                | Exception::StoreFault
                | Exception::LoadPageFault
                | Exception::StorePageFault
        )
    }
}

impl From<Trap> for WordType {
    fn from(trap: Trap) -> WordType {
        match trap {
            Trap::Interrupt(nr) => u64::from(nr) | (1u64 << (XLEN - 1)),
            Trap::Exception(nr) => nr.into(),
        }
    }
}

/// Every non-normal outcome of executing one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TrapEvent {
    #[error("{cause:?} (tval = {tval:#x})")]
    Trap { cause: Trap, tval: WordType },

    #[error("trigger matched: {0:?}")]
    DebugTriggerMatch(TriggerMatch),

    #[error("software breakpoint into debug mode")]
    DebugModeEntry,

    #[error("wait for interrupt")]
    WaitForInterrupt,
}

impl TrapEvent {
    pub fn exception(exception: Exception, tval: WordType) -> Self {
        TrapEvent::Trap {
            cause: Trap::Exception(exception),
            tval,
        }
    }

    pub fn interrupt(interrupt: Interrupt) -> Self {
        TrapEvent::Trap {
            cause: Trap::Interrupt(interrupt),
            tval: 0,
        }
    }

    pub fn illegal() -> Self {
        Self::exception(Exception::IllegalInstruction, 0)
    }

    /// A data-access trap after which partial state changes may remain visible.
    pub fn is_memory_trap(&self) -> bool {
        match self {
            TrapEvent::Trap {
                cause: Trap::Exception(e),
                ..
            } => e.is_memory_fault(),
            _ => false,
        }
    }
}

impl From<Exception> for TrapEvent {
    fn from(exception: Exception) -> Self {
        Self::exception(exception, 0)
    }
}
