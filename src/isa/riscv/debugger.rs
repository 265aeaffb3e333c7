use std::collections::BTreeSet;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{
    config::{arch_config::WordType, debug_rom},
    isa::riscv::{
        csr_reg::PrivilegeLevel,
        executor::Hart,
        hart_state::{HaltRequest, HartState, SingleStep},
        trigger::{Trigger, TriggerAction},
    },
    ram::MemError,
    utils::UnsignedInteger,
};

/// Reason for the last debug-mode entry, as reported in `dcsr.cause`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, IntoPrimitive, TryFromPrimitive)]
pub enum DebugCause {
    #[default]
    None = 0,
    SwBreakpoint = 1,
    HwBreakpoint = 2,
    DebugInterrupt = 3,
    Step = 4,
    Halt = 5,
    Group = 6,
}

/// Park the hart in the debug ROM. `dpc` keeps the pc of the instruction that did not run.
pub fn enter_debug_mode(state: &mut HartState, cause: DebugCause) {
    log::debug!("enter debug mode at {:#x}: {:?}", state.pc, cause);

    state.debug_mode = true;
    state.csr.dcsr.cause = cause;
    state.csr.dcsr.prv = state.prv;
    state.csr.dpc = state.pc;
    state.prv = PrivilegeLevel::M;
    state.pc = debug_rom::ENTRY;
}

/// `dret`: back to `dpc` in the privilege saved in `dcsr`, arming single-step if requested.
pub fn leave_debug_mode(state: &mut HartState) {
    log::debug!("leave debug mode to {:#x}", state.csr.dpc);

    state.pc = state.csr.dpc;
    state.prv = state.csr.dcsr.prv;
    state.debug_mode = false;
    if state.csr.dcsr.step {
        state.single_step = SingleStep::Stepping;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugEvent {
    StepCompleted { pc: WordType },
    Halted { pc: WordType, cause: DebugCause },
}

#[derive(thiserror::Error, Debug)]
pub enum DebugError {
    #[error("hart is not halted")]
    NotHalted,
    #[error("memory access failed: {0:?}")]
    Mem(#[from] MemError),
}

/// External debugger view of a hart: breakpoints are execute triggers entering debug mode.
pub struct Debugger {
    breakpoints: BTreeSet<WordType>,
    hart: Hart,
}

impl Debugger {
    /// Instructions run per `step` call while continuing.
    const CONTINUE_CHUNK: usize = 1024;

    pub fn new(hart: Hart) -> Self {
        Self {
            breakpoints: BTreeSet::new(),
            hart,
        }
    }

    pub fn hart(&self) -> &Hart {
        &self.hart
    }

    pub fn hart_mut(&mut self) -> &mut Hart {
        &mut self.hart
    }

    pub fn into_hart(self) -> Hart {
        self.hart
    }

    pub fn breakpoints(&self) -> &BTreeSet<WordType> {
        &self.breakpoints
    }

    pub fn set_breakpoint(&mut self, addr: WordType) {
        if self.breakpoints.insert(addr) {
            self.hart
                .mmu
                .insert_trigger(Trigger::execute(addr, TriggerAction::DebugMode));
        }
    }

    pub fn clear_breakpoint(&mut self, addr: WordType) {
        if self.breakpoints.remove(&addr) {
            self.hart.mmu.remove_trigger(addr);
        }
    }

    pub fn is_halted(&self) -> bool {
        self.hart.state.debug_mode
    }

    /// pc of the next instruction to run: `dpc` while halted.
    pub fn read_pc(&self) -> WordType {
        if self.is_halted() {
            self.hart.state.csr.dpc
        } else {
            self.hart.state.pc
        }
    }

    fn halted_event(&self) -> DebugEvent {
        let dcsr = &self.hart.state.csr.dcsr;
        match dcsr.cause {
            DebugCause::Step => DebugEvent::StepCompleted {
                pc: self.hart.state.csr.dpc,
            },
            cause => DebugEvent::Halted {
                pc: self.hart.state.csr.dpc,
                cause,
            },
        }
    }

    /// Raise a halt request and let the hart take it.
    pub fn halt(&mut self) -> DebugEvent {
        if !self.is_halted() {
            self.hart.halt_request = HaltRequest::Regular;
            self.hart.step(1);
            self.hart.halt_request = HaltRequest::None;
        }
        self.halted_event()
    }

    pub fn resume(&mut self) -> Result<(), DebugError> {
        if !self.is_halted() {
            return Err(DebugError::NotHalted);
        }
        self.hart.halt_request = HaltRequest::None;
        leave_debug_mode(&mut self.hart.state);
        Ok(())
    }

    /// Run exactly one instruction from `dpc` and halt again.
    pub fn step(&mut self) -> Result<DebugEvent, DebugError> {
        if !self.is_halted() {
            return Err(DebugError::NotHalted);
        }

        let pc = self.hart.state.csr.dpc;
        let on_breakpoint = self.breakpoints.contains(&pc);
        if on_breakpoint {
            self.hart.mmu.remove_trigger(pc);
        }

        let step_was_set = self.hart.state.csr.dcsr.step;
        self.hart.state.csr.dcsr.step = true;
        self.resume()?;
        // the first call runs the instruction, the second takes the step halt
        self.hart.step(1);
        self.hart.step(1);
        self.hart.state.csr.dcsr.step = step_was_set;

        if on_breakpoint {
            self.hart
                .mmu
                .insert_trigger(Trigger::execute(pc, TriggerAction::DebugMode));
        }

        Ok(self.halted_event())
    }

    /// Resume and run until the hart halts or about `max_steps` instructions retired.
    pub fn continue_until(&mut self, max_steps: usize) -> Result<DebugEvent, DebugError> {
        let mut rest = max_steps;

        if self.is_halted() {
            if self.breakpoints.contains(&self.hart.state.csr.dpc) {
                let event = self.step()?;
                if !matches!(event, DebugEvent::StepCompleted { .. }) {
                    return Ok(event);
                }
                rest = rest.saturating_sub(1);
            }
            self.resume()?;
        }

        while rest > 0 && !self.is_halted() {
            let before = self.hart.minstret();
            self.hart.step(rest.min(Self::CONTINUE_CHUNK));
            let retired = self.hart.minstret().wrapping_sub(before) as usize;
            rest = rest.saturating_sub(retired.max(1));
        }

        if self.is_halted() {
            Ok(self.halted_event())
        } else {
            Ok(DebugEvent::StepCompleted {
                pc: self.hart.state.pc,
            })
        }
    }

    pub fn continue_run(&mut self) -> Result<DebugEvent, DebugError> {
        self.continue_until(usize::MAX)
    }

    pub fn read_reg(&self, idx: u8) -> WordType {
        self.hart.read_reg(idx)
    }

    pub fn write_reg(&mut self, idx: u8, val: WordType) {
        self.hart.state.reg_file.write(idx, val);
    }

    pub fn read_mem<V: UnsignedInteger>(&self, addr: WordType) -> Result<V, DebugError> {
        Ok(self.hart.mmu.read_phys::<V>(addr)?)
    }

    pub fn write_mem<V: UnsignedInteger>(
        &mut self,
        addr: WordType,
        data: V,
    ) -> Result<(), DebugError> {
        Ok(self.hart.mmu.ram_mut().write::<V>(addr, data)?)
    }
}
