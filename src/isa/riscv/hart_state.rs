use crate::{
    config::arch_config::WordType,
    cpu::RegFile,
    isa::riscv::{
        csr_reg::{CsrRegFile, Mstatus, PrivilegeLevel},
        diagnostic::DiagnosticRecord,
        trigger::TriggerGate,
        vector::VectorUnit,
    },
    ram_config::DEFAULT_PC_VALUE,
};

/// Single-step phase driven by `dcsr.step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SingleStep {
    #[default]
    None,
    /// Armed, the stepped instruction has not run yet.
    Stepping,
    /// Armed, one instruction has run.
    Stepped,
}

/// Halt request raised by an external debugger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HaltRequest {
    #[default]
    None,
    Regular,
    Group,
}

/// Architectural and bookkeeping state of one hart.
pub struct HartState {
    pub pc: WordType,
    pub prv: PrivilegeLevel,
    pub reg_file: RegFile,
    pub csr: CsrRegFile,
    pub vu: VectorUnit,

    pub debug_mode: bool,
    pub single_step: SingleStep,
    /// Set once a serialize-before instruction asked to be re-run on its own.
    pub serialized: bool,

    /// Effects of the instruction currently executing.
    pub diag: DiagnosticRecord,
}

impl HartState {
    pub fn new(hart_id: u64) -> Self {
        Self {
            pc: DEFAULT_PC_VALUE,
            prv: PrivilegeLevel::M,
            reg_file: RegFile::new(),
            csr: CsrRegFile::new(hart_id),
            vu: VectorUnit::new(),
            debug_mode: false,
            single_step: SingleStep::None,
            serialized: false,
            diag: DiagnosticRecord::default(),
        }
    }

    /// Triggers allowed to fire right now. Breakpoint exceptions are held off in M-mode with
    /// interrupts disabled, which covers every M-mode trap handler prologue.
    pub fn trigger_gate(&self) -> TriggerGate {
        if self.debug_mode {
            TriggerGate::Closed
        } else if self.prv == PrivilegeLevel::M && !self.csr.mstatus.contains(Mstatus::MIE) {
            TriggerGate::DebugModeOnly
        } else {
            TriggerGate::Open
        }
    }

    /// Read any CSR, vector CSRs included. Does not check privilege.
    pub fn read_csr(&self, idx: u16) -> Option<WordType> {
        self.vu.read_csr(idx).or_else(|| self.csr.read(idx))
    }

    /// Write any CSR, vector CSRs included. Does not check privilege.
    pub fn write_csr(&mut self, idx: u16, val: WordType) -> Option<()> {
        if self.vu.read_csr(idx).is_some() {
            return self.vu.write_csr(idx, val);
        }
        self.csr.write(idx, val)
    }
}
