#![cfg_attr(debug_assertions, allow(dead_code))]
#![feature(likely_unlikely)]

mod cpu;
mod ram;
mod utils;

pub mod config;
pub mod isa;
pub mod load;

pub use config::ram_config;
pub use cpu::RegFile;
pub use ram::{MemError, Ram};
pub use utils::UnsignedInteger;

use crate::{
    config::{HartConfig, arch_config::WordType},
    isa::riscv::executor::Hart,
    load::LoadError,
};

/// Counters reported once [`Emulator::run`] stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub retired: u64,
    pub cycles: u64,
    /// The run stopped because the hart parked in debug mode.
    pub halted: bool,
}

/// Drives one [`Hart`] in fixed-size batches.
pub struct Emulator {
    hart: Hart,
}

impl Emulator {
    pub fn from_binary(bytes: &[u8], config: HartConfig) -> Result<Self, LoadError> {
        let mut ram = Ram::new();
        let entry = load::load_bin(&mut ram, bytes)?;
        Ok(Self::with_entry(ram, entry, config))
    }

    pub fn from_elf(bytes: &[u8], config: HartConfig) -> Result<Self, LoadError> {
        let mut ram = Ram::new();
        let entry = load::load_elf(&mut ram, bytes)?;
        Ok(Self::with_entry(ram, entry, config))
    }

    fn with_entry(ram: Ram, entry: WordType, config: HartConfig) -> Self {
        let mut hart = Hart::from_ram(ram, config);
        hart.state.pc = entry;
        Self { hart }
    }

    pub fn from_hart(hart: Hart) -> Self {
        Self { hart }
    }

    pub fn hart(&self) -> &Hart {
        &self.hart
    }

    pub fn hart_mut(&mut self) -> &mut Hart {
        &mut self.hart
    }

    /// Step in batches of `batch` until `max_retired` instructions have retired or the hart
    /// enters debug mode.
    pub fn run(&mut self, max_retired: u64, batch: usize) -> RunSummary {
        let start = self.hart.minstret();
        let batch = batch.max(1) as u64;

        let mut halted = false;
        loop {
            let retired = self.hart.minstret().wrapping_sub(start);
            if retired >= max_retired {
                break;
            }
            if self.hart.state.debug_mode {
                halted = true;
                break;
            }
            self.hart.step(batch.min(max_retired - retired) as usize);
        }

        RunSummary {
            retired: self.hart.minstret().wrapping_sub(start),
            cycles: self.hart.state.csr.mcycle,
            halted,
        }
    }
}
