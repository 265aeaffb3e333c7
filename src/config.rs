#![allow(unused)]

pub mod ram_config {
    use crate::config::arch_config::WordType;
    pub const BASE_ADDR: WordType = 0x8000_0000;
    pub const DEFAULT_PC_VALUE: WordType = BASE_ADDR;

    pub const SIZE: usize = 0x100_0000;
}

/// Layout of the debug ROM the hart parks in while in debug mode.
pub mod debug_rom {
    use crate::config::arch_config::WordType;

    pub const BASE_ADDR: WordType = 0x0;
    pub const SIZE: usize = 0x1000;

    /// Entry point on debug-mode entry and on breakpoints taken in debug mode.
    pub const ENTRY: WordType = 0x800;
    /// Target of every other trap taken in debug mode.
    pub const TVEC: WordType = 0x808;
}

pub mod arch_config {
    use crate::gen_name_list;

    pub type WordType = u64;
    pub type SignedWordType = i64;

    pub const XLEN: usize = 64;

    pub const REGFILE_CNT: usize = 32;

    pub const REG_NAME: [&str; REGFILE_CNT] = [
        "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0/fp", "s1", "a0", "a1", "a2", "a3",
        "a4", "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11",
        "t3", "t4", "t5", "t6",
    ];

    /// Vector register width in bits.
    pub const VLEN: usize = 128;
    pub const VLENB: usize = VLEN / 8;
    /// Widest supported vector element in bits.
    pub const ELEN: usize = 64;

    pub const VREG_NAME: [&str; 32] = gen_name_list!("v"; 0, 31);
}

/// Per-hart construction parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HartConfig {
    pub hart_id: u64,
    /// Number of direct-mapped instruction cache entries, must be a power of two.
    pub icache_entries: usize,
    /// Forces the single-step path and prints each fetched instruction.
    pub ext_debug: bool,
    pub addr_history: bool,
    pub pc_histogram: bool,
    /// Floating-point register width reported in diagnostics (0 when absent).
    pub flen: u32,
}

impl Default for HartConfig {
    fn default() -> Self {
        Self {
            hart_id: 0,
            icache_entries: 1024,
            ext_debug: false,
            addr_history: false,
            pc_histogram: false,
            flen: 0,
        }
    }
}

impl HartConfig {
    pub fn with_hart_id(mut self, hart_id: u64) -> Self {
        self.hart_id = hart_id;
        self
    }

    pub fn with_icache_entries(mut self, entries: usize) -> Self {
        self.icache_entries = entries;
        self
    }

    pub fn with_ext_debug(mut self, ext_debug: bool) -> Self {
        self.ext_debug = ext_debug;
        self
    }

    pub fn with_addr_history(mut self, enable: bool) -> Self {
        self.addr_history = enable;
        self
    }

    pub fn with_pc_histogram(mut self, enable: bool) -> Self {
        self.pc_histogram = enable;
        self
    }

    pub fn with_flen(mut self, flen: u32) -> Self {
        self.flen = flen;
        self
    }
}
