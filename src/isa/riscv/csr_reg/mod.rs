use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use phf::phf_map;

use crate::{
    config::arch_config::WordType,
    isa::riscv::{
        debugger::DebugCause,
        trap::{Exception, Interrupt},
    },
};

macro_rules! gen_csr_index {
    ($(($name: ident, $name_str: literal, $addr: literal)),* $(,)? ) => {
        #[rustfmt::skip]
        #[allow(non_upper_case_globals, unused)]
        pub mod csr_index {
            $(
                pub const $name: u16 = $addr;
            )*
        }

        pub const CSR_ADDRESS: phf::Map<&'static str, u16> = phf_map! {
            $(
                $name_str => $addr
            ),*
        };

        pub const CSR_NAME: phf::Map<u16, &'static str> = phf_map! {
            $(
                $addr => $name_str
            ),*
        };
    };
}

gen_csr_index! {
    (vstart,    "vstart",     0x008u16),
    (vxsat,     "vxsat",      0x009u16),
    (vxrm,      "vxrm",       0x00Au16),
    (vcsr,      "vcsr",       0x00Fu16),

    (sstatus,   "sstatus",    0x100u16),
    (sie,       "sie",        0x104u16),
    (stvec,     "stvec",      0x105u16),
    (sscratch,  "sscratch",   0x140u16),
    (sepc,      "sepc",       0x141u16),
    (scause,    "scause",     0x142u16),
    (stval,     "stval",      0x143u16),
    (sip,       "sip",        0x144u16),
    (satp,      "satp",       0x180u16),

    (mstatus,   "mstatus",    0x300u16),
    (misa,      "misa",       0x301u16),
    (medeleg,   "medeleg",    0x302u16),
    (mideleg,   "mideleg",    0x303u16),
    (mie,       "mie",        0x304u16),
    (mtvec,     "mtvec",      0x305u16),
    (mscratch,  "mscratch",   0x340u16),
    (mepc,      "mepc",       0x341u16),
    (mcause,    "mcause",     0x342u16),
    (mtval,     "mtval",      0x343u16),
    (mip,       "mip",        0x344u16),

    (dcsr,      "dcsr",       0x7B0u16),
    (dpc,       "dpc",        0x7B1u16),
    (dscratch0, "dscratch0",  0x7B2u16),
    (dscratch1, "dscratch1",  0x7B3u16),

    (mcycle,    "mcycle",     0xB00u16),
    (minstret,  "minstret",   0xB02u16),

    (cycle,     "cycle",      0xC00u16),
    (instret,   "instret",    0xC02u16),
    (vl,        "vl",         0xC20u16),
    (vtype,     "vtype",      0xC21u16),
    (vlenb,     "vlenb",      0xC22u16),

    (mhartid,   "mhartid",    0xF14u16),
}

/// `mhpmcounter3` .. `mhpmcounter31` follow `minstret`.
pub const MHPMCOUNTER_FIRST: u16 = 0xB03;
pub const MHPMCOUNTER_LAST: u16 = 0xB1F;

/// Human-readable name of a CSR, for diagnostics.
pub fn csr_name(idx: u16) -> Option<&'static str> {
    CSR_NAME.get(&idx).copied()
}

#[repr(u8)]
#[derive(
    Debug, PartialEq, PartialOrd, Ord, Eq, Clone, Copy, IntoPrimitive, TryFromPrimitive,
)]
pub enum PrivilegeLevel {
    U = 0,
    S = 1,
    M = 3,
}

impl PrivilegeLevel {
    /// Lowest privilege allowed to touch `csr`, encoded in its address.
    pub fn required_by_csr(csr: u16) -> u8 {
        ((csr >> 8) & 0b11) as u8
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Mstatus: u64 {
        const SIE  = 1 << 1;
        const MIE  = 1 << 3;
        const SPIE = 1 << 5;
        const MPIE = 1 << 7;
        const SPP  = 1 << 8;
        const VS   = 0b11 << 9;
        const MPP  = 0b11 << 11;
        const FS   = 0b11 << 13;
        const MPRV = 1 << 17;
        const SUM  = 1 << 18;
        const MXR  = 1 << 19;
        const TVM  = 1 << 20;
        const TW   = 1 << 21;
        const TSR  = 1 << 22;
        const UXL  = 0b11 << 32;
        const SXL  = 0b11 << 34;
        const SD   = 1 << 63;
    }
}

const MSTATUS_WRITE_MASK: Mstatus = Mstatus::SIE
    .union(Mstatus::MIE)
    .union(Mstatus::SPIE)
    .union(Mstatus::MPIE)
    .union(Mstatus::SPP)
    .union(Mstatus::VS)
    .union(Mstatus::MPP)
    .union(Mstatus::FS)
    .union(Mstatus::MPRV)
    .union(Mstatus::SUM)
    .union(Mstatus::MXR)
    .union(Mstatus::TVM)
    .union(Mstatus::TW)
    .union(Mstatus::TSR);

const SSTATUS_READ_MASK: Mstatus = Mstatus::SIE
    .union(Mstatus::SPIE)
    .union(Mstatus::SPP)
    .union(Mstatus::VS)
    .union(Mstatus::FS)
    .union(Mstatus::SUM)
    .union(Mstatus::MXR)
    .union(Mstatus::UXL)
    .union(Mstatus::SD);

const SSTATUS_WRITE_MASK: Mstatus = SSTATUS_READ_MASK
    .difference(Mstatus::UXL)
    .difference(Mstatus::SD);

impl Mstatus {
    const MPP_SHIFT: u32 = 11;
    const VS_SHIFT: u32 = 9;

    pub fn mpp(&self) -> PrivilegeLevel {
        PrivilegeLevel::try_from(((self.bits() >> Self::MPP_SHIFT) & 0b11) as u8)
            .unwrap_or(PrivilegeLevel::U)
    }

    pub fn set_mpp(&mut self, prv: PrivilegeLevel) {
        let bits = (self.bits() & !Mstatus::MPP.bits()) | ((prv as u64) << Self::MPP_SHIFT);
        *self = Mstatus::from_bits_retain(bits);
    }

    pub fn spp(&self) -> PrivilegeLevel {
        if self.contains(Mstatus::SPP) {
            PrivilegeLevel::S
        } else {
            PrivilegeLevel::U
        }
    }

    pub fn vs_enabled(&self) -> bool {
        self.intersects(Mstatus::VS)
    }

    pub fn set_vs_dirty(&mut self) {
        self.insert(Mstatus::VS | Mstatus::SD);
    }

    fn set_vs_initial(&mut self) {
        let bits = (self.bits() & !Mstatus::VS.bits()) | (1 << Self::VS_SHIFT);
        *self = Mstatus::from_bits_retain(bits);
    }
}

/// Debug control and status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dcsr {
    pub prv: PrivilegeLevel,
    pub step: bool,
    pub ebreakm: bool,
    pub ebreaks: bool,
    pub ebreaku: bool,
    pub stepie: bool,
    pub halt: bool,
    pub cause: DebugCause,
}

impl Dcsr {
    const XDEBUGVER: u64 = 4;

    fn new() -> Self {
        Self {
            prv: PrivilegeLevel::M,
            step: false,
            ebreakm: false,
            ebreaks: false,
            ebreaku: false,
            stepie: false,
            halt: false,
            cause: DebugCause::None,
        }
    }

    pub fn read(&self) -> WordType {
        (Self::XDEBUGVER << 28)
            | (self.ebreakm as u64) << 15
            | (self.ebreaks as u64) << 13
            | (self.ebreaku as u64) << 12
            | (self.stepie as u64) << 11
            | (u8::from(self.cause) as u64) << 6
            | (self.halt as u64) << 3
            | (self.step as u64) << 2
            | u8::from(self.prv) as u64
    }

    /// `cause` and the version field are read-only.
    pub fn write(&mut self, val: WordType) {
        if let Ok(prv) = PrivilegeLevel::try_from((val & 0b11) as u8) {
            self.prv = prv;
        }
        self.step = val & (1 << 2) != 0;
        self.halt = val & (1 << 3) != 0;
        self.stepie = val & (1 << 11) != 0;
        self.ebreaku = val & (1 << 12) != 0;
        self.ebreaks = val & (1 << 13) != 0;
        self.ebreakm = val & (1 << 15) != 0;
    }

    /// Whether `ebreak` at `prv` enters debug mode instead of trapping.
    pub fn ebreak_enters_debug(&self, prv: PrivilegeLevel) -> bool {
        match prv {
            PrivilegeLevel::M => self.ebreakm,
            PrivilegeLevel::S => self.ebreaks,
            PrivilegeLevel::U => self.ebreaku,
        }
    }
}

const S_INTERRUPTS: WordType = (1 << 1) | (1 << 5) | (1 << 9);
const ALL_INTERRUPTS: WordType = S_INTERRUPTS | (1 << 3) | (1 << 7) | (1 << 11);
const MIP_WRITE_MASK: WordType = S_INTERRUPTS;
const MEDELEG_WRITE_MASK: WordType = 0xB3FF & !(1 << 11);

/// Scalar control and status registers. Vector CSRs live in the vector unit.
pub struct CsrRegFile {
    pub mstatus: Mstatus,
    pub misa: WordType,
    pub medeleg: WordType,
    pub mideleg: WordType,
    pub mie: WordType,
    pub mip: WordType,
    pub mtvec: WordType,
    pub mscratch: WordType,
    pub mepc: WordType,
    pub mcause: WordType,
    pub mtval: WordType,

    pub stvec: WordType,
    pub sscratch: WordType,
    pub sepc: WordType,
    pub scause: WordType,
    pub stval: WordType,
    pub satp: WordType,

    pub mhartid: WordType,
    pub minstret: u64,
    pub mcycle: u64,
    /// Indices 3..=31 are `mhpmcounter3` .. `mhpmcounter31`.
    pub mhpmcounter: [u64; 32],

    pub dcsr: Dcsr,
    pub dpc: WordType,
    pub dscratch0: WordType,
    pub dscratch1: WordType,
}

impl CsrRegFile {
    pub fn new(hart_id: u64) -> Self {
        let misa_ext = |c: u8| 1u64 << (c - b'A');
        let mut mstatus = Mstatus::from_bits_retain((2 << 32) | (2 << 34));
        mstatus.set_vs_initial();

        Self {
            mstatus,
            misa: (2 << 62) | misa_ext(b'I') | misa_ext(b'S') | misa_ext(b'U') | misa_ext(b'V'),
            medeleg: 0,
            mideleg: 0,
            mie: 0,
            mip: 0,
            mtvec: 0,
            mscratch: 0,
            mepc: 0,
            mcause: 0,
            mtval: 0,
            stvec: 0,
            sscratch: 0,
            sepc: 0,
            scause: 0,
            stval: 0,
            satp: 0,
            mhartid: hart_id,
            minstret: 0,
            mcycle: 0,
            mhpmcounter: [0; 32],
            dcsr: Dcsr::new(),
            dpc: 0,
            dscratch0: 0,
            dscratch1: 0,
        }
    }

    pub fn read(&self, idx: u16) -> Option<WordType> {
        let value = match idx {
            csr_index::sstatus => (self.mstatus & SSTATUS_READ_MASK).bits(),
            csr_index::sie => self.mie & self.mideleg & S_INTERRUPTS,
            csr_index::stvec => self.stvec,
            csr_index::sscratch => self.sscratch,
            csr_index::sepc => self.sepc,
            csr_index::scause => self.scause,
            csr_index::stval => self.stval,
            csr_index::sip => self.mip & self.mideleg & S_INTERRUPTS,
            csr_index::satp => self.satp,

            csr_index::mstatus => self.mstatus.bits(),
            csr_index::misa => self.misa,
            csr_index::medeleg => self.medeleg,
            csr_index::mideleg => self.mideleg,
            csr_index::mie => self.mie,
            csr_index::mtvec => self.mtvec,
            csr_index::mscratch => self.mscratch,
            csr_index::mepc => self.mepc,
            csr_index::mcause => self.mcause,
            csr_index::mtval => self.mtval,
            csr_index::mip => self.mip,

            csr_index::dcsr => self.dcsr.read(),
            csr_index::dpc => self.dpc,
            csr_index::dscratch0 => self.dscratch0,
            csr_index::dscratch1 => self.dscratch1,

            csr_index::mcycle | csr_index::cycle => self.mcycle,
            csr_index::minstret | csr_index::instret => self.minstret,
            MHPMCOUNTER_FIRST..=MHPMCOUNTER_LAST => {
                self.mhpmcounter[(idx - csr_index::mcycle) as usize]
            }
            csr_index::mhartid => self.mhartid,
            _ => return None,
        };
        Some(value)
    }

    pub fn write(&mut self, idx: u16, val: WordType) -> Option<()> {
        match idx {
            csr_index::sstatus => {
                let kept = self.mstatus.difference(SSTATUS_WRITE_MASK);
                let new = Mstatus::from_bits_retain(val).intersection(SSTATUS_WRITE_MASK);
                self.mstatus = kept.union(new);
            }
            csr_index::sie => {
                let mask = self.mideleg & S_INTERRUPTS;
                self.mie = (self.mie & !mask) | (val & mask);
            }
            csr_index::stvec => self.stvec = val & !0b10,
            csr_index::sscratch => self.sscratch = val,
            csr_index::sepc => self.sepc = val & !0b11,
            csr_index::scause => self.scause = val,
            csr_index::stval => self.stval = val,
            csr_index::sip => {
                let mask = self.mideleg & (1 << 1);
                self.mip = (self.mip & !mask) | (val & mask);
            }
            csr_index::satp => self.satp = val,

            csr_index::mstatus => {
                let old_mpp = self.mstatus.mpp();
                let kept = self.mstatus.difference(MSTATUS_WRITE_MASK);
                let new = Mstatus::from_bits_retain(val).intersection(MSTATUS_WRITE_MASK);
                self.mstatus = kept.union(new);
                // reserved MPP encoding keeps the previous value
                if (val >> 11) & 0b11 == 2 {
                    self.mstatus.set_mpp(old_mpp);
                }
            }
            csr_index::misa => {}
            csr_index::medeleg => self.medeleg = val & MEDELEG_WRITE_MASK,
            csr_index::mideleg => self.mideleg = val & S_INTERRUPTS,
            csr_index::mie => self.mie = val & ALL_INTERRUPTS,
            csr_index::mtvec => self.mtvec = val & !0b10,
            csr_index::mscratch => self.mscratch = val,
            csr_index::mepc => self.mepc = val & !0b11,
            csr_index::mcause => self.mcause = val,
            csr_index::mtval => self.mtval = val,
            csr_index::mip => self.mip = (self.mip & !MIP_WRITE_MASK) | (val & MIP_WRITE_MASK),

            csr_index::dcsr => self.dcsr.write(val),
            csr_index::dpc => self.dpc = val & !0b11,
            csr_index::dscratch0 => self.dscratch0 = val,
            csr_index::dscratch1 => self.dscratch1 = val,

            csr_index::mcycle => self.mcycle = val,
            csr_index::minstret => self.minstret = val,
            MHPMCOUNTER_FIRST..=MHPMCOUNTER_LAST => {
                self.mhpmcounter[(idx - csr_index::mcycle) as usize] = val
            }
            _ => return None,
        }
        Some(())
    }

    /// Count one event on `mhpmcounter[n]`.
    pub fn bump_hpm(&mut self, n: usize) {
        self.mhpmcounter[n] = self.mhpmcounter[n].wrapping_add(1);
    }

    pub fn set_interrupt_pending(&mut self, interrupt: Interrupt, pending: bool) {
        if pending {
            self.mip |= interrupt.mask();
        } else {
            self.mip &= !interrupt.mask();
        }
    }

    pub fn is_exception_delegated(&self, exception: Exception) -> bool {
        self.medeleg & (1 << u64::from(exception)) != 0
    }

    pub fn is_interrupt_delegated(&self, interrupt: Interrupt) -> bool {
        self.mideleg & interrupt.mask() != 0
    }
}
