pub mod fixed_point;
pub(crate) mod vloop;

use crate::{
    config::arch_config::{ELEN, VLEN, VLENB, XLEN},
    isa::riscv::csr_reg::csr_index,
    utils::truncate_bits,
};

pub use fixed_point::RoundingMode;

/// Vector register file: 32 registers of `VLENB` bytes each.
pub struct VectorRegFile {
    data: [[u8; VLENB]; 32],
}

impl Default for VectorRegFile {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorRegFile {
    pub fn new() -> Self {
        Self {
            data: [[0u8; VLENB]; 32],
        }
    }

    #[inline(always)]
    fn locate(base: u8, sew: u32, idx: u64) -> (usize, usize) {
        let bytes = (sew / 8) as usize;
        let per_reg = VLENB / bytes;
        let idx = idx as usize;
        (base as usize + idx / per_reg, (idx % per_reg) * bytes)
    }

    /// Element `idx` of the register group starting at `base`, zero-extended.
    pub fn read_elem(&self, base: u8, sew: u32, idx: u64) -> u64 {
        let (reg, off) = Self::locate(base, sew, idx);
        let mut buf = [0u8; 8];
        let bytes = (sew / 8) as usize;
        buf[..bytes].copy_from_slice(&self.data[reg][off..off + bytes]);
        u64::from_le_bytes(buf)
    }

    /// Write the low `sew` bits of `val` to element `idx` of the group starting at `base`.
    pub fn write_elem(&mut self, base: u8, sew: u32, idx: u64, val: u64) {
        let (reg, off) = Self::locate(base, sew, idx);
        let bytes = (sew / 8) as usize;
        self.data[reg][off..off + bytes].copy_from_slice(&val.to_le_bytes()[..bytes]);
    }

    /// Mask bit for element `idx`, held in `v0`.
    pub fn mask_bit(&self, idx: u64) -> bool {
        let idx = idx as usize;
        (self.data[0][idx / 8] >> (idx % 8)) & 1 != 0
    }

    pub fn reg_bytes(&self, reg: u8) -> &[u8; VLENB] {
        &self.data[reg as usize]
    }
}

/// Decoded `vtype` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vtype {
    pub sew: u32,
    /// log2 of LMUL, in `-3..=3`.
    pub lmul_log2: i32,
    pub vta: bool,
    pub vma: bool,
    pub vill: bool,
}

impl Vtype {
    const VILL: Vtype = Vtype {
        sew: 8,
        lmul_log2: 0,
        vta: false,
        vma: false,
        vill: true,
    };

    pub fn decode(raw: u64) -> Self {
        let vsew = (raw >> 3) & 0b111;
        let sew = 8u32 << vsew;
        // sign-extend the 3-bit vlmul field
        let lmul_log2 = (((raw & 0b111) as i8) << 5 >> 5) as i32;

        let lmul_legal = (-3..=3).contains(&lmul_log2);
        let sew_legal = if lmul_log2 >= 0 {
            sew as usize <= ELEN
        } else {
            sew as usize <= ELEN >> -lmul_log2
        };
        if !lmul_legal || !sew_legal || raw >> 8 != 0 {
            return Self::VILL;
        }

        Vtype {
            sew,
            lmul_log2,
            vta: raw & (1 << 6) != 0,
            vma: raw & (1 << 7) != 0,
            vill: false,
        }
    }

    /// Largest `vl` for this configuration.
    pub fn vlmax(&self) -> u64 {
        if self.vill {
            return 0;
        }
        let per_reg = (VLEN as u64) / self.sew as u64;
        if self.lmul_log2 >= 0 {
            per_reg << self.lmul_log2
        } else {
            per_reg >> -self.lmul_log2
        }
    }
}

/// Architectural vector state: register file plus configuration and fixed-point CSRs.
pub struct VectorUnit {
    pub reg_file: VectorRegFile,
    vtype_raw: u64,
    vtype: Vtype,
    vlmax: u64,
    pub vl: u64,
    pub vstart: u64,
    pub vxrm: RoundingMode,
    pub vxsat: bool,
}

impl Default for VectorUnit {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorUnit {
    const VILL_RAW: u64 = 1 << (XLEN - 1);

    pub fn new() -> Self {
        Self {
            reg_file: VectorRegFile::new(),
            vtype_raw: Self::VILL_RAW,
            vtype: Vtype::VILL,
            vlmax: 0,
            vl: 0,
            vstart: 0,
            vxrm: RoundingMode::Rnu,
            vxsat: false,
        }
    }

    pub fn vtype(&self) -> &Vtype {
        &self.vtype
    }

    pub fn vtype_raw(&self) -> u64 {
        self.vtype_raw
    }

    pub fn sew(&self) -> u32 {
        self.vtype.sew
    }

    pub fn vlmax(&self) -> u64 {
        self.vlmax
    }

    /// Apply a `vset{i}vl{i}` request and return the new `vl`.
    ///
    /// `rs1_is_x0` selects the keep-`vl` (`rd == x0`) or use-VLMAX (`rd != x0`) forms.
    pub fn set_vl(&mut self, rd: u8, rs1_is_x0: bool, avl: u64, new_type: u64) -> u64 {
        if self.vtype_raw != new_type {
            self.vtype = Vtype::decode(new_type);
            self.vlmax = self.vtype.vlmax();
            self.vtype_raw = if self.vtype.vill {
                Self::VILL_RAW
            } else {
                new_type
            };
        }

        self.vl = if self.vlmax == 0 {
            0
        } else if rs1_is_x0 && rd == 0 {
            self.vl.min(self.vlmax)
        } else if rs1_is_x0 {
            self.vlmax
        } else {
            avl.min(self.vlmax)
        };

        self.vstart = 0;
        self.vl
    }

    pub fn is_vector_csr(idx: u16) -> bool {
        matches!(
            idx,
            csr_index::vstart
                | csr_index::vxsat
                | csr_index::vxrm
                | csr_index::vcsr
                | csr_index::vl
                | csr_index::vtype
                | csr_index::vlenb
        )
    }

    /// Read a vector CSR. `None` if `idx` is not one.
    pub fn read_csr(&self, idx: u16) -> Option<u64> {
        let value = match idx {
            csr_index::vstart => self.vstart,
            csr_index::vxsat => self.vxsat as u64,
            csr_index::vxrm => u8::from(self.vxrm) as u64,
            csr_index::vcsr => (u8::from(self.vxrm) as u64) << 1 | self.vxsat as u64,
            csr_index::vl => self.vl,
            csr_index::vtype => self.vtype_raw,
            csr_index::vlenb => VLENB as u64,
            _ => return None,
        };
        Some(value)
    }

    /// Write a vector CSR. `vl`, `vtype` and `vlenb` are read-only.
    pub fn write_csr(&mut self, idx: u16, val: u64) -> Option<()> {
        match idx {
            csr_index::vstart => self.vstart = truncate_bits(val, VLEN.trailing_zeros()),
            csr_index::vxsat => self.vxsat = val & 1 != 0,
            csr_index::vxrm => self.vxrm = RoundingMode::from_bits(val),
            csr_index::vcsr => {
                self.vxsat = val & 1 != 0;
                self.vxrm = RoundingMode::from_bits(val >> 1);
            }
            _ => return None,
        }
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vtype_decode() {
        // e32, m1
        let t = Vtype::decode(0b010_000);
        assert_eq!(t.sew, 32);
        assert_eq!(t.lmul_log2, 0);
        assert!(!t.vill);
        assert_eq!(t.vlmax(), 4);

        // e8, mf2
        let t = Vtype::decode(0b000_111);
        assert_eq!(t.lmul_log2, -1);
        assert_eq!(t.vlmax(), 8);

        // e64, mf2 exceeds ELEN * LMUL
        assert!(Vtype::decode(0b011_111).vill);
        // reserved vlmul
        assert!(Vtype::decode(0b000_100).vill);
        // e128
        assert!(Vtype::decode(0b100_000).vill);
        // reserved high bits
        assert!(Vtype::decode(1 << 8).vill);
    }

    #[test]
    fn test_set_vl_forms() {
        let mut vu = VectorUnit::new();
        let e32m2 = 0b010_001;

        assert_eq!(vu.set_vl(1, false, 5, e32m2), 5);
        assert_eq!(vu.set_vl(1, false, 100, e32m2), 8);
        // rd != x0, rs1 == x0: VLMAX
        assert_eq!(vu.set_vl(1, true, 0, 0b010_000), 4);
        // rd == rs1 == x0: keep vl, clamped to the new VLMAX
        assert_eq!(vu.set_vl(0, true, 0, 0b011_000), 2);
        assert_eq!(vu.vtype_raw(), 0b011_000);
    }

    #[test]
    fn test_set_vl_illegal_type() {
        let mut vu = VectorUnit::new();
        vu.set_vl(1, false, 4, 0b010_000);
        vu.vstart = 3;
        assert_eq!(vu.set_vl(1, false, 4, 0b000_100), 0);
        assert!(vu.vtype().vill);
        assert_eq!(vu.vtype_raw(), 1 << 63);
        assert_eq!(vu.vstart, 0);
    }

    #[test]
    fn test_elements_span_register_group() {
        let mut rf = VectorRegFile::new();
        // 4 x e32 per register, element 5 lives in v9
        rf.write_elem(8, 32, 5, 0x1234_5678_9abc);
        assert_eq!(rf.read_elem(8, 32, 5), 0x5678_9abc);
        assert_eq!(&rf.reg_bytes(9)[4..8], &[0xbc, 0x9a, 0x78, 0x56]);
        assert_eq!(rf.read_elem(8, 32, 1), 0);
    }

    #[test]
    fn test_vcsr_view() {
        let mut vu = VectorUnit::new();
        vu.write_csr(csr_index::vcsr, 0b101).unwrap();
        assert_eq!(vu.vxrm, RoundingMode::Rdn);
        assert!(vu.vxsat);
        assert_eq!(vu.read_csr(csr_index::vxrm), Some(2));
        assert_eq!(vu.read_csr(csr_index::vlenb), Some(16));
        assert_eq!(vu.write_csr(csr_index::vl, 3), None);
        assert!(VectorUnit::is_vector_csr(csr_index::vlenb));
        assert!(!VectorUnit::is_vector_csr(csr_index::mstatus));
    }
}
