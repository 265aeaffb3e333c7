use std::fmt::Display;

use crate::{
    config::arch_config::WordType,
    isa::{
        DecoderTrait,
        riscv::instruction::{
            InstrFormat, RVInstrInfo,
            instr_table::{
                RVInstrDesc, RiscvInstr, TABLE_RV64I, TABLE_RVSYSTEM, TABLE_RVV, TABLE_RVZICSR,
                TABLE_RVZIFENCEI,
            },
        },
        utils::{DecodeMask, ISABuilder},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeInstr(pub RiscvInstr, pub RVInstrInfo);

impl Display for DecodeInstr {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} {:?}", self.0.name().to_lowercase(), self.1)
    }
}

/// Linear mask/match decoder over the supported instruction tables.
pub struct Decoder {
    masks: Vec<(DecodeMask, RiscvInstr, InstrFormat)>,
}

impl Decoder {
    pub fn new() -> Self {
        let isa = ISABuilder::new()
            .add(TABLE_RV64I)
            .add(TABLE_RVZIFENCEI)
            .add(TABLE_RVSYSTEM)
            .add(TABLE_RVZICSR)
            .add(TABLE_RVV)
            .build();
        Self::from_isa(&isa)
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DecoderTrait<RVInstrDesc, DecodeInstr> for Decoder {
    fn from_isa(instrs: &[RVInstrDesc]) -> Self {
        Self {
            masks: instrs
                .iter()
                .map(|desc| (desc.mask, desc.instr, desc.format))
                .collect(),
        }
    }

    fn decode(&self, raw_instr: u32) -> Option<DecodeInstr> {
        self.masks
            .iter()
            .find(|(mask, _, _)| mask.matches(raw_instr))
            .map(|(_, instr, fmt)| DecodeInstr(*instr, decode_info(raw_instr, *fmt)))
    }
}

fn decode_info(raw_instr: u32, fmt: InstrFormat) -> RVInstrInfo {
    let rd = ((raw_instr >> 7) & 0b11111) as u8;
    let rs1 = ((raw_instr >> 15) & 0b11111) as u8;
    let rs2 = ((raw_instr >> 20) & 0b11111) as u8;
    let vm = (raw_instr >> 25) & 1 != 0;

    match fmt {
        InstrFormat::R => RVInstrInfo::R { rd, rs1, rs2 },
        InstrFormat::I => RVInstrInfo::I {
            rd,
            rs1,
            imm: ((raw_instr >> 20) & 0xFFF) as WordType,
        },
        InstrFormat::S => {
            let imm = (((raw_instr >> 25) & 0x7F) << 5) | ((raw_instr >> 7) & 0b11111);
            RVInstrInfo::S {
                rs1,
                rs2,
                imm: imm as WordType,
            }
        }
        InstrFormat::U => RVInstrInfo::U {
            rd,
            imm: ((raw_instr >> 12) << 12) as WordType,
        },
        InstrFormat::B => {
            let imm = (((raw_instr >> 31) & 1) << 12)
                | (((raw_instr >> 7) & 1) << 11)
                | (((raw_instr >> 25) & 0b111111) << 5)
                | (((raw_instr >> 8) & 0b1111) << 1);
            RVInstrInfo::B {
                rs1,
                rs2,
                imm: imm as WordType,
            }
        }
        InstrFormat::J => {
            let imm = (((raw_instr >> 31) & 1) << 20)
                | (((raw_instr >> 12) & 0xFF) << 12)
                | (((raw_instr >> 20) & 1) << 11)
                | (((raw_instr >> 21) & 0x3FF) << 1);
            RVInstrInfo::J {
                rd,
                imm: imm as WordType,
            }
        }
        InstrFormat::Csr => RVInstrInfo::Csr {
            rd,
            rs1,
            csr: (raw_instr >> 20) as u16,
        },
        InstrFormat::V => RVInstrInfo::V {
            vd: rd,
            vs1: rs1,
            vs2: rs2,
            vm,
        },
        InstrFormat::VMem => RVInstrInfo::VMem { vd: rd, rs1, vm },
        InstrFormat::VSetVli => RVInstrInfo::VSet {
            rd,
            rs1,
            rs2: 0,
            zimm: ((raw_instr >> 20) & 0x7FF) as u16,
        },
        InstrFormat::VSetIvli => RVInstrInfo::VSet {
            rd,
            rs1,
            rs2: 0,
            zimm: ((raw_instr >> 20) & 0x3FF) as u16,
        },
        InstrFormat::VSetVl => RVInstrInfo::VSet {
            rd,
            rs1,
            rs2,
            zimm: 0,
        },
        InstrFormat::None => RVInstrInfo::None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha12Rng;

    use super::*;

    pub(crate) fn get_instr_r(opcode: u8, funct3: u8, funct7: u8, rd: u8, rs1: u8, rs2: u8) -> u32 {
        (opcode as u32)
            | ((rd as u32) << 7)
            | ((funct3 as u32) << 12)
            | ((rs1 as u32) << 15)
            | ((rs2 as u32) << 20)
            | ((funct7 as u32) << 25)
    }

    pub(crate) fn get_instr_i(opcode: u8, funct3: u8, rd: u8, rs1: u8, imm: u32) -> u32 {
        (opcode as u32)
            | ((rd as u32) << 7)
            | ((funct3 as u32) << 12)
            | ((rs1 as u32) << 15)
            | ((imm & 0xFFF) << 20)
    }

    pub(crate) fn get_instr_s(opcode: u8, funct3: u8, rs1: u8, rs2: u8, imm: u32) -> u32 {
        (opcode as u32)
            | ((imm & 0b11111) << 7)
            | ((funct3 as u32) << 12)
            | ((rs1 as u32) << 15)
            | ((rs2 as u32) << 20)
            | (((imm >> 5) & 0x7F) << 25)
    }

    pub(crate) fn get_instr_b(opcode: u8, funct3: u8, rs1: u8, rs2: u8, imm: u32) -> u32 {
        (opcode as u32)
            | ((imm >> 11) & 1) << 7
            | ((imm >> 1) & 0b1111) << 8
            | ((funct3 as u32) << 12)
            | ((rs1 as u32) << 15)
            | ((rs2 as u32) << 20)
            | ((imm >> 5) & 0x3F) << 25
            | ((imm >> 12) & 1) << 31
    }

    pub(crate) fn get_instr_j(opcode: u8, rd: u8, imm: u32) -> u32 {
        (opcode as u32)
            | ((rd as u32) << 7)
            | (((imm >> 12) & 0xFF) << 12)
            | (((imm >> 11) & 1) << 20)
            | (((imm >> 1) & 0x3FF) << 21)
            | (((imm >> 20) & 1) << 31)
    }

    /// OP-V arithmetic encoding.
    pub(crate) fn get_instr_v(funct6: u8, funct3: u8, vm: bool, vd: u8, vs1: u8, vs2: u8) -> u32 {
        0x57 | ((vd as u32) << 7)
            | ((funct3 as u32) << 12)
            | ((vs1 as u32) << 15)
            | ((vs2 as u32) << 20)
            | ((vm as u32) << 25)
            | ((funct6 as u32) << 26)
    }

    struct Checker {
        decoder: Decoder,
        rng: ChaCha12Rng,
    }

    impl Checker {
        fn new() -> Self {
            Checker {
                decoder: Decoder::new(),
                rng: ChaCha12Rng::seed_from_u64(0721),
            }
        }

        fn check(&mut self, instr: u32, expected: RiscvInstr, expected_info: RVInstrInfo) {
            let result = self.decoder.decode(instr).unwrap();
            assert_eq!(result, DecodeInstr(expected, expected_info), "instr = {instr:#010x}");
        }

        fn reg(&mut self) -> u8 {
            self.rng.random_range(0..=0b11111)
        }

        fn test_instr_r(&mut self, kind: RiscvInstr, funct3: u8, funct7: u8) {
            let (rd, rs1, rs2) = (self.reg(), self.reg(), self.reg());
            let instr = get_instr_r(0b0110011, funct3, funct7, rd, rs1, rs2);
            self.check(instr, kind, RVInstrInfo::R { rs1, rs2, rd });
        }

        fn test_instr_i(&mut self, kind: RiscvInstr, opcode: u8, funct3: u8) {
            let (rd, rs1) = (self.reg(), self.reg());
            let imm = self.rng.random_range(0..=0xFFF);
            let instr = get_instr_i(opcode, funct3, rd, rs1, imm);
            self.check(
                instr,
                kind,
                RVInstrInfo::I {
                    rs1,
                    rd,
                    imm: imm as WordType,
                },
            );
        }

        fn test_instr_v(&mut self, kind: RiscvInstr, funct6: u8, funct3: u8) {
            let (vd, vs1, vs2) = (self.reg(), self.reg(), self.reg());
            let vm = self.rng.random_bool(0.5);
            let instr = get_instr_v(funct6, funct3, vm, vd, vs1, vs2);
            self.check(instr, kind, RVInstrInfo::V { vd, vs1, vs2, vm });
        }
    }

    #[test]
    fn test_decode_scalar() {
        let mut checker = Checker::new();
        for _ in 0..32 {
            checker.test_instr_r(RiscvInstr::ADD, 0b000, 0b0000000);
            checker.test_instr_r(RiscvInstr::SUB, 0b000, 0b0100000);
            checker.test_instr_r(RiscvInstr::AND, 0b111, 0b0000000);
            checker.test_instr_i(RiscvInstr::ADDI, 0b0010011, 0b000);
            checker.test_instr_i(RiscvInstr::LD, 0b0000011, 0b011);
            checker.test_instr_i(RiscvInstr::JALR, 0b1100111, 0b000);
        }
    }

    #[test]
    fn test_decode_immediates() {
        let mut checker = Checker::new();
        checker.check(
            get_instr_s(0b0100011, 0b011, 10, 11, 0xFF8),
            RiscvInstr::SD,
            RVInstrInfo::S {
                rs1: 10,
                rs2: 11,
                imm: 0xFF8,
            },
        );
        checker.check(
            get_instr_b(0b1100011, 0b001, 1, 2, 0x1FFC),
            RiscvInstr::BNE,
            RVInstrInfo::B {
                rs1: 1,
                rs2: 2,
                imm: 0x1FFC,
            },
        );
        checker.check(
            get_instr_j(0b1101111, 1, 0x1FFFFC),
            RiscvInstr::JAL,
            RVInstrInfo::J {
                rd: 1,
                imm: 0x1FFFFC,
            },
        );
    }

    #[test]
    fn test_decode_system() {
        let mut checker = Checker::new();
        checker.check(0x00000073, RiscvInstr::ECALL, RVInstrInfo::None);
        checker.check(0x00100073, RiscvInstr::EBREAK, RVInstrInfo::None);
        checker.check(0x30200073, RiscvInstr::MRET, RVInstrInfo::None);
        checker.check(0x7b200073, RiscvInstr::DRET, RVInstrInfo::None);
        checker.check(0x10500073, RiscvInstr::WFI, RVInstrInfo::None);
        checker.check(0x0000100f, RiscvInstr::FENCE_I, RVInstrInfo::None);
        // csrrs a0, mstatus, zero
        checker.check(
            0x30002573,
            RiscvInstr::CSRRS,
            RVInstrInfo::Csr {
                rd: 10,
                rs1: 0,
                csr: 0x300,
            },
        );
    }

    #[test]
    fn test_decode_vector() {
        let mut checker = Checker::new();
        for _ in 0..16 {
            checker.test_instr_v(RiscvInstr::VADD_VV, 0b000000, 0b000);
            checker.test_instr_v(RiscvInstr::VSSRL_VV, 0b101010, 0b000);
            checker.test_instr_v(RiscvInstr::VSSRA_VI, 0b101011, 0b011);
            checker.test_instr_v(RiscvInstr::VNCLIP_WX, 0b101111, 0b100);
            checker.test_instr_v(RiscvInstr::VAADDU_VV, 0b001000, 0b010);
            checker.test_instr_v(RiscvInstr::VSMUL_VX, 0b100111, 0b100);
        }

        // vsetvli a0, a1, e32, m1, ta, ma
        checker.check(
            0x0d05f557,
            RiscvInstr::VSETVLI,
            RVInstrInfo::VSet {
                rd: 10,
                rs1: 11,
                rs2: 0,
                zimm: 0xd0,
            },
        );
        // vsetivli zero, 4, e32, m1
        checker.check(
            0xc1027057,
            RiscvInstr::VSETIVLI,
            RVInstrInfo::VSet {
                rd: 0,
                rs1: 4,
                rs2: 0,
                zimm: 0x10,
            },
        );
        // vle32.v v8, (a0)
        checker.check(
            0x02056407,
            RiscvInstr::VLE32_V,
            RVInstrInfo::VMem {
                vd: 8,
                rs1: 10,
                vm: true,
            },
        );
    }

    #[test]
    fn test_decode_unknown() {
        let decoder = Decoder::new();
        assert_eq!(decoder.decode(0x0000_0000), None);
        assert_eq!(decoder.decode(0xffff_ffff), None);
    }
}
