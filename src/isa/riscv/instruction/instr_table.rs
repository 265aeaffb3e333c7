use crate::{
    define_instr_enum,
    isa::{
        riscv::instruction::InstrFormat,
        utils::{DecodeMask, create_decode_mask},
    },
};

define_instr_enum!(
    RiscvInstr,
    // RV64I
    LUI, AUIPC, JAL, JALR,
    BEQ, BNE, BLT, BGE, BLTU, BGEU,
    LW, LD, SW, SD,
    ADDI, SLLI, SRLI, XORI, ORI, ANDI,
    ADD, SUB, XOR, OR, AND,
    FENCE,
    // Zifencei
    FENCE_I,
    // System
    ECALL, EBREAK, SRET, MRET, DRET, WFI,
    // Zicsr
    CSRRW, CSRRS, CSRRC, CSRRWI, CSRRSI, CSRRCI,
    // RVV configuration
    VSETVLI, VSETIVLI, VSETVL,
    // RVV unit-stride memory
    VLE8_V, VLE16_V, VLE32_V, VLE64_V,
    VSE8_V, VSE16_V, VSE32_V, VSE64_V,
    // RVV integer / fixed-point arithmetic
    VADD_VV, VADD_VX, VADD_VI,
    VSADDU_VV, VSADDU_VX, VSADDU_VI,
    VSADD_VV, VSADD_VX, VSADD_VI,
    VAADDU_VV, VAADDU_VX,
    VAADD_VV, VAADD_VX,
    VSMUL_VV, VSMUL_VX,
    VSSRL_VV, VSSRL_VX, VSSRL_VI,
    VSSRA_VV, VSSRA_VX, VSSRA_VI,
    VNCLIPU_WV, VNCLIPU_WX, VNCLIPU_WI,
    VNCLIP_WV, VNCLIP_WX, VNCLIP_WI,
);

#[derive(Debug, Clone, Copy)]
pub struct RVInstrDesc {
    pub mask: DecodeMask,
    pub instr: RiscvInstr,
    pub format: InstrFormat,
}

macro_rules! instr_table {
    ($table:ident, { $( $name:ident: $pattern:literal, $fmt:ident; )* }) => {
        pub const $table: &[RVInstrDesc] = &[
            $(
                RVInstrDesc {
                    mask: create_decode_mask($pattern),
                    instr: RiscvInstr::$name,
                    format: InstrFormat::$fmt,
                },
            )*
        ];
    };
}

#[rustfmt::skip]
instr_table!(TABLE_RV64I, {
    LUI:     "????????????????????_?????_0110111", U;
    AUIPC:   "????????????????????_?????_0010111", U;
    JAL:     "????????????????????_?????_1101111", J;
    JALR:    "????????????_?????_000_?????_1100111", I;

    BEQ:     "???????_?????_?????_000_?????_1100011", B;
    BNE:     "???????_?????_?????_001_?????_1100011", B;
    BLT:     "???????_?????_?????_100_?????_1100011", B;
    BGE:     "???????_?????_?????_101_?????_1100011", B;
    BLTU:    "???????_?????_?????_110_?????_1100011", B;
    BGEU:    "???????_?????_?????_111_?????_1100011", B;

    LW:      "????????????_?????_010_?????_0000011", I;
    LD:      "????????????_?????_011_?????_0000011", I;
    SW:      "???????_?????_?????_010_?????_0100011", S;
    SD:      "???????_?????_?????_011_?????_0100011", S;

    ADDI:    "????????????_?????_000_?????_0010011", I;
    SLLI:    "000000_??????_?????_001_?????_0010011", I;
    SRLI:    "000000_??????_?????_101_?????_0010011", I;
    XORI:    "????????????_?????_100_?????_0010011", I;
    ORI:     "????????????_?????_110_?????_0010011", I;
    ANDI:    "????????????_?????_111_?????_0010011", I;

    ADD:     "0000000_?????_?????_000_?????_0110011", R;
    SUB:     "0100000_?????_?????_000_?????_0110011", R;
    XOR:     "0000000_?????_?????_100_?????_0110011", R;
    OR:      "0000000_?????_?????_110_?????_0110011", R;
    AND:     "0000000_?????_?????_111_?????_0110011", R;

    FENCE:   "????????????_?????_000_?????_0001111", None;
});

#[rustfmt::skip]
instr_table!(TABLE_RVZIFENCEI, {
    FENCE_I: "????????????_?????_001_?????_0001111", None;
});

#[rustfmt::skip]
instr_table!(TABLE_RVSYSTEM, {
    ECALL:   "000000000000_00000_000_00000_1110011", None;
    EBREAK:  "000000000001_00000_000_00000_1110011", None;
    SRET:    "000100000010_00000_000_00000_1110011", None;
    MRET:    "001100000010_00000_000_00000_1110011", None;
    DRET:    "011110110010_00000_000_00000_1110011", None;
    WFI:     "000100000101_00000_000_00000_1110011", None;
});

#[rustfmt::skip]
instr_table!(TABLE_RVZICSR, {
    CSRRW:   "????????????_?????_001_?????_1110011", Csr;
    CSRRS:   "????????????_?????_010_?????_1110011", Csr;
    CSRRC:   "????????????_?????_011_?????_1110011", Csr;
    CSRRWI:  "????????????_?????_101_?????_1110011", Csr;
    CSRRSI:  "????????????_?????_110_?????_1110011", Csr;
    CSRRCI:  "????????????_?????_111_?????_1110011", Csr;
});

#[rustfmt::skip]
instr_table!(TABLE_RVV, {
    VSETVLI:    "0???????????_?????_111_?????_1010111", VSetVli;
    VSETIVLI:   "11??????????_?????_111_?????_1010111", VSetIvli;
    VSETVL:     "1000000_?????_?????_111_?????_1010111", VSetVl;

    VLE8_V:     "000_0_00_?_00000_?????_000_?????_0000111", VMem;
    VLE16_V:    "000_0_00_?_00000_?????_101_?????_0000111", VMem;
    VLE32_V:    "000_0_00_?_00000_?????_110_?????_0000111", VMem;
    VLE64_V:    "000_0_00_?_00000_?????_111_?????_0000111", VMem;
    VSE8_V:     "000_0_00_?_00000_?????_000_?????_0100111", VMem;
    VSE16_V:    "000_0_00_?_00000_?????_101_?????_0100111", VMem;
    VSE32_V:    "000_0_00_?_00000_?????_110_?????_0100111", VMem;
    VSE64_V:    "000_0_00_?_00000_?????_111_?????_0100111", VMem;

    VADD_VV:    "000000_?_?????_?????_000_?????_1010111", V;
    VADD_VX:    "000000_?_?????_?????_100_?????_1010111", V;
    VADD_VI:    "000000_?_?????_?????_011_?????_1010111", V;

    VSADDU_VV:  "100000_?_?????_?????_000_?????_1010111", V;
    VSADDU_VX:  "100000_?_?????_?????_100_?????_1010111", V;
    VSADDU_VI:  "100000_?_?????_?????_011_?????_1010111", V;
    VSADD_VV:   "100001_?_?????_?????_000_?????_1010111", V;
    VSADD_VX:   "100001_?_?????_?????_100_?????_1010111", V;
    VSADD_VI:   "100001_?_?????_?????_011_?????_1010111", V;

    VAADDU_VV:  "001000_?_?????_?????_010_?????_1010111", V;
    VAADDU_VX:  "001000_?_?????_?????_110_?????_1010111", V;
    VAADD_VV:   "001001_?_?????_?????_010_?????_1010111", V;
    VAADD_VX:   "001001_?_?????_?????_110_?????_1010111", V;

    VSMUL_VV:   "100111_?_?????_?????_000_?????_1010111", V;
    VSMUL_VX:   "100111_?_?????_?????_100_?????_1010111", V;

    VSSRL_VV:   "101010_?_?????_?????_000_?????_1010111", V;
    VSSRL_VX:   "101010_?_?????_?????_100_?????_1010111", V;
    VSSRL_VI:   "101010_?_?????_?????_011_?????_1010111", V;
    VSSRA_VV:   "101011_?_?????_?????_000_?????_1010111", V;
    VSSRA_VX:   "101011_?_?????_?????_100_?????_1010111", V;
    VSSRA_VI:   "101011_?_?????_?????_011_?????_1010111", V;

    VNCLIPU_WV: "101110_?_?????_?????_000_?????_1010111", V;
    VNCLIPU_WX: "101110_?_?????_?????_100_?????_1010111", V;
    VNCLIPU_WI: "101110_?_?????_?????_011_?????_1010111", V;
    VNCLIP_WV:  "101111_?_?????_?????_000_?????_1010111", V;
    VNCLIP_WX:  "101111_?_?????_?????_100_?????_1010111", V;
    VNCLIP_WI:  "101111_?_?????_?????_011_?????_1010111", V;
});
