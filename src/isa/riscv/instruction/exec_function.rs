use std::hint::unlikely;

use crate::{
    config::arch_config::{WordType, XLEN},
    isa::riscv::{
        csr_reg::PrivilegeLevel,
        diagnostic::{DiagValue, RegClass},
        executor::Hart,
        instruction::{NextPc, RVInstrInfo, normal_exec, set_pc_and_serialize},
        trap::{Exception, TrapEvent},
        vector::VectorUnit,
    },
    utils::{UnsignedInteger, sign_extend},
};

/// ExecTrait will generate operation result to `exec_xxx` function.
/// ExecTrait::exec only do calculate.
/// `exec_xxx` function interact with other mod in the hart.
pub(super) trait ExecTrait<T> {
    fn exec(a: WordType, b: WordType) -> T;
}

/// Process arithmetic instructions with `rs1`, (`rs2` or `imm`) and `rd`.
///
/// This will always do signed extension to `imm` as 12 bit.
pub(super) fn exec_arith<F>(
    info: RVInstrInfo,
    hart: &mut Hart,
    pc: WordType,
) -> Result<NextPc, TrapEvent>
where
    F: ExecTrait<WordType>,
{
    normal_exec(hart, pc, |hart| {
        let (rd, rst) = match info {
            RVInstrInfo::R { rs1, rs2, rd } => {
                let (val1, val2) = hart.state.reg_file.read(rs1, rs2);
                (rd, F::exec(val1, val2))
            }
            RVInstrInfo::I { rs1, rd, imm } => {
                let val1 = hart.read_reg(rs1);
                (rd, F::exec(val1, sign_extend(imm, 12)))
            }
            _ => std::unreachable!(),
        };

        hart.write_reg(rd, rst);
        Ok(())
    })
}

/// Fail with a misaligned-fetch exception unless `target` is 4-byte aligned.
#[inline(always)]
pub(super) fn check_jump_target(target: WordType) -> Result<(), TrapEvent> {
    if unlikely(target & 0x3 != 0) {
        return Err(TrapEvent::exception(
            Exception::InstructionMisaligned,
            target,
        ));
    }
    Ok(())
}

pub(super) fn exec_branch<F>(
    info: RVInstrInfo,
    hart: &mut Hart,
    pc: WordType,
) -> Result<NextPc, TrapEvent>
where
    F: ExecTrait<bool>,
{
    let RVInstrInfo::B { rs1, rs2, imm } = info else {
        std::unreachable!();
    };

    let (val1, val2) = hart.state.reg_file.read(rs1, rs2);
    let taken = F::exec(val1, val2);
    let next = if taken {
        let target = pc.wrapping_add(sign_extend(imm, 13));
        check_jump_target(target)?;
        target
    } else {
        pc.wrapping_add(4)
    };

    hart.state.diag.log_branch(taken);
    Ok(NextPc::Jump(next))
}

pub(super) fn exec_load<T, const EXTEND: bool>(
    info: RVInstrInfo,
    hart: &mut Hart,
    pc: WordType,
) -> Result<NextPc, TrapEvent>
where
    T: UnsignedInteger,
{
    let RVInstrInfo::I { rs1, rd, imm } = info else {
        std::unreachable!();
    };

    normal_exec(hart, pc, |hart| {
        let addr = hart.read_reg(rs1).wrapping_add(sign_extend(imm, 12));
        let gate = hart.state.trigger_gate();
        let data: T = hart.mmu.load(addr, &mut hart.state.diag, gate)?;

        let mut data: WordType = data.into();
        if EXTEND {
            data = sign_extend(data, T::BITS);
        }
        hart.write_reg(rd, data);
        Ok(())
    })
}

pub(super) fn exec_store<T>(
    info: RVInstrInfo,
    hart: &mut Hart,
    pc: WordType,
) -> Result<NextPc, TrapEvent>
where
    T: UnsignedInteger,
{
    let RVInstrInfo::S { rs1, rs2, imm } = info else {
        std::unreachable!();
    };

    normal_exec(hart, pc, |hart| {
        let (val1, val2) = hart.state.reg_file.read(rs1, rs2);
        let addr = val1.wrapping_add(sign_extend(imm, 12));
        let gate = hart.state.trigger_gate();
        hart.mmu
            .store(addr, T::truncate_from(val2), &mut hart.state.diag, gate)
    })
}

/// Privilege, read-only and debug-only checks shared by every CSR access.
fn check_csr_access(hart: &Hart, csr: u16, write: bool) -> Result<(), TrapEvent> {
    let prv: u8 = hart.state.prv.into();
    if prv < PrivilegeLevel::required_by_csr(csr) {
        return Err(TrapEvent::illegal());
    }
    // 0b11 in the top two bits: read-only
    if write && csr >> 10 == 0b11 {
        return Err(TrapEvent::illegal());
    }
    // debug CSRs only exist in debug mode
    if (0x7b0..=0x7bf).contains(&csr) && !hart.state.debug_mode {
        return Err(TrapEvent::illegal());
    }
    if VectorUnit::is_vector_csr(csr) && !hart.state.csr.mstatus.vs_enabled() {
        return Err(TrapEvent::illegal());
    }
    Ok(())
}

fn write_csr_logged(hart: &mut Hart, csr: u16, value: WordType) -> Result<(), TrapEvent> {
    hart.state
        .write_csr(csr, value)
        .ok_or_else(TrapEvent::illegal)?;
    if VectorUnit::is_vector_csr(csr) {
        hart.state.csr.mstatus.set_vs_dirty();
    }

    // log what the CSR holds after WARL masking
    if let Some(value) = hart.state.read_csr(csr) {
        hart.state
            .diag
            .log_reg_write(RegClass::Csr, csr, DiagValue::from_word(XLEN as u32, value));
    }
    Ok(())
}

pub(super) fn exec_csrw<const UIMM: bool>(
    info: RVInstrInfo,
    hart: &mut Hart,
    pc: WordType,
) -> Result<NextPc, TrapEvent> {
    let RVInstrInfo::Csr { rd, rs1, csr } = info else {
        std::unreachable!();
    };

    check_csr_access(hart, csr, true)?;

    // read generate register.
    let new_val = if UIMM {
        rs1 as WordType
    } else {
        hart.read_reg(rs1)
    };

    let old = hart.state.read_csr(csr).ok_or_else(TrapEvent::illegal)?;
    write_csr_logged(hart, csr, new_val)?;
    hart.write_reg(rd, old);

    Ok(set_pc_and_serialize(hart, pc.wrapping_add(4)))
}

pub(super) fn exec_csr_bit<const SET: bool, const UIMM: bool>(
    info: RVInstrInfo,
    hart: &mut Hart,
    pc: WordType,
) -> Result<NextPc, TrapEvent> {
    let RVInstrInfo::Csr { rd, rs1, csr } = info else {
        std::unreachable!();
    };

    // x0 / zero immediate: read only, no write side effects
    let write = rs1 != 0;
    check_csr_access(hart, csr, write)?;

    let rhs = if UIMM {
        rs1 as WordType
    } else {
        hart.read_reg(rs1)
    };

    let value = hart.state.read_csr(csr).ok_or_else(TrapEvent::illegal)?;
    if write {
        let data = if SET { value | rhs } else { value & !rhs };
        write_csr_logged(hart, csr, data)?;
    }
    hart.write_reg(rd, value);

    Ok(set_pc_and_serialize(hart, pc.wrapping_add(4)))
}

pub(super) fn exec_nop(
    _info: RVInstrInfo,
    _hart: &mut Hart,
    pc: WordType,
) -> Result<NextPc, TrapEvent> {
    Ok(NextPc::Jump(pc.wrapping_add(4)))
}

// =============================================
//                  ExecTrait
// =============================================
// Arith
pub(super) struct ExecAdd {}
impl ExecTrait<WordType> for ExecAdd {
    fn exec(a: WordType, b: WordType) -> WordType {
        a.wrapping_add(b)
    }
}

pub(super) struct ExecSub {}
impl ExecTrait<WordType> for ExecSub {
    fn exec(a: WordType, b: WordType) -> WordType {
        a.wrapping_sub(b)
    }
}

// Bit
pub(super) struct ExecSLL {}
impl ExecTrait<WordType> for ExecSLL {
    fn exec(a: WordType, b: WordType) -> WordType {
        a.wrapping_shl(b as u32)
    }
}

pub(super) struct ExecSRL {}
impl ExecTrait<WordType> for ExecSRL {
    fn exec(a: WordType, b: WordType) -> WordType {
        a.wrapping_shr(b as u32)
    }
}

pub(super) struct ExecAnd {}
impl ExecTrait<WordType> for ExecAnd {
    fn exec(a: WordType, b: WordType) -> WordType {
        a & b
    }
}

pub(super) struct ExecOr {}
impl ExecTrait<WordType> for ExecOr {
    fn exec(a: WordType, b: WordType) -> WordType {
        a | b
    }
}

pub(super) struct ExecXor {}
impl ExecTrait<WordType> for ExecXor {
    fn exec(a: WordType, b: WordType) -> WordType {
        a ^ b
    }
}

// Compare
pub(super) struct ExecSignedLess {}
impl ExecTrait<bool> for ExecSignedLess {
    fn exec(a: WordType, b: WordType) -> bool {
        a.cast_signed() < b.cast_signed()
    }
}

pub(super) struct ExecUnsignedLess {}
impl ExecTrait<bool> for ExecUnsignedLess {
    fn exec(a: WordType, b: WordType) -> bool {
        a < b
    }
}

pub(super) struct ExecEqual {}
impl ExecTrait<bool> for ExecEqual {
    fn exec(a: WordType, b: WordType) -> bool {
        a == b
    }
}

pub(super) struct ExecNotEqual {}
impl ExecTrait<bool> for ExecNotEqual {
    fn exec(a: WordType, b: WordType) -> bool {
        a != b
    }
}

pub(super) struct ExecSignedGreatEqual {}
impl ExecTrait<bool> for ExecSignedGreatEqual {
    fn exec(a: WordType, b: WordType) -> bool {
        a.cast_signed() >= b.cast_signed()
    }
}

pub(super) struct ExecUnsignedGreatEqual {}
impl ExecTrait<bool> for ExecUnsignedGreatEqual {
    fn exec(a: WordType, b: WordType) -> bool {
        a >= b
    }
}
