use crate::{
    config::arch_config::{WordType, XLEN},
    isa::riscv::{
        csr_reg::csr_index,
        diagnostic::{DiagValue, RegClass},
        executor::Hart,
        instruction::{NextPc, RVInstrInfo, normal_vector_exec},
        trap::TrapEvent,
        vector::{
            fixed_point::{rounding_shift, saturate_signed, saturate_unsigned},
            vloop::{ElemCtx, VLoop, VOperand, group_regs, log_vreg_group, vector_loop},
        },
    },
    utils::{UnsignedInteger, sext_bits, sign_extend},
};

/// Where the second operand of a `.v?` instruction comes from.
pub(super) mod src {
    /// Vector register `vs1`.
    pub const VV: u8 = 0;
    /// Scalar register `rs1`.
    pub const VX: u8 = 1;
    /// Sign-extended 5-bit immediate.
    pub const VI: u8 = 2;
    /// Zero-extended 5-bit immediate, used by the shift and clip `.vi` / `.wi` forms.
    pub const VUI: u8 = 3;
}

/// Per-element operation of an arithmetic vector instruction.
pub(super) trait VectorOp {
    /// `mhpmcounter` bumped once per executed instruction.
    const HPM_EVENT: Option<usize> = None;

    /// `a` and `b` arrive zero-extended from their element width. Returns the result and
    /// whether it saturated.
    fn exec(ctx: &ElemCtx, a: u64, b: u64) -> (u64, bool);
}

pub(super) fn exec_varith<F, const SRC: u8, const NARROW: bool>(
    info: RVInstrInfo,
    hart: &mut Hart,
    pc: WordType,
) -> Result<NextPc, TrapEvent>
where
    F: VectorOp,
{
    let RVInstrInfo::V { vd, vs1, vs2, vm } = info else {
        std::unreachable!();
    };

    normal_vector_exec(hart, pc, |hart| {
        let rhs = match SRC {
            src::VV => VOperand::Vector(vs1),
            src::VX => VOperand::Scalar(hart.read_reg(vs1)),
            src::VI => VOperand::Scalar(sign_extend(vs1 as WordType, 5)),
            _ => VOperand::Scalar(vs1 as WordType),
        };

        vector_loop(&mut hart.state, VLoop { vd, vs2, rhs, vm }, NARROW, F::exec)?;

        if let Some(event) = F::HPM_EVENT {
            hart.state.csr.bump_hpm(event);
        }
        Ok(())
    })
}

fn vset_common(
    hart: &mut Hart,
    pc: WordType,
    rd: u8,
    rs1_is_x0: bool,
    avl: WordType,
    vtype: WordType,
) -> Result<NextPc, TrapEvent> {
    // vset* is legal with an illegal vtype, only the unit itself must be on
    if !hart.state.csr.mstatus.vs_enabled() {
        return Err(TrapEvent::illegal());
    }

    let vl = hart.state.vu.set_vl(rd, rs1_is_x0, avl, vtype);
    hart.write_reg(rd, vl);

    let vtype = hart.state.vu.vtype_raw();
    let diag = &mut hart.state.diag;
    diag.log_reg_write(
        RegClass::VectorConfig,
        csr_index::vl,
        DiagValue::from_word(XLEN as u32, vl),
    );
    diag.log_reg_write(
        RegClass::VectorConfig,
        csr_index::vtype,
        DiagValue::from_word(XLEN as u32, vtype),
    );

    hart.state.csr.mstatus.set_vs_dirty();
    Ok(NextPc::Jump(pc.wrapping_add(4)))
}

pub(super) fn exec_vsetvli(
    info: RVInstrInfo,
    hart: &mut Hart,
    pc: WordType,
) -> Result<NextPc, TrapEvent> {
    let RVInstrInfo::VSet { rd, rs1, zimm, .. } = info else {
        std::unreachable!();
    };
    let avl = hart.read_reg(rs1);
    vset_common(hart, pc, rd, rs1 == 0, avl, zimm as WordType)
}

pub(super) fn exec_vsetivli(
    info: RVInstrInfo,
    hart: &mut Hart,
    pc: WordType,
) -> Result<NextPc, TrapEvent> {
    let RVInstrInfo::VSet { rd, rs1, zimm, .. } = info else {
        std::unreachable!();
    };
    vset_common(hart, pc, rd, false, rs1 as WordType, zimm as WordType)
}

pub(super) fn exec_vsetvl(
    info: RVInstrInfo,
    hart: &mut Hart,
    pc: WordType,
) -> Result<NextPc, TrapEvent> {
    let RVInstrInfo::VSet { rd, rs1, rs2, .. } = info else {
        std::unreachable!();
    };
    let (avl, vtype) = hart.state.reg_file.read(rs1, rs2);
    vset_common(hart, pc, rd, rs1 == 0, avl, vtype)
}

/// Register count of the data group of a unit-stride access with element type `T`.
fn check_vmem<T: UnsignedInteger>(hart: &Hart, vd: u8, vm: bool, load: bool) -> Result<u8, TrapEvent> {
    let vtype = hart.state.vu.vtype();
    let emul_log2 = T::BITS.trailing_zeros() as i32 - vtype.sew.trailing_zeros() as i32
        + vtype.lmul_log2;
    if !(-3..=3).contains(&emul_log2) {
        return Err(TrapEvent::illegal());
    }

    let regs = group_regs(emul_log2);
    if vd % regs != 0 || (load && !vm && vd == 0) {
        return Err(TrapEvent::illegal());
    }
    Ok(regs)
}

pub(super) fn exec_vload<T: UnsignedInteger>(
    info: RVInstrInfo,
    hart: &mut Hart,
    pc: WordType,
) -> Result<NextPc, TrapEvent> {
    let RVInstrInfo::VMem { vd, rs1, vm } = info else {
        std::unreachable!();
    };

    normal_vector_exec(hart, pc, |hart| {
        let regs = check_vmem::<T>(hart, vd, vm, true)?;
        let base = hart.read_reg(rs1);
        let gate = hart.state.trigger_gate();

        let mut written = false;
        let mut result = Ok(());
        for i in hart.state.vu.vstart..hart.state.vu.vl {
            if !vm && !hart.state.vu.reg_file.mask_bit(i) {
                continue;
            }

            let addr = base.wrapping_add(i * T::BYTES as WordType);
            match hart.mmu.load::<T>(addr, &mut hart.state.diag, gate) {
                Ok(data) => {
                    hart.state.vu.reg_file.write_elem(vd, T::BITS, i, data.into());
                    written = true;
                }
                Err(event) => {
                    // resume point for the trap handler or a trigger replay
                    hart.state.vu.vstart = i;
                    result = Err(event);
                    break;
                }
            }
        }

        if written {
            log_vreg_group(&mut hart.state, vd, regs);
        }
        result?;
        hart.state.vu.vstart = 0;
        Ok(())
    })
}

pub(super) fn exec_vstore<T: UnsignedInteger>(
    info: RVInstrInfo,
    hart: &mut Hart,
    pc: WordType,
) -> Result<NextPc, TrapEvent> {
    let RVInstrInfo::VMem { vd: vs3, rs1, vm } = info else {
        std::unreachable!();
    };

    normal_vector_exec(hart, pc, |hart| {
        check_vmem::<T>(hart, vs3, vm, false)?;
        let base = hart.read_reg(rs1);
        let gate = hart.state.trigger_gate();

        for i in hart.state.vu.vstart..hart.state.vu.vl {
            if !vm && !hart.state.vu.reg_file.mask_bit(i) {
                continue;
            }

            let addr = base.wrapping_add(i * T::BYTES as WordType);
            let data = T::truncate_from(hart.state.vu.reg_file.read_elem(vs3, T::BITS, i));
            if let Err(event) = hart.mmu.store(addr, data, &mut hart.state.diag, gate) {
                hart.state.vu.vstart = i;
                return Err(event);
            }
        }

        hart.state.vu.vstart = 0;
        Ok(())
    })
}

// =============================================
//                  VectorOp
// =============================================
#[inline(always)]
fn signed(value: u64, bits: u32) -> i128 {
    sext_bits(value, bits) as i128
}

pub(super) struct VAdd {}
impl VectorOp for VAdd {
    fn exec(_ctx: &ElemCtx, a: u64, b: u64) -> (u64, bool) {
        (a.wrapping_add(b), false)
    }
}

pub(super) struct VSaddu {}
impl VectorOp for VSaddu {
    fn exec(ctx: &ElemCtx, a: u64, b: u64) -> (u64, bool) {
        saturate_unsigned(a as u128 + b as u128, ctx.sew)
    }
}

pub(super) struct VSadd {}
impl VectorOp for VSadd {
    fn exec(ctx: &ElemCtx, a: u64, b: u64) -> (u64, bool) {
        saturate_signed(signed(a, ctx.sew) + signed(b, ctx.sew), ctx.sew)
    }
}

pub(super) struct VAaddu {}
impl VectorOp for VAaddu {
    fn exec(ctx: &ElemCtx, a: u64, b: u64) -> (u64, bool) {
        (rounding_shift(a as u128 + b as u128, 1, ctx.vxrm) as u64, false)
    }
}

pub(super) struct VAadd {}
impl VectorOp for VAadd {
    fn exec(ctx: &ElemCtx, a: u64, b: u64) -> (u64, bool) {
        let sum = signed(a, ctx.sew) + signed(b, ctx.sew);
        (rounding_shift(sum, 1, ctx.vxrm) as u64, false)
    }
}

pub(super) struct VSmul {}
impl VectorOp for VSmul {
    fn exec(ctx: &ElemCtx, a: u64, b: u64) -> (u64, bool) {
        let (a, b) = (signed(a, ctx.sew), signed(b, ctx.sew));
        let min = -(1i128 << (ctx.sew - 1));
        // (-1) * (-1) is the only product that does not fit
        if a == min && b == min {
            return saturate_signed(i128::MAX, ctx.sew);
        }
        saturate_signed(rounding_shift(a * b, ctx.sew - 1, ctx.vxrm), ctx.sew)
    }
}

pub(super) struct VSsrl {}
impl VectorOp for VSsrl {
    const HPM_EVENT: Option<usize> = Some(10);

    fn exec(ctx: &ElemCtx, a: u64, b: u64) -> (u64, bool) {
        let sh = (b & (ctx.sew as u64 - 1)) as u32;
        (rounding_shift(a as u128, sh, ctx.vxrm) as u64, false)
    }
}

pub(super) struct VSsra {}
impl VectorOp for VSsra {
    fn exec(ctx: &ElemCtx, a: u64, b: u64) -> (u64, bool) {
        let sh = (b & (ctx.sew as u64 - 1)) as u32;
        (
            rounding_shift(signed(a, ctx.sew), sh, ctx.vxrm) as u64,
            false,
        )
    }
}

pub(super) struct VNclipu {}
impl VectorOp for VNclipu {
    fn exec(ctx: &ElemCtx, a: u64, b: u64) -> (u64, bool) {
        let sh = (b & (2 * ctx.sew as u64 - 1)) as u32;
        saturate_unsigned(rounding_shift(a as u128, sh, ctx.vxrm), ctx.sew)
    }
}

pub(super) struct VNclip {}
impl VectorOp for VNclip {
    fn exec(ctx: &ElemCtx, a: u64, b: u64) -> (u64, bool) {
        let sh = (b & (2 * ctx.sew as u64 - 1)) as u32;
        saturate_signed(
            rounding_shift(signed(a, 2 * ctx.sew), sh, ctx.vxrm),
            ctx.sew,
        )
    }
}
