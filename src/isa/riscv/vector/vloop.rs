//! Element loop shared by the arithmetic vector instructions.

use crate::{
    config::arch_config::{ELEN, VLEN, XLEN},
    isa::riscv::{
        csr_reg::csr_index,
        diagnostic::{DiagValue, RegClass},
        hart_state::HartState,
        trap::TrapEvent,
        vector::RoundingMode,
    },
    utils::truncate_bits,
};

/// Second source of an element operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VOperand {
    Vector(u8),
    /// Scalar or immediate, already extended to a full word.
    Scalar(u64),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct VLoop {
    pub vd: u8,
    pub vs2: u8,
    pub rhs: VOperand,
    /// Unmasked when set.
    pub vm: bool,
}

/// Per-instruction constants handed to every element operation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ElemCtx {
    pub sew: u32,
    pub vxrm: RoundingMode,
}

/// Registers in a group of LMUL = 2^`lmul_log2`. Fractional groups use one register.
#[inline]
pub(crate) fn group_regs(lmul_log2: i32) -> u8 {
    if lmul_log2 > 0 { 1 << lmul_log2 } else { 1 }
}

#[inline]
fn aligned(reg: u8, regs: u8) -> bool {
    reg % regs == 0
}

/// Log every register of the group starting at `base` as written.
pub(crate) fn log_vreg_group(state: &mut HartState, base: u8, regs: u8) {
    for reg in base..base + regs {
        let value = DiagValue::from_bytes(VLEN as u32, state.vu.reg_file.reg_bytes(reg));
        state.diag.log_reg_write(RegClass::Vector, reg as u16, value);
    }
}

fn check_operands(state: &HartState, lp: &VLoop, narrow: bool) -> Result<(), TrapEvent> {
    let vtype = state.vu.vtype();
    let regs = group_regs(vtype.lmul_log2);

    if narrow {
        if vtype.lmul_log2 >= 3 || 2 * vtype.sew as usize > ELEN {
            return Err(TrapEvent::illegal());
        }
        let wide_regs = group_regs(vtype.lmul_log2 + 1);
        if !aligned(lp.vd, regs) || !aligned(lp.vs2, wide_regs) {
            return Err(TrapEvent::illegal());
        }
        // only the lowest-numbered part of the wide source may be overwritten
        let overlap = lp.vd < lp.vs2 + wide_regs && lp.vs2 < lp.vd + regs;
        if overlap && lp.vd != lp.vs2 {
            return Err(TrapEvent::illegal());
        }
    } else if !aligned(lp.vd, regs) || !aligned(lp.vs2, regs) {
        return Err(TrapEvent::illegal());
    }

    if let VOperand::Vector(vs1) = lp.rhs {
        if !aligned(vs1, regs) {
            return Err(TrapEvent::illegal());
        }
    }

    // masked results must not clobber the mask
    if !lp.vm && lp.vd == 0 {
        return Err(TrapEvent::illegal());
    }
    Ok(())
}

/// Apply `op` to every active element in `vstart..vl` and write the low SEW bits of each result
/// to `vd`. Saturation reported by `op` is accumulated into `vxsat`.
///
/// With `narrow`, `vs2` is read at 2*SEW. `op` always receives both sources zero-extended
/// from their element width.
pub(crate) fn vector_loop<F>(
    state: &mut HartState,
    lp: VLoop,
    narrow: bool,
    op: F,
) -> Result<(), TrapEvent>
where
    F: Fn(&ElemCtx, u64, u64) -> (u64, bool),
{
    check_operands(state, &lp, narrow)?;

    let ctx = ElemCtx {
        sew: state.vu.sew(),
        vxrm: state.vu.vxrm,
    };
    let src_sew = if narrow { 2 * ctx.sew } else { ctx.sew };
    let vu = &mut state.vu;

    let mut saturated = false;
    for i in vu.vstart..vu.vl {
        if !lp.vm && !vu.reg_file.mask_bit(i) {
            continue;
        }

        let a = vu.reg_file.read_elem(lp.vs2, src_sew, i);
        let b = match lp.rhs {
            VOperand::Vector(vs1) => vu.reg_file.read_elem(vs1, ctx.sew, i),
            VOperand::Scalar(x) => truncate_bits(x, ctx.sew),
        };

        let (value, sat) = op(&ctx, a, b);
        vu.reg_file.write_elem(lp.vd, ctx.sew, i, value);
        saturated |= sat;
    }
    vu.vstart = 0;

    if saturated {
        vu.vxsat = true;
        state.diag.log_reg_write(
            RegClass::Csr,
            csr_index::vxsat,
            DiagValue::from_word(XLEN as u32, 1),
        );
    }

    let regs = group_regs(state.vu.vtype().lmul_log2);
    log_vreg_group(state, lp.vd, regs);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(vtype: u64, vl: u64) -> HartState {
        let mut state = HartState::new(0);
        state.vu.set_vl(1, false, vl, vtype);
        state
    }

    fn add(_: &ElemCtx, a: u64, b: u64) -> (u64, bool) {
        (a.wrapping_add(b), false)
    }

    #[test]
    fn test_masked_elements_untouched() {
        // e8, m1
        let mut state = state_with(0b000_000, 8);
        for i in 0..8 {
            state.vu.reg_file.write_elem(2, 8, i, i);
            state.vu.reg_file.write_elem(4, 8, i, 0xaa);
        }
        state.vu.reg_file.write_elem(0, 8, 0, 0b0101_0101);

        let lp = VLoop {
            vd: 4,
            vs2: 2,
            rhs: VOperand::Scalar(0x100 + 10),
            vm: false,
        };
        vector_loop(&mut state, lp, false, add).unwrap();

        for i in 0..8 {
            let want = if i % 2 == 0 { i + 10 } else { 0xaa };
            assert_eq!(state.vu.reg_file.read_elem(4, 8, i), want);
        }
        assert_eq!(state.diag.reg_writes.len(), 1);
        assert_eq!(state.diag.reg_writes[0].class, RegClass::Vector);
    }

    #[test]
    fn test_vstart_and_tail() {
        // e16, m1, vl = 4
        let mut state = state_with(0b001_000, 4);
        for i in 0..8 {
            state.vu.reg_file.write_elem(6, 16, i, 0xffff);
        }
        state.vu.vstart = 1;

        let lp = VLoop {
            vd: 6,
            vs2: 2,
            rhs: VOperand::Scalar(1),
            vm: true,
        };
        vector_loop(&mut state, lp, false, add).unwrap();

        assert_eq!(state.vu.reg_file.read_elem(6, 16, 0), 0xffff);
        assert_eq!(state.vu.reg_file.read_elem(6, 16, 1), 1);
        assert_eq!(state.vu.reg_file.read_elem(6, 16, 3), 1);
        assert_eq!(state.vu.reg_file.read_elem(6, 16, 4), 0xffff);
        assert_eq!(state.vu.vstart, 0);
    }

    #[test]
    fn test_saturation_sets_vxsat() {
        let mut state = state_with(0b000_000, 2);
        let lp = VLoop {
            vd: 1,
            vs2: 2,
            rhs: VOperand::Vector(3),
            vm: true,
        };
        vector_loop(&mut state, lp, false, |_, _, _| (0, true)).unwrap();
        assert!(state.vu.vxsat);
        assert!(
            state
                .diag
                .reg_writes
                .iter()
                .any(|w| w.class == RegClass::Csr && w.index == csr_index::vxsat)
        );
    }

    #[test]
    fn test_operand_checks() {
        // e8, m2: groups must be even
        let mut state = state_with(0b000_001, 4);
        let misaligned = VLoop {
            vd: 3,
            vs2: 2,
            rhs: VOperand::Scalar(0),
            vm: true,
        };
        assert_eq!(
            vector_loop(&mut state, misaligned, false, add),
            Err(TrapEvent::illegal())
        );

        let masked_v0 = VLoop {
            vd: 0,
            vs2: 2,
            rhs: VOperand::Scalar(0),
            vm: false,
        };
        assert_eq!(
            vector_loop(&mut state, masked_v0, false, add),
            Err(TrapEvent::illegal())
        );

        // narrowing from a 4-register group into the middle of it
        let overlap = VLoop {
            vd: 6,
            vs2: 4,
            rhs: VOperand::Scalar(0),
            vm: true,
        };
        assert_eq!(
            vector_loop(&mut state, overlap, true, add),
            Err(TrapEvent::illegal())
        );

        let same_base = VLoop {
            vd: 4,
            vs2: 4,
            rhs: VOperand::Scalar(0),
            vm: true,
        };
        assert!(vector_loop(&mut state, same_base, true, add).is_ok());

        // e64 has no 128-bit source to narrow from
        let mut wide = state_with(0b011_000, 2);
        let lp = VLoop {
            vd: 1,
            vs2: 2,
            rhs: VOperand::Scalar(0),
            vm: true,
        };
        assert_eq!(
            vector_loop(&mut wide, lp, true, add),
            Err(TrapEvent::illegal())
        );
    }

    #[test]
    fn test_group_regs() {
        assert_eq!(group_regs(-3), 1);
        assert_eq!(group_regs(0), 1);
        assert_eq!(group_regs(3), 8);
    }
}
