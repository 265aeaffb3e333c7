mod exec_function;
mod exec_vector_function;

pub mod exec_mapping;
pub mod instr_table;

use std::fmt;

use crate::{
    config::arch_config::WordType,
    isa::{
        InstrLen,
        riscv::{
            decoder::DecodeInstr,
            executor::Hart,
            trap::{Exception, TrapEvent},
        },
    },
};

/// Where execution continues after an instruction handler returns normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextPc {
    /// Continue at the given address.
    Jump(WordType),
    /// Nothing was executed; rerun the instruction on the single-step path.
    SerializeBefore,
    /// The instruction completed and already set the PC; leave the current batch.
    SerializeAfter,
}

/// A helper function for normal instruction execution.
///
/// It takes a closure `f` that performs the actual instruction logic.
/// If `f` executes successfully, execution continues at `pc + 4`.
#[inline(always)]
pub(super) fn normal_exec<F>(hart: &mut Hart, pc: WordType, f: F) -> Result<NextPc, TrapEvent>
where
    F: FnOnce(&mut Hart) -> Result<(), TrapEvent>,
{
    f(hart)?;
    Ok(NextPc::Jump(pc.wrapping_add(4)))
}

/// A helper function for vector instruction execution.
///
/// Returns an illegal instruction exception when the vector unit is off (`mstatus.VS == 0`) or
/// `vtype` is illegal, otherwise calls [`normal_exec`] and marks the vector state dirty.
#[inline(always)]
pub(super) fn normal_vector_exec<F>(
    hart: &mut Hart,
    pc: WordType,
    f: F,
) -> Result<NextPc, TrapEvent>
where
    F: FnOnce(&mut Hart) -> Result<(), TrapEvent>,
{
    if !hart.state.csr.mstatus.vs_enabled() || hart.state.vu.vtype().vill {
        return Err(Exception::IllegalInstruction.into());
    }

    let next = normal_exec(hart, pc, f);
    hart.state.csr.mstatus.set_vs_dirty();
    next
}

/// Run `f` only once the hart is on the single-step path; otherwise ask to be re-run there.
#[inline(always)]
pub(super) fn serialize_before<F>(hart: &mut Hart, f: F) -> Result<NextPc, TrapEvent>
where
    F: FnOnce(&mut Hart) -> Result<NextPc, TrapEvent>,
{
    if !hart.state.serialized {
        return Ok(NextPc::SerializeBefore);
    }
    hart.state.serialized = false;
    f(hart)
}

/// Set the PC to `target` and end the current batch after this instruction.
#[inline(always)]
pub(super) fn set_pc_and_serialize(hart: &mut Hart, target: WordType) -> NextPc {
    hart.state.pc = target;
    NextPc::SerializeAfter
}

pub type ExecFn = fn(RVInstrInfo, &mut Hart, WordType) -> Result<NextPc, TrapEvent>;

/// `imm` value is shifted:
///
/// Type B: 1
/// Type U: 12
/// Type J: 12
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RVInstrInfo {
    None,
    R {
        rs1: u8,
        rs2: u8,
        rd: u8,
    },
    I {
        rs1: u8,
        rd: u8,
        imm: WordType,
    },
    S {
        rs1: u8,
        rs2: u8,
        imm: WordType,
    },
    B {
        rs1: u8,
        rs2: u8,
        imm: WordType,
    },
    U {
        rd: u8,
        imm: WordType,
    },
    J {
        rd: u8,
        imm: WordType,
    },
    /// `rs1` doubles as the 5-bit immediate of the `*I` forms.
    Csr {
        rd: u8,
        rs1: u8,
        csr: u16,
    },
    /// `vs1` doubles as `rs1` (`.vx`) and the 5-bit immediate (`.vi`).
    V {
        vd: u8,
        vs1: u8,
        vs2: u8,
        vm: bool,
    },
    /// Unit-stride load/store; `vd` is `vs3` for stores.
    VMem {
        vd: u8,
        rs1: u8,
        vm: bool,
    },
    /// `rs1` is the AVL immediate for `vsetivli`; `zimm` is unused by `vsetvl`.
    VSet {
        rd: u8,
        rs1: u8,
        rs2: u8,
        zimm: u16,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrFormat {
    None,
    R,
    I,
    S,
    B,
    U,
    J,
    Csr,
    V,
    VMem,
    VSetVli,
    VSetIvli,
    VSetVl,
}

/// A decoded instruction bound to its handler, as cached in the instruction cache.
#[derive(Clone, Copy)]
pub struct InstructionFetch {
    pub raw: u32,
    pub instr: DecodeInstr,
    pub func: ExecFn,
}

impl InstrLen for InstructionFetch {
    fn len(&self) -> WordType {
        4
    }
}

impl fmt::Debug for InstructionFetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstructionFetch")
            .field("raw", &format_args!("{:#010x}", self.raw))
            .field("instr", &self.instr)
            .finish()
    }
}

impl fmt::Display for InstructionFetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:#010x}) {}", self.raw, self.instr)
    }
}
