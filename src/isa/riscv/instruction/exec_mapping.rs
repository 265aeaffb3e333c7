use crate::{
    config::arch_config::WordType,
    isa::riscv::{
        csr_reg::{Mstatus, PrivilegeLevel},
        debugger::leave_debug_mode,
        executor::Hart,
        instruction::{
            ExecFn, NextPc, RVInstrInfo, exec_function::*, exec_vector_function::*,
            instr_table::RiscvInstr, normal_exec, serialize_before,
        },
        trap::{Exception, TrapEvent, trap_controller::TrapController},
    },
    utils::sign_extend,
};

pub(in crate::isa::riscv) fn get_exec_func(instr: RiscvInstr) -> ExecFn {
    match instr {
        //---------------------------------------
        // RV_I
        //---------------------------------------

        // Arith
        RiscvInstr::ADD | RiscvInstr::ADDI => exec_arith::<ExecAdd>,
        RiscvInstr::SUB => exec_arith::<ExecSub>,

        // Shift
        RiscvInstr::SLLI => exec_arith::<ExecSLL>,
        RiscvInstr::SRLI => exec_arith::<ExecSRL>,

        // Bit
        RiscvInstr::AND | RiscvInstr::ANDI => exec_arith::<ExecAnd>,
        RiscvInstr::OR | RiscvInstr::ORI => exec_arith::<ExecOr>,
        RiscvInstr::XOR | RiscvInstr::XORI => exec_arith::<ExecXor>,

        // Branch
        RiscvInstr::BEQ => exec_branch::<ExecEqual>,
        RiscvInstr::BNE => exec_branch::<ExecNotEqual>,
        RiscvInstr::BLT => exec_branch::<ExecSignedLess>,
        RiscvInstr::BGE => exec_branch::<ExecSignedGreatEqual>,
        RiscvInstr::BLTU => exec_branch::<ExecUnsignedLess>,
        RiscvInstr::BGEU => exec_branch::<ExecUnsignedGreatEqual>,

        // Load
        RiscvInstr::LW => exec_load::<u32, true>,
        RiscvInstr::LD => exec_load::<u64, false>,

        // Store
        RiscvInstr::SW => exec_store::<u32>,
        RiscvInstr::SD => exec_store::<u64>,

        // Jump and link
        RiscvInstr::JAL => |info: RVInstrInfo, hart: &mut Hart, pc: WordType| {
            let RVInstrInfo::J { rd, imm } = info else {
                std::unreachable!();
            };
            let target = pc.wrapping_add(sign_extend(imm, 21));

            // > "The JAL and JALR instructions will generate an instruction-address-misaligned exception
            // if the target address is not aligned to a four-byte boundary."
            check_jump_target(target)?;

            hart.write_reg(rd, pc.wrapping_add(4));
            Ok(NextPc::Jump(target))
        },

        RiscvInstr::JALR => |info, hart, pc| {
            let RVInstrInfo::I { rs1, rd, imm } = info else {
                std::unreachable!();
            };
            let target = hart.read_reg(rs1).wrapping_add(sign_extend(imm, 12)) & !1;

            // Same as JAL
            check_jump_target(target)?;

            hart.write_reg(rd, pc.wrapping_add(4));
            Ok(NextPc::Jump(target))
        },

        RiscvInstr::AUIPC => |info, hart, pc| {
            let RVInstrInfo::U { rd, imm } = info else {
                std::unreachable!();
            };
            normal_exec(hart, pc, |hart| {
                hart.write_reg(rd, pc.wrapping_add(sign_extend(imm, 32)));
                Ok(())
            })
        },

        RiscvInstr::LUI => |info, hart, pc| {
            let RVInstrInfo::U { rd, imm } = info else {
                std::unreachable!();
            };
            normal_exec(hart, pc, |hart| {
                hart.write_reg(rd, sign_extend(imm, 32));
                Ok(())
            })
        },

        // We are executing in order, so don't need to do anything.
        RiscvInstr::FENCE => exec_nop,

        RiscvInstr::FENCE_I => |_info, hart, pc| {
            serialize_before(hart, |hart| {
                hart.mmu.flush_icache();
                Ok(NextPc::Jump(pc.wrapping_add(4)))
            })
        },

        //---------------------------------------
        // System
        //---------------------------------------
        RiscvInstr::ECALL => |_info, hart, _pc| {
            let cause = match hart.state.prv {
                PrivilegeLevel::U => Exception::UserEnvCall,
                PrivilegeLevel::S => Exception::SupervisorEnvCall,
                PrivilegeLevel::M => Exception::MachineEnvCall,
            };
            Err(TrapEvent::exception(cause, 0))
        },

        RiscvInstr::EBREAK => |_info, hart, pc| {
            let state = &hart.state;
            if !state.debug_mode && state.csr.dcsr.ebreak_enters_debug(state.prv) {
                return Err(TrapEvent::DebugModeEntry);
            }
            Err(TrapEvent::exception(Exception::Breakpoint, pc))
        },

        RiscvInstr::MRET => |_info, hart, _pc| {
            if hart.state.prv != PrivilegeLevel::M {
                return Err(TrapEvent::illegal());
            }
            TrapController::mret(&mut hart.state);
            Ok(NextPc::SerializeAfter)
        },

        RiscvInstr::SRET => |_info, hart, _pc| {
            if hart.state.prv < PrivilegeLevel::S {
                return Err(TrapEvent::illegal());
            }
            if hart.state.prv == PrivilegeLevel::S
                && hart.state.csr.mstatus.contains(Mstatus::TSR)
            {
                return Err(TrapEvent::illegal());
            }
            TrapController::sret(&mut hart.state);
            Ok(NextPc::SerializeAfter)
        },

        RiscvInstr::DRET => |_info, hart, _pc| {
            if !hart.state.debug_mode {
                return Err(TrapEvent::illegal());
            }
            leave_debug_mode(&mut hart.state);
            Ok(NextPc::SerializeAfter)
        },

        RiscvInstr::WFI => |_info, hart, pc| {
            match hart.state.prv {
                PrivilegeLevel::U => return Err(TrapEvent::illegal()),
                PrivilegeLevel::S if hart.state.csr.mstatus.contains(Mstatus::TW) => {
                    return Err(TrapEvent::illegal());
                }
                _ => {}
            }
            // resume after the wfi once the batch is abandoned
            hart.state.pc = pc.wrapping_add(4);
            Err(TrapEvent::WaitForInterrupt)
        },

        //---------------------------------------
        // Zicsr
        //---------------------------------------
        RiscvInstr::CSRRW => exec_csrw::<false>,
        RiscvInstr::CSRRC => exec_csr_bit::<false, false>,
        RiscvInstr::CSRRS => exec_csr_bit::<true, false>,
        RiscvInstr::CSRRWI => exec_csrw::<true>,
        RiscvInstr::CSRRCI => exec_csr_bit::<false, true>,
        RiscvInstr::CSRRSI => exec_csr_bit::<true, true>,

        //---------------------------------------
        // RV_V
        //---------------------------------------

        // Configuration
        RiscvInstr::VSETVLI => exec_vsetvli,
        RiscvInstr::VSETIVLI => exec_vsetivli,
        RiscvInstr::VSETVL => exec_vsetvl,

        // Unit-stride memory
        RiscvInstr::VLE8_V => exec_vload::<u8>,
        RiscvInstr::VLE16_V => exec_vload::<u16>,
        RiscvInstr::VLE32_V => exec_vload::<u32>,
        RiscvInstr::VLE64_V => exec_vload::<u64>,
        RiscvInstr::VSE8_V => exec_vstore::<u8>,
        RiscvInstr::VSE16_V => exec_vstore::<u16>,
        RiscvInstr::VSE32_V => exec_vstore::<u32>,
        RiscvInstr::VSE64_V => exec_vstore::<u64>,

        // Integer add
        RiscvInstr::VADD_VV => exec_varith::<VAdd, { src::VV }, false>,
        RiscvInstr::VADD_VX => exec_varith::<VAdd, { src::VX }, false>,
        RiscvInstr::VADD_VI => exec_varith::<VAdd, { src::VI }, false>,

        // Saturating add
        RiscvInstr::VSADDU_VV => exec_varith::<VSaddu, { src::VV }, false>,
        RiscvInstr::VSADDU_VX => exec_varith::<VSaddu, { src::VX }, false>,
        RiscvInstr::VSADDU_VI => exec_varith::<VSaddu, { src::VI }, false>,
        RiscvInstr::VSADD_VV => exec_varith::<VSadd, { src::VV }, false>,
        RiscvInstr::VSADD_VX => exec_varith::<VSadd, { src::VX }, false>,
        RiscvInstr::VSADD_VI => exec_varith::<VSadd, { src::VI }, false>,

        // Averaging add
        RiscvInstr::VAADDU_VV => exec_varith::<VAaddu, { src::VV }, false>,
        RiscvInstr::VAADDU_VX => exec_varith::<VAaddu, { src::VX }, false>,
        RiscvInstr::VAADD_VV => exec_varith::<VAadd, { src::VV }, false>,
        RiscvInstr::VAADD_VX => exec_varith::<VAadd, { src::VX }, false>,

        // Fractional multiply
        RiscvInstr::VSMUL_VV => exec_varith::<VSmul, { src::VV }, false>,
        RiscvInstr::VSMUL_VX => exec_varith::<VSmul, { src::VX }, false>,

        // Scaling shift
        RiscvInstr::VSSRL_VV => exec_varith::<VSsrl, { src::VV }, false>,
        RiscvInstr::VSSRL_VX => exec_varith::<VSsrl, { src::VX }, false>,
        RiscvInstr::VSSRL_VI => exec_varith::<VSsrl, { src::VUI }, false>,
        RiscvInstr::VSSRA_VV => exec_varith::<VSsra, { src::VV }, false>,
        RiscvInstr::VSSRA_VX => exec_varith::<VSsra, { src::VX }, false>,
        RiscvInstr::VSSRA_VI => exec_varith::<VSsra, { src::VUI }, false>,

        // Narrowing clip
        RiscvInstr::VNCLIPU_WV => exec_varith::<VNclipu, { src::VV }, true>,
        RiscvInstr::VNCLIPU_WX => exec_varith::<VNclipu, { src::VX }, true>,
        RiscvInstr::VNCLIPU_WI => exec_varith::<VNclipu, { src::VUI }, true>,
        RiscvInstr::VNCLIP_WV => exec_varith::<VNclip, { src::VV }, true>,
        RiscvInstr::VNCLIP_WX => exec_varith::<VNclip, { src::VX }, true>,
        RiscvInstr::VNCLIP_WI => exec_varith::<VNclip, { src::VUI }, true>,
    }
}
