use crate::{
    config::{arch_config::WordType, debug_rom},
    isa::riscv::{
        csr_reg::{Mstatus, PrivilegeLevel},
        hart_state::{HartState, SingleStep},
        trap::{Exception, Interrupt, Trap},
    },
};

/// Standard interrupt priority, highest first.
const INTERRUPT_PRIORITY: [Interrupt; 6] = [
    Interrupt::MachineExternal,
    Interrupt::MachineSoft,
    Interrupt::MachineTimer,
    Interrupt::SupervisorExternal,
    Interrupt::SupervisorSoft,
    Interrupt::SupervisorTimer,
];

pub(in crate::isa::riscv) struct TrapController {}

impl TrapController {
    // ======================================
    //                M-Mode
    // ======================================
    fn send_trap_signal_m_mode(state: &mut HartState, cause: Trap, tval: WordType, epc: WordType) {
        let csr = &mut state.csr;
        csr.mcause = cause.into();
        csr.mepc = epc;
        csr.mtval = tval;

        let mie = csr.mstatus.contains(Mstatus::MIE);
        csr.mstatus.set(Mstatus::MPIE, mie);
        csr.mstatus.remove(Mstatus::MIE);
        csr.mstatus.set_mpp(state.prv);

        state.prv = PrivilegeLevel::M;
        state.pc = Self::next_pc_by_tvec(cause, csr.mtvec);
    }

    pub fn mret(state: &mut HartState) {
        let mstatus = &mut state.csr.mstatus;
        let mpp = mstatus.mpp();

        mstatus.set(Mstatus::MIE, mstatus.contains(Mstatus::MPIE));
        mstatus.insert(Mstatus::MPIE);
        if mpp != PrivilegeLevel::M {
            // MPP is not M-Mode, clear mprv.
            mstatus.remove(Mstatus::MPRV);
        }
        mstatus.set_mpp(PrivilegeLevel::U);

        state.prv = mpp;
        state.pc = state.csr.mepc;
    }

    // ======================================
    //                S-Mode
    // ======================================
    fn send_trap_signal_s_mode(state: &mut HartState, cause: Trap, tval: WordType, epc: WordType) {
        let csr = &mut state.csr;
        csr.scause = cause.into();
        csr.sepc = epc;
        csr.stval = tval;

        let sie = csr.mstatus.contains(Mstatus::SIE);
        csr.mstatus.set(Mstatus::SPIE, sie);
        csr.mstatus.remove(Mstatus::SIE);
        csr.mstatus.set(Mstatus::SPP, state.prv != PrivilegeLevel::U);

        state.prv = PrivilegeLevel::S;
        state.pc = Self::next_pc_by_tvec(cause, csr.stvec);
    }

    pub fn sret(state: &mut HartState) {
        let mstatus = &mut state.csr.mstatus;
        let spp = mstatus.spp();

        mstatus.set(Mstatus::SIE, mstatus.contains(Mstatus::SPIE));
        mstatus.insert(Mstatus::SPIE);
        mstatus.remove(Mstatus::SPP);
        if spp != PrivilegeLevel::M {
            mstatus.remove(Mstatus::MPRV);
        }

        state.prv = spp;
        state.pc = state.csr.sepc;
    }

    // ======================================
    //                 Common
    // ======================================

    fn is_delegated(state: &HartState, cause: Trap) -> bool {
        if state.prv == PrivilegeLevel::M {
            return false;
        }
        match cause {
            Trap::Interrupt(interrupt) => state.csr.is_interrupt_delegated(interrupt),
            Trap::Exception(exception) => state.csr.is_exception_delegated(exception),
        }
    }

    /// Take `cause` raised by the instruction at `epc`. Never fails.
    ///
    /// In debug mode nothing is recorded: breakpoints go back to the debug ROM entry, every
    /// other trap to the debug ROM trap vector.
    pub fn deliver(state: &mut HartState, cause: Trap, tval: WordType, epc: WordType) {
        if state.debug_mode {
            log::debug!("{cause:?} in debug mode at {epc:#x}");
            state.pc = match cause {
                Trap::Exception(Exception::Breakpoint) => debug_rom::ENTRY,
                _ => debug_rom::TVEC,
            };
            return;
        }

        log::debug!("trap {cause:?} at {epc:#x}, tval = {tval:#x}");
        if Self::is_delegated(state, cause) {
            Self::send_trap_signal_s_mode(state, cause, tval, epc);
        } else {
            Self::send_trap_signal_m_mode(state, cause, tval, epc);
        }
    }

    /// Highest-priority interrupt that is pending, enabled and allowed to be taken now.
    pub fn pending_interrupt(state: &HartState) -> Option<Interrupt> {
        if state.debug_mode || (state.single_step != SingleStep::None && !state.csr.dcsr.stepie)
        {
            return None;
        }

        let csr = &state.csr;
        let pending = csr.mip & csr.mie;
        if pending == 0 {
            return None;
        }

        let m_enabled = state.prv < PrivilegeLevel::M || csr.mstatus.contains(Mstatus::MIE);
        let mut enabled = if m_enabled {
            pending & !csr.mideleg
        } else {
            0
        };

        if enabled == 0 {
            let s_enabled = state.prv < PrivilegeLevel::S
                || (state.prv == PrivilegeLevel::S && csr.mstatus.contains(Mstatus::SIE));
            if s_enabled {
                enabled = pending & csr.mideleg;
            }
        }

        INTERRUPT_PRIORITY
            .into_iter()
            .find(|interrupt| enabled & interrupt.mask() != 0)
    }

    /// Get the next pc value according to the trap vector (like `mtvec` or `stvec`).
    #[must_use]
    fn next_pc_by_tvec(cause: Trap, tvec: WordType) -> WordType {
        let base = tvec & !0b11;
        match (tvec & 0b11, cause) {
            (1, Trap::Interrupt(ir)) => {
                // Vector Mode
                let offset: WordType = ir.into();
                base + offset * 4
            }
            // Direct Mode
            _ => base,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        isa::riscv::{cpu_tester::run_test_cpu_step, csr_reg::csr_index},
        ram_config,
    };

    const IRQ_HANDLER_ADDR: WordType = 0x80002000;

    fn check_mcause(exception: Exception) -> impl FnOnce(WordType) {
        move |mcause| assert_eq!(mcause, WordType::from(Trap::Exception(exception)))
    }

    #[test]
    fn test_load_fault() {
        run_test_cpu_step(
            &[0x0007b503], // ld a0, 0(a5)
            |builder| {
                builder
                    .csr(csr_index::mtvec, IRQ_HANDLER_ADDR)
                    .reg(15, 0x7000_0000)
            },
            |checker| {
                checker
                    .pc(IRQ_HANDLER_ADDR)
                    .csr(csr_index::mepc, ram_config::BASE_ADDR)
                    .csr(csr_index::mtval, 0x7000_0000)
                    .csr_with(csr_index::mcause, check_mcause(Exception::LoadFault))
            },
        );
    }

    #[test]
    fn test_load_misaligned() {
        const BASE_LOAD_MEM: WordType = 0x80001000;
        run_test_cpu_step(
            &[0x0017B503], // ld a0, 1(a5)
            |builder| {
                builder
                    .csr(csr_index::mtvec, IRQ_HANDLER_ADDR)
                    .reg(15, BASE_LOAD_MEM)
            },
            |checker| {
                checker
                    .pc(IRQ_HANDLER_ADDR)
                    .csr(csr_index::mepc, ram_config::BASE_ADDR)
                    .csr(csr_index::mtval, BASE_LOAD_MEM + 1)
                    .csr_with(csr_index::mcause, check_mcause(Exception::LoadMisaligned))
            },
        );
    }

    #[test]
    fn test_store_fault() {
        run_test_cpu_step(
            &[0x00a7b023], // sd a0, 0(a5)
            |builder| builder.csr(csr_index::mtvec, IRQ_HANDLER_ADDR | 0b00),
            |checker| {
                checker
                    .pc(IRQ_HANDLER_ADDR)
                    .csr(csr_index::mepc, ram_config::BASE_ADDR)
                    .csr_with(csr_index::mcause, check_mcause(Exception::StoreFault))
            },
        );
    }

    #[test]
    fn test_illegal_instr() {
        const PC_START: WordType = 0x80001000;
        run_test_cpu_step(
            &[0x00a7b023], // Any Instr. Because `PC` do not start as 0x80000000.
            |builder| {
                builder
                    .csr(csr_index::mtvec, IRQ_HANDLER_ADDR | 0b00)
                    .pc(PC_START)
            },
            |checker| {
                checker
                    .pc(IRQ_HANDLER_ADDR)
                    .csr(csr_index::mepc, PC_START)
                    .csr_with(csr_index::mcause, check_mcause(Exception::IllegalInstruction))
            },
        );
    }

    #[test]
    fn test_instr_fault() {
        const PC_START: WordType = 0x70000000;
        run_test_cpu_step(
            &[0x00a7b023], // Any Instr. Because `PC` do not start as 0x80000000.
            |builder| {
                builder
                    .csr(csr_index::mtvec, IRQ_HANDLER_ADDR | 0b00)
                    .pc(PC_START)
            },
            |checker| {
                checker
                    .pc(IRQ_HANDLER_ADDR)
                    .csr(csr_index::mepc, PC_START)
                    .csr(csr_index::mtval, PC_START)
                    .csr_with(csr_index::mcause, check_mcause(Exception::InstructionFault))
            },
        );
    }

    #[test]
    fn test_instr_misaligned() {
        const PC_START: WordType = 0x80000001;
        run_test_cpu_step(
            &[0x00a7b023], // Any Instr. Because `PC` do not start as 0x80000000.
            |builder| {
                builder
                    .csr(csr_index::mtvec, IRQ_HANDLER_ADDR | 0b00)
                    .pc(PC_START)
            },
            |checker| {
                checker
                    .pc(IRQ_HANDLER_ADDR)
                    .csr(csr_index::mepc, PC_START)
                    .csr_with(
                        csr_index::mcause,
                        check_mcause(Exception::InstructionMisaligned),
                    )
            },
        );
    }

    #[test]
    fn test_swap() {
        run_test_cpu_step(
            &[0x34011173], // csrrw sp, mscratch, sp
            |builder| builder.csr(csr_index::mscratch, 0x114514).reg(2, 0x0721),
            |checker| checker.csr(csr_index::mscratch, 0x0721).reg(2, 0x114514),
        );
    }

    #[test]
    fn test_delegated_ecall_from_user() {
        run_test_cpu_step(
            &[0x00000073], // ecall
            |builder| {
                builder
                    .csr(csr_index::medeleg, 1 << 8)
                    .csr(csr_index::stvec, IRQ_HANDLER_ADDR)
                    .prv(PrivilegeLevel::U)
            },
            |checker| {
                checker
                    .pc(IRQ_HANDLER_ADDR)
                    .prv(PrivilegeLevel::S)
                    .csr(csr_index::sepc, ram_config::BASE_ADDR)
                    .csr(csr_index::scause, 8)
                    .csr(csr_index::mcause, 0)
            },
        );
    }

    #[test]
    fn test_interrupt_priority_and_enable() {
        let mut state = HartState::new(0);
        state.csr.mie = Interrupt::MachineTimer.mask() | Interrupt::SupervisorSoft.mask();
        state.csr.mip = state.csr.mie;

        // M-mode with MIE clear takes nothing
        assert_eq!(TrapController::pending_interrupt(&state), None);

        state.csr.mstatus.insert(Mstatus::MIE);
        assert_eq!(
            TrapController::pending_interrupt(&state),
            Some(Interrupt::MachineTimer)
        );

        state.csr.mie |= Interrupt::MachineExternal.mask();
        state.csr.mip |= Interrupt::MachineExternal.mask();
        assert_eq!(
            TrapController::pending_interrupt(&state),
            Some(Interrupt::MachineExternal)
        );

        // delegated to S, taken from U regardless of SIE
        state.csr.mie = Interrupt::SupervisorSoft.mask();
        state.csr.mideleg = Interrupt::SupervisorSoft.mask();
        state.prv = PrivilegeLevel::U;
        assert_eq!(
            TrapController::pending_interrupt(&state),
            Some(Interrupt::SupervisorSoft)
        );

        state.single_step = SingleStep::Stepping;
        assert_eq!(TrapController::pending_interrupt(&state), None);
        state.csr.dcsr.stepie = true;
        assert!(TrapController::pending_interrupt(&state).is_some());

        state.debug_mode = true;
        assert_eq!(TrapController::pending_interrupt(&state), None);
    }

    #[test]
    fn test_debug_mode_traps_stay_in_rom() {
        let mut state = HartState::new(0);
        state.debug_mode = true;
        state.csr.mtvec = IRQ_HANDLER_ADDR;

        TrapController::deliver(&mut state, Trap::Exception(Exception::LoadFault), 0, 0x800);
        assert_eq!(state.pc, debug_rom::TVEC);
        TrapController::deliver(&mut state, Trap::Exception(Exception::Breakpoint), 0, 0x808);
        assert_eq!(state.pc, debug_rom::ENTRY);
        assert_eq!(state.csr.mcause, 0);
    }

    #[test]
    fn test_mret_restores_previous_mode() {
        let mut state = HartState::new(0);
        state.csr.mtvec = IRQ_HANDLER_ADDR;
        state.prv = PrivilegeLevel::S;
        state.csr.mstatus.insert(Mstatus::MIE);

        TrapController::deliver(&mut state, Trap::Exception(Exception::Breakpoint), 0x40, 0x8000_0040);
        assert_eq!(state.prv, PrivilegeLevel::M);
        assert_eq!(state.csr.mstatus.mpp(), PrivilegeLevel::S);
        assert!(!state.csr.mstatus.contains(Mstatus::MIE));
        assert!(state.csr.mstatus.contains(Mstatus::MPIE));

        TrapController::mret(&mut state);
        assert_eq!(state.prv, PrivilegeLevel::S);
        assert_eq!(state.pc, 0x8000_0040);
        assert!(state.csr.mstatus.contains(Mstatus::MIE));
        assert_eq!(state.csr.mstatus.mpp(), PrivilegeLevel::U);
    }

    #[test]
    fn test_next_pc_by_tvec() {
        let base = 0x12340 as WordType;
        assert_eq!(
            TrapController::next_pc_by_tvec(Trap::Exception(Exception::InstructionFault), base | 1),
            base
        );

        assert_eq!(
            TrapController::next_pc_by_tvec(Trap::Interrupt(Interrupt::MachineTimer), base | 1),
            base + 0x1c
        );
        assert_eq!(
            TrapController::next_pc_by_tvec(Trap::Interrupt(Interrupt::MachineTimer), base),
            base
        );
    }
}
