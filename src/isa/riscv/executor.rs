use std::{collections::BTreeMap, ops::ControlFlow};

use crate::{
    config::{
        HartConfig,
        arch_config::{WordType, XLEN},
    },
    isa::riscv::{
        debugger::{DebugCause, enter_debug_mode},
        decoder::DecodeInstr,
        diagnostic::{
            AddressHistory, CommitRecord, DiagValue, DiagnosticSink, Marker, RegClass, TraceEvent,
            VectorSnapshot,
        },
        hart_state::{HaltRequest, HartState, SingleStep},
        instruction::{InstructionFetch, NextPc, instr_table::RiscvInstr},
        mmu::Mmu,
        trap::{Exception, Interrupt, Trap, TrapEvent, trap_controller::TrapController},
        trigger::TriggerAction,
    },
    ram::{MemError, Ram},
};

/// One hart: architectural state, its memory view and the optional diagnostic consumers.
pub struct Hart {
    pub state: HartState,
    pub mmu: Mmu,
    pub config: HartConfig,
    pub halt_request: HaltRequest,

    sink: Option<Box<dyn DiagnosticSink>>,
    addr_history: Option<AddressHistory>,
    pc_histogram: Option<BTreeMap<WordType, u64>>,
}

impl Hart {
    pub fn new(config: HartConfig) -> Self {
        Self::from_ram(Ram::new(), config)
    }

    pub fn from_ram(ram: Ram, config: HartConfig) -> Self {
        Self {
            state: HartState::new(config.hart_id),
            mmu: Mmu::new(ram, config.icache_entries),
            halt_request: HaltRequest::None,
            sink: None,
            addr_history: config.addr_history.then(AddressHistory::new),
            pc_histogram: config.pc_histogram.then(BTreeMap::new),
            config,
        }
    }

    pub fn attach_sink(&mut self, sink: Box<dyn DiagnosticSink>) {
        self.sink = Some(sink);
    }

    pub fn detach_sink(&mut self) -> Option<Box<dyn DiagnosticSink>> {
        self.sink.take()
    }

    pub fn addr_history(&self) -> Option<&AddressHistory> {
        self.addr_history.as_ref()
    }

    pub fn pc_histogram(&self) -> Option<&BTreeMap<WordType, u64>> {
        self.pc_histogram.as_ref()
    }

    /// Copy instruction words to `addr` and drop stale cached fetches.
    pub fn load_program(&mut self, addr: WordType, instrs: &[u32]) -> Result<(), MemError> {
        let bytes: Vec<u8> = instrs.iter().flat_map(|w| w.to_le_bytes()).collect();
        self.mmu.ram_mut().insert_section(&bytes, addr)?;
        self.mmu.flush_icache();
        Ok(())
    }

    pub fn set_interrupt_pending(&mut self, interrupt: Interrupt, pending: bool) {
        self.state.csr.set_interrupt_pending(interrupt, pending);
    }

    pub fn read_reg(&self, idx: u8) -> WordType {
        self.state.reg_file[idx as usize]
    }

    /// Write an integer register and record it for diagnostics. `x0` is ignored.
    pub(super) fn write_reg(&mut self, rd: u8, value: WordType) {
        if self.state.reg_file.write(rd, value) {
            self.state.diag.log_reg_write(
                RegClass::Integer,
                rd as u16,
                DiagValue::from_word(XLEN as u32, value),
            );
        }
    }

    pub fn minstret(&self) -> u64 {
        self.state.csr.minstret
    }

    /// Run the handler of `fetch` once and publish what it did.
    pub fn execute_insn(
        &mut self,
        pc: WordType,
        fetch: InstructionFetch,
    ) -> Result<NextPc, TrapEvent> {
        self.state
            .diag
            .reset(self.state.prv, XLEN as u32, self.config.flen);

        let DecodeInstr(_, info) = fetch.instr;
        match (fetch.func)(info, self, pc) {
            Ok(npc) => {
                if npc != NextPc::SerializeBefore {
                    self.emit_diagnostics(pc, &fetch);
                }
                Ok(npc)
            }
            Err(TrapEvent::WaitForInterrupt) => {
                self.emit_diagnostics(pc, &fetch);
                Err(TrapEvent::WaitForInterrupt)
            }
            Err(event) if event.is_memory_trap() => {
                // partial effects of a faulting multi-element access
                if !self.state.diag.reg_writes.is_empty() {
                    self.emit_diagnostics(pc, &fetch);
                }
                Err(event)
            }
            Err(event) => Err(event),
        }
    }

    fn emit_diagnostics(&mut self, pc: WordType, fetch: &InstructionFetch) {
        let rec = &self.state.diag;

        if let Some(sink) = self.sink.as_mut() {
            let vu = &self.state.vu;
            let vector = AddressHistory::is_vector_insn(fetch.raw).then(|| VectorSnapshot {
                sew: vu.sew(),
                lmul_log2: vu.vtype().lmul_log2,
                vl: vu.vl,
            });

            sink.commit(&CommitRecord {
                hart_id: self.config.hart_id,
                pc,
                insn: fetch.raw,
                record: rec,
                vector,
            });
            sink.instruction(&TraceEvent {
                pc,
                size: 4,
                addresses: rec.touched_addresses().collect(),
                is_branch: rec.is_branch,
                taken: rec.taken,
            });

            if let Some(marker) = Marker::from_insn(fetch.raw) {
                sink.marker(marker);
            }
            if matches!(
                fetch.instr.0,
                RiscvInstr::VSETVLI | RiscvInstr::VSETIVLI | RiscvInstr::VSETVL
            ) {
                sink.marker(Marker::VectorConfig {
                    vl: vu.vl,
                    vtype: vu.vtype_raw(),
                });
            }
        }

        if let Some(history) = self.addr_history.as_mut() {
            history.record(rec, fetch.raw, self.state.csr.minstret);
        }

        if let Some(histogram) = self.pc_histogram.as_mut() {
            *histogram.entry(pc).or_default() += 1;
        }
    }

    fn slow_path(&self) -> bool {
        self.config.ext_debug
            || self.state.single_step != SingleStep::None
            || self.state.debug_mode
    }

    /// Retire up to `n` instructions. Returns early when a trap is taken or the hart waits for
    /// an interrupt.
    pub fn step(&mut self, mut n: usize) {
        while n > 0 {
            if !self.state.debug_mode {
                match self.halt_request {
                    HaltRequest::Regular => {
                        enter_debug_mode(&mut self.state, DebugCause::DebugInterrupt)
                    }
                    HaltRequest::Group => enter_debug_mode(&mut self.state, DebugCause::Group),
                    HaltRequest::None if self.state.csr.dcsr.halt => {
                        enter_debug_mode(&mut self.state, DebugCause::Halt)
                    }
                    HaltRequest::None => {}
                }
            }

            let mut instret = 0;
            let mut pc = self.state.pc;

            if let Err(event) = self.run_batch(&mut pc, &mut instret, n) {
                self.handle_event(event, pc, &mut instret, &mut n);
            }

            self.state.csr.minstret = self.state.csr.minstret.wrapping_add(instret as u64);
            // CPI = 1
            self.state.csr.mcycle = self.state.csr.mcycle.wrapping_add(instret as u64);
            n = n.saturating_sub(instret);
        }
    }

    fn run_batch(
        &mut self,
        pc: &mut WordType,
        instret: &mut usize,
        n: usize,
    ) -> Result<(), TrapEvent> {
        if let Some(interrupt) = TrapController::pending_interrupt(&self.state) {
            return Err(TrapEvent::interrupt(interrupt));
        }

        if self.slow_path() {
            self.slow_path_batch(pc, instret, n)
        } else {
            self.fast_path_batch(pc, instret, n)
        }
    }

    fn slow_path_batch(
        &mut self,
        pc: &mut WordType,
        instret: &mut usize,
        n: usize,
    ) -> Result<(), TrapEvent> {
        while *instret < n {
            if !self.state.serialized && self.state.single_step == SingleStep::Stepped {
                self.state.single_step = SingleStep::None;
                if !self.state.debug_mode {
                    enter_debug_mode(&mut self.state, DebugCause::Step);
                    break;
                }
            }

            if self.state.single_step == SingleStep::Stepping {
                self.state.single_step = SingleStep::Stepped;
            }

            let fetch = self.mmu.load_insn(*pc, self.state.trigger_gate())?;
            if self.config.ext_debug && !self.state.serialized {
                log::info!("core {:3}: {:#018x} {}", self.config.hart_id, *pc, fetch);
            }

            let npc = self.execute_insn(*pc, fetch)?;
            if self.advance_pc(pc, npc, instret).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn fast_path_batch(
        &mut self,
        pc: &mut WordType,
        instret: &mut usize,
        n: usize,
    ) -> Result<(), TrapEvent> {
        while *instret < n {
            let (mut idx, mut fetch) = self.mmu.access_icache(*pc, self.state.trigger_gate())?;

            let npc = loop {
                let npc = self.execute_insn(*pc, fetch)?;
                let NextPc::Jump(next_pc) = npc else {
                    break npc;
                };
                match self.mmu.icache_next(idx, next_pc) {
                    Some((next_idx, next_fetch)) if *instret + 1 != n => {
                        *instret += 1;
                        *pc = next_pc;
                        self.state.pc = next_pc;
                        idx = next_idx;
                        fetch = next_fetch;
                    }
                    _ => break npc,
                }
            };

            if self.advance_pc(pc, npc, instret).is_break() {
                break;
            }
        }
        Ok(())
    }

    /// Commit `npc`. Breaks out of the batch on a serialization sentinel.
    fn advance_pc(
        &mut self,
        pc: &mut WordType,
        npc: NextPc,
        instret: &mut usize,
    ) -> ControlFlow<()> {
        match npc {
            NextPc::Jump(next_pc) => {
                *pc = next_pc;
                self.state.pc = next_pc;
                *instret += 1;
                ControlFlow::Continue(())
            }
            NextPc::SerializeBefore => {
                self.state.serialized = true;
                *pc = self.state.pc;
                ControlFlow::Break(())
            }
            NextPc::SerializeAfter => {
                *instret += 1;
                *pc = self.state.pc;
                ControlFlow::Break(())
            }
        }
    }

    fn handle_event(&mut self, event: TrapEvent, pc: WordType, instret: &mut usize, n: &mut usize) {
        match event {
            TrapEvent::Trap { cause, tval } => {
                TrapController::deliver(&mut self.state, cause, tval, pc);
                *n = *instret;

                // a trap taken by the stepped instruction still ends the step
                if self.state.single_step == SingleStep::Stepped {
                    self.state.single_step = SingleStep::None;
                    enter_debug_mode(&mut self.state, DebugCause::Step);
                }
            }
            TrapEvent::DebugTriggerMatch(matched) => {
                let mut pc = pc;
                if self.mmu.matched_trigger.is_some() {
                    // The access never happened. Re-run it with the match suppressed; memory
                    // instructions are idempotent up to their first access.
                    let replay = self.replay_insn(&mut pc, instret);
                    self.mmu.matched_trigger = None;
                    if let Err(event) = replay {
                        self.handle_event(event, pc, instret, n);
                        return;
                    }
                }

                log::debug!("trigger {} hit at {:#x}", matched.index, matched.address);
                match matched.action {
                    TriggerAction::DebugMode => {
                        enter_debug_mode(&mut self.state, DebugCause::HwBreakpoint)
                    }
                    TriggerAction::DebugException => {
                        TrapController::deliver(
                            &mut self.state,
                            Trap::Exception(Exception::Breakpoint),
                            matched.address,
                            pc,
                        );
                        *n = *instret;
                    }
                }
            }
            TrapEvent::DebugModeEntry => {
                enter_debug_mode(&mut self.state, DebugCause::SwBreakpoint);
            }
            TrapEvent::WaitForInterrupt => {
                *instret += 1;
                *n = *instret;
            }
        }
    }

    fn replay_insn(&mut self, pc: &mut WordType, instret: &mut usize) -> Result<(), TrapEvent> {
        let fetch = self.mmu.load_insn(*pc, self.state.trigger_gate())?;
        let npc = self.execute_insn(*pc, fetch)?;
        let _ = self.advance_pc(pc, npc, instret);
        Ok(())
    }
}
