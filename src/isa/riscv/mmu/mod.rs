//! Bare (untranslated) memory access for one hart: RAM, the debug ROM, the instruction cache and
//! the trigger module.

use crate::{
    config::{arch_config::WordType, debug_rom},
    isa::{
        DecoderTrait,
        icache::DirectICache,
        riscv::{
            RiscvTypes,
            decoder::{DecodeInstr, Decoder},
            diagnostic::DiagnosticRecord,
            instruction::{InstructionFetch, exec_mapping::get_exec_func},
            trap::{Exception, TrapEvent},
            trigger::{Trigger, TriggerGate, TriggerMatch, TriggerModule, TriggerOps},
        },
    },
    ram::{MemError, Ram},
    utils::UnsignedInteger,
};

/// `wfi; j -4` at the entry, `j -8` (back to the entry) at the trap vector.
const DEBUG_ROM_PARK: [u32; 3] = [0x1050_0073, 0xffdf_f06f, 0xff9f_f06f];

pub struct Mmu {
    ram: Ram,
    debug_rom: Ram,
    icache: DirectICache<RiscvTypes, InstructionFetch>,
    decoder: Decoder,
    triggers: TriggerModule,
    /// Data trigger hit by the instruction in flight. While set, data triggers are not
    /// re-evaluated so the instruction can be replayed to completion.
    pub matched_trigger: Option<TriggerMatch>,
}

impl Mmu {
    pub fn new(ram: Ram, icache_entries: usize) -> Self {
        let mut debug_rom = Ram::with_region(debug_rom::BASE_ADDR, debug_rom::SIZE);
        let image: Vec<u8> = DEBUG_ROM_PARK.iter().flat_map(|w| w.to_le_bytes()).collect();
        let written = debug_rom.insert_section(&image, debug_rom::ENTRY);
        debug_assert!(written.is_ok(), "debug ROM cannot hold the park loop");

        Self {
            ram,
            debug_rom,
            icache: DirectICache::new(icache_entries),
            decoder: Decoder::new(),
            triggers: TriggerModule::new(),
            matched_trigger: None,
        }
    }

    pub fn ram(&self) -> &Ram {
        &self.ram
    }

    pub fn ram_mut(&mut self) -> &mut Ram {
        self.icache.flush();
        &mut self.ram
    }

    fn region(&self, addr: WordType, len: usize) -> &Ram {
        if self.debug_rom.contains(addr, len) {
            &self.debug_rom
        } else {
            &self.ram
        }
    }

    /// Physical read without triggers or diagnostics.
    pub fn read_phys<T: UnsignedInteger>(&self, addr: WordType) -> Result<T, MemError> {
        self.region(addr, T::BYTES).read(addr)
    }

    /// Physical write without triggers or diagnostics. The debug ROM is not writable.
    pub fn write_phys<T: UnsignedInteger>(&mut self, addr: WordType, data: T) -> Result<(), MemError> {
        self.ram.write(addr, data)
    }

    pub fn decode(&self, raw: u32) -> Option<DecodeInstr> {
        self.decoder.decode(raw)
    }

    /// Fetch and decode the instruction at `pc`, bypassing the instruction cache.
    pub fn load_insn(
        &mut self,
        pc: WordType,
        gate: TriggerGate,
    ) -> Result<InstructionFetch, TrapEvent> {
        if let Some(m) = self.triggers.find_match(TriggerOps::EXECUTE, pc, 4, gate) {
            return Err(TrapEvent::DebugTriggerMatch(m));
        }

        let raw: u32 = self
            .read_phys(pc)
            .map_err(|err| TrapEvent::exception(Exception::from_instr_fetch_err(err), pc))?;

        match self.decoder.decode(raw) {
            Some(instr) => {
                log::trace!("fetched {raw:#010x} at {pc:#x}: {instr}");
                Ok(InstructionFetch {
                    raw,
                    instr,
                    func: get_exec_func(instr.0),
                })
            }
            None => {
                log::warn!("Illegal instruction: {raw:#x} at {pc:#x}");
                Err(TrapEvent::exception(
                    Exception::IllegalInstruction,
                    raw as WordType,
                ))
            }
        }
    }

    /// Cached fetch outside debug mode: the returned index chains to the fall-through
    /// successor through [`Mmu::icache_next`]. Instructions watched by an execute trigger are
    /// never cached, even while `gate` holds the trigger off.
    pub fn access_icache(
        &mut self,
        pc: WordType,
        gate: TriggerGate,
    ) -> Result<(usize, InstructionFetch), TrapEvent> {
        let idx = self.icache.index_of(pc);
        if let Some(fetch) = self.icache.lookup(idx, pc) {
            return Ok((idx, fetch));
        }

        let fetch = self.load_insn(pc, gate)?;
        if self.triggers.covers(TriggerOps::EXECUTE, pc, 4) {
            return Ok((idx, fetch));
        }
        log::trace!("I-Cache refill at {pc:#x}");
        Ok((self.icache.fill(pc, fetch), fetch))
    }

    /// The cached successor of entry `idx`, only if it is tagged with `pc`.
    #[inline(always)]
    pub fn icache_next(&self, idx: usize, pc: WordType) -> Option<(usize, InstructionFetch)> {
        let next = self.icache.next(idx);
        self.icache.lookup(next, pc).map(|fetch| (next, fetch))
    }

    pub fn flush_icache(&mut self) {
        self.icache.flush();
    }

    fn check_data_trigger(
        &mut self,
        op: TriggerOps,
        addr: WordType,
        len: usize,
        gate: TriggerGate,
    ) -> Result<(), TrapEvent> {
        if self.matched_trigger.is_some() || self.triggers.is_empty() {
            return Ok(());
        }
        if let Some(m) = self.triggers.find_match(op, addr, len as WordType, gate) {
            self.matched_trigger = Some(m);
            return Err(TrapEvent::DebugTriggerMatch(m));
        }
        Ok(())
    }

    /// Data load on behalf of an instruction: triggers, then memory, then the diagnostic log.
    pub fn load<T: UnsignedInteger>(
        &mut self,
        addr: WordType,
        diag: &mut DiagnosticRecord,
        gate: TriggerGate,
    ) -> Result<T, TrapEvent> {
        self.check_data_trigger(TriggerOps::LOAD, addr, T::BYTES, gate)?;
        let data: T = self
            .read_phys(addr)
            .map_err(|err| TrapEvent::exception(Exception::from_memory_err(err), addr))?;
        diag.log_mem_read(addr, data.into(), T::BYTES as u8);
        Ok(data)
    }

    /// Data store on behalf of an instruction: triggers, then memory, then the diagnostic log.
    pub fn store<T: UnsignedInteger>(
        &mut self,
        addr: WordType,
        data: T,
        diag: &mut DiagnosticRecord,
        gate: TriggerGate,
    ) -> Result<(), TrapEvent> {
        self.check_data_trigger(TriggerOps::STORE, addr, T::BYTES, gate)?;
        self.write_phys(addr, data)
            .map_err(|err| TrapEvent::exception(Exception::from_memory_err(err), addr))?;
        diag.log_mem_write(addr, data.into(), T::BYTES as u8);
        Ok(())
    }

    pub fn insert_trigger(&mut self, trigger: Trigger) -> usize {
        self.icache.flush();
        self.triggers.insert(trigger)
    }

    pub fn remove_trigger(&mut self, address: WordType) -> usize {
        self.icache.flush();
        self.triggers.remove(address)
    }

    pub fn clear_triggers(&mut self) {
        self.icache.flush();
        self.triggers.clear();
        self.matched_trigger = None;
    }

    pub fn triggers(&self) -> &TriggerModule {
        &self.triggers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        isa::riscv::{instruction::instr_table::RiscvInstr, trigger::TriggerAction},
        ram_config::BASE_ADDR,
    };

    fn mmu() -> Mmu {
        Mmu::new(Ram::new(), 64)
    }

    #[test]
    fn test_debug_rom_park_loop() {
        let mut mmu = mmu();
        let entry = mmu.load_insn(debug_rom::ENTRY, TriggerGate::Closed).unwrap();
        assert_eq!(entry.instr.0, RiscvInstr::WFI);
        let back = mmu.load_insn(debug_rom::TVEC, TriggerGate::Closed).unwrap();
        assert_eq!(back.instr.0, RiscvInstr::JAL);
        assert!(mmu.write_phys(debug_rom::ENTRY, 0u32).is_err());
    }

    #[test]
    fn test_fetch_errors() {
        let mut mmu = mmu();
        assert_eq!(
            mmu.load_insn(BASE_ADDR, TriggerGate::Open).unwrap_err(),
            TrapEvent::exception(Exception::IllegalInstruction, 0)
        );
        assert_eq!(
            mmu.load_insn(0x7000_0000, TriggerGate::Open).unwrap_err(),
            TrapEvent::exception(Exception::InstructionFault, 0x7000_0000)
        );
        assert_eq!(
            mmu.load_insn(BASE_ADDR + 2, TriggerGate::Open).unwrap_err(),
            TrapEvent::exception(Exception::InstructionMisaligned, BASE_ADDR + 2)
        );
    }

    #[test]
    fn test_icache_chain() {
        let mut mmu = mmu();
        mmu.write_phys(BASE_ADDR, 0x0010_0093u32).unwrap(); // addi ra, zero, 1
        mmu.write_phys(BASE_ADDR + 4, 0x0010_8093u32).unwrap(); // addi ra, ra, 1

        let (first, _) = mmu.access_icache(BASE_ADDR, TriggerGate::Open).unwrap();
        assert!(mmu.icache_next(first, BASE_ADDR + 4).is_none());

        let (second, fetch) = mmu.access_icache(BASE_ADDR + 4, TriggerGate::Open).unwrap();
        assert_eq!(fetch.raw, 0x0010_8093);
        assert_eq!(mmu.icache_next(first, BASE_ADDR + 4).unwrap().0, second);
        // tag mismatch breaks the chain
        assert!(mmu.icache_next(first, BASE_ADDR + 8).is_none());

        mmu.flush_icache();
        assert!(mmu.icache_next(first, BASE_ADDR + 4).is_none());
    }

    #[test]
    fn test_data_trigger_sets_matched_flag_once() {
        let mut mmu = mmu();
        let mut diag = DiagnosticRecord::default();
        mmu.insert_trigger(Trigger::data(
            BASE_ADDR + 0x100,
            8,
            TriggerOps::STORE,
            TriggerAction::DebugMode,
        ));

        let err = mmu
            .store(BASE_ADDR + 0x100, 7u64, &mut diag, TriggerGate::Open)
            .unwrap_err();
        assert!(matches!(err, TrapEvent::DebugTriggerMatch(_)));
        assert!(mmu.matched_trigger.is_some());
        assert!(diag.mem_writes.is_empty());

        // replay goes through while the flag is set
        mmu.store(BASE_ADDR + 0x100, 7u64, &mut diag, TriggerGate::Open).unwrap();
        assert_eq!(mmu.read_phys::<u64>(BASE_ADDR + 0x100).unwrap(), 7);
        assert_eq!(diag.mem_writes.len(), 1);

        // loads are not watched, debug mode ignores triggers
        mmu.matched_trigger = None;
        assert_eq!(mmu.load::<u64>(BASE_ADDR + 0x100, &mut diag, TriggerGate::Open), Ok(7));
        assert!(mmu.store(BASE_ADDR + 0x100, 8u64, &mut diag, TriggerGate::Closed).is_ok());
    }

    #[test]
    fn test_watched_instruction_is_not_cached_while_gated() {
        let mut mmu = mmu();
        mmu.write_phys(BASE_ADDR, 0x0010_0093u32).unwrap();
        mmu.insert_trigger(Trigger::execute(BASE_ADDR, TriggerAction::DebugException));

        // held off by the gate: the fetch succeeds but stays out of the cache
        let (idx, fetch) = mmu.access_icache(BASE_ADDR, TriggerGate::DebugModeOnly).unwrap();
        assert_eq!(fetch.raw, 0x0010_0093);
        assert_eq!(idx, mmu.icache.index_of(BASE_ADDR));
        assert!(mmu.icache.lookup(idx, BASE_ADDR).is_none());

        // so the trigger fires as soon as the gate opens
        assert!(matches!(
            mmu.access_icache(BASE_ADDR, TriggerGate::Open),
            Err(TrapEvent::DebugTriggerMatch(_))
        ));
    }

    #[test]
    fn test_execute_trigger_does_not_set_flag() {
        let mut mmu = mmu();
        mmu.insert_trigger(Trigger::execute(BASE_ADDR, TriggerAction::DebugException));
        let err = mmu.access_icache(BASE_ADDR, TriggerGate::Open).unwrap_err();
        assert!(matches!(err, TrapEvent::DebugTriggerMatch(m) if m.address == BASE_ADDR));
        assert!(mmu.matched_trigger.is_none());
    }
}
