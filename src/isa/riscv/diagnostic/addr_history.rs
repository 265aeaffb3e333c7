use std::collections::BTreeMap;

use crate::{config::arch_config::WordType, isa::riscv::diagnostic::DiagnosticRecord};

/// Reuse distance (in retired instructions) observed for one access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodSample {
    pub distance: u64,
    pub is_vector: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessInfo {
    pub first_access: PeriodSample,
    pub last_access: u64,
    pub periods: Vec<PeriodSample>,
}

impl AccessInfo {
    fn new(minstret: u64, is_vector: bool) -> Self {
        Self {
            first_access: PeriodSample {
                distance: minstret,
                is_vector,
            },
            last_access: minstret,
            periods: Vec::new(),
        }
    }
}

/// Per-address access history. Stores refresh the last-access stamp, loads record the
/// distance since the previous access.
#[derive(Debug, Default)]
pub struct AddressHistory {
    map: BTreeMap<WordType, AccessInfo>,
}

const VECTOR_OPCODES: [u32; 3] = [0x57, 0x07, 0x27];

impl AddressHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_vector_insn(insn: u32) -> bool {
        VECTOR_OPCODES.contains(&(insn & 0x7f))
    }

    pub fn record(&mut self, rec: &DiagnosticRecord, insn: u32, minstret: u64) {
        let is_vector = Self::is_vector_insn(insn);

        for access in rec.mem_writes.iter() {
            self.map
                .entry(access.addr)
                .and_modify(|info| info.last_access = minstret)
                .or_insert_with(|| AccessInfo::new(minstret, is_vector));
        }

        for access in rec.mem_reads.iter() {
            self.map
                .entry(access.addr)
                .and_modify(|info| {
                    info.periods.push(PeriodSample {
                        distance: minstret.wrapping_sub(info.last_access),
                        is_vector,
                    });
                    info.last_access = minstret;
                })
                .or_insert_with(|| AccessInfo::new(minstret, is_vector));
        }
    }

    pub fn get(&self, addr: WordType) -> Option<&AccessInfo> {
        self.map.get(&addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&WordType, &AccessInfo)> {
        self.map.iter()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
