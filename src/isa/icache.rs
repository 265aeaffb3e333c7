use std::marker::PhantomData;

use crate::{
    config::arch_config::WordType,
    isa::{InstrLen, riscv::RiscvTypes},
};

pub trait ToGroupId {
    fn group_id(addr: WordType) -> usize;
}

impl ToGroupId for RiscvTypes {
    #[inline]
    fn group_id(addr: WordType) -> usize {
        (addr as usize) >> 1
    }
}

#[derive(Clone, Copy)]
struct ICacheEntry<T: Copy> {
    slot: Option<(WordType, T)>,
    /// Index of the entry that would hold the fall-through successor.
    next: usize,
}

/// Direct-mapped instruction cache whose entries chain to their fall-through successor.
pub struct DirectICache<I: ToGroupId, T: Copy + InstrLen> {
    entries: Box<[ICacheEntry<T>]>,
    _isa: PhantomData<I>,
}

impl<I: ToGroupId, T: Copy + InstrLen> DirectICache<I, T> {
    pub fn new(n: usize) -> Self {
        assert!(n > 0 && n.is_power_of_two(), "icache size must be a power of two");
        Self {
            entries: vec![ICacheEntry { slot: None, next: 0 }; n].into_boxed_slice(),
            _isa: PhantomData,
        }
    }

    #[inline(always)]
    pub fn index_of(&self, addr: WordType) -> usize {
        I::group_id(addr) & (self.entries.len() - 1)
    }

    /// Cached data at `idx`, only if the entry is tagged with `addr`.
    #[inline(always)]
    pub fn lookup(&self, idx: usize, addr: WordType) -> Option<T> {
        match self.entries[idx].slot {
            Some((tag, data)) if tag == addr => Some(data),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn next(&self, idx: usize) -> usize {
        self.entries[idx].next
    }

    /// Install `data` for `addr` and return the entry index.
    pub fn fill(&mut self, addr: WordType, data: T) -> usize {
        let idx = self.index_of(addr);
        let next = self.index_of(addr.wrapping_add(data.len()));
        self.entries[idx] = ICacheEntry {
            slot: Some((addr, data)),
            next,
        };
        idx
    }

    pub fn flush(&mut self) {
        for entry in self.entries.iter_mut() {
            entry.slot = None;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
