use crate::{
    config::arch_config::WordType,
    ram_config,
    utils::{UnsignedInteger, check_align},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MemError {
    #[error("misaligned load")]
    LoadMisaligned,
    #[error("load access fault")]
    LoadFault,
    #[error("misaligned store")]
    StoreMisaligned,
    #[error("store access fault")]
    StoreFault,
}

/// A contiguous physical memory region.
pub struct Ram {
    base: WordType,
    data: Box<[u8]>,
}

impl Ram {
    pub fn new() -> Self {
        Self::with_region(ram_config::BASE_ADDR, ram_config::SIZE)
    }

    pub fn with_region(base: WordType, size: usize) -> Self {
        Self {
            base,
            data: vec![0u8; size].into_boxed_slice(),
        }
    }

    pub fn base(&self) -> WordType {
        self.base
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn contains(&self, addr: WordType, len: usize) -> bool {
        addr >= self.base
            && (addr - self.base)
                .checked_add(len as WordType)
                .is_some_and(|end| end <= self.data.len() as WordType)
    }

    /// Copy `bytes` into the region starting at physical address `addr`.
    pub fn insert_section(&mut self, bytes: &[u8], addr: WordType) -> Result<(), MemError> {
        if !self.contains(addr, bytes.len()) {
            log::error!(
                "ram::insert_section out of range! addr = {:#x}, len = {:#x}",
                addr,
                bytes.len()
            );
            return Err(MemError::StoreFault);
        }

        let offset = (addr - self.base) as usize;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn read<T: UnsignedInteger>(&self, addr: WordType) -> Result<T, MemError> {
        if !check_align::<T>(addr) {
            return Err(MemError::LoadMisaligned);
        }
        if !self.contains(addr, T::BYTES) {
            return Err(MemError::LoadFault);
        }

        let offset = (addr - self.base) as usize;
        Ok(T::from_le_slice(&self.data[offset..]))
    }

    pub fn write<T: UnsignedInteger>(&mut self, addr: WordType, data: T) -> Result<(), MemError> {
        if !check_align::<T>(addr) {
            return Err(MemError::StoreMisaligned);
        }
        if !self.contains(addr, T::BYTES) {
            return Err(MemError::StoreFault);
        }

        let offset = (addr - self.base) as usize;
        data.write_le_slice(&mut self.data[offset..]);
        Ok(())
    }
}

impl Default for Ram {
    fn default() -> Self {
        Self::new()
    }
}
