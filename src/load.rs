use crate::{
    config::arch_config::WordType,
    ram::{MemError, Ram},
    ram_config::BASE_ADDR,
};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("invalid elf: {0}")]
    Elf(&'static str),
    #[error("section at {addr:#x} ({len:#x} bytes) does not fit in memory")]
    OutOfRange { addr: WordType, len: usize },
}

fn insert(ram: &mut Ram, bytes: &[u8], addr: WordType) -> Result<(), LoadError> {
    ram.insert_section(bytes, addr)
        .map_err(|_: MemError| LoadError::OutOfRange {
            addr,
            len: bytes.len(),
        })
}

/// Copy every `PT_LOAD` segment of `elf_data` into `ram`. Returns the entry point.
pub fn load_elf(ram: &mut Ram, elf_data: &[u8]) -> Result<WordType, LoadError> {
    let elf = xmas_elf::ElfFile::new(elf_data).map_err(LoadError::Elf)?;
    let elf_header = elf.header;
    if elf_header.pt1.magic != [0x7f, 0x45, 0x4c, 0x46] {
        return Err(LoadError::Elf("bad magic"));
    }

    let ph_count = elf_header.pt2.ph_count();
    for i in 0..ph_count {
        // read the i-th item form program header table.
        let ph = elf.program_header(i).map_err(LoadError::Elf)?;
        if ph.get_type().map_err(LoadError::Elf)? != xmas_elf::program::Type::Load {
            continue;
        }

        let start = ph.offset() as usize;
        let end = start + ph.file_size() as usize;
        let bytes = elf
            .input
            .get(start..end)
            .ok_or(LoadError::Elf("segment out of file"))?;
        insert(ram, bytes, ph.virtual_addr() as WordType)?;
        log::debug!(
            "load segment {:#x}..{:#x}",
            ph.virtual_addr(),
            ph.virtual_addr() + ph.mem_size()
        );
    }

    Ok(elf_header.pt2.entry_point() as WordType)
}

/// Copy a raw image to the start of RAM. Returns the entry point.
pub fn load_bin(ram: &mut Ram, raw_data: &[u8]) -> Result<WordType, LoadError> {
    insert(ram, raw_data, BASE_ADDR)?;
    Ok(BASE_ADDR)
}
