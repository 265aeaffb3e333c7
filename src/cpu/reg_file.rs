use std::{
    fmt::Debug,
    ops::{Index, IndexMut},
};

use crate::config::arch_config::{REG_NAME, REGFILE_CNT, WordType};

pub struct RegFile {
    data: [WordType; REGFILE_CNT],
}

impl Index<usize> for RegFile {
    type Output = WordType;

    fn index(&self, index: usize) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<usize> for RegFile {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl Debug for RegFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let byte_len = size_of::<WordType>();
        let hex_width = byte_len * 2;

        writeln!(f, "reg_file {{")?;
        for (i, val) in self.data.iter().enumerate() {
            if i % 8 == 0 {
                write!(f, "  ")?;
            }

            write!(
                f,
                "{:>6}: 0x{:0width$x}  ",
                REG_NAME[i],
                val,
                width = hex_width
            )?;

            if i % 8 == 7 {
                writeln!(f)?;
            }
        }

        if self.data.len() % 8 != 0 {
            writeln!(f)?;
        }

        write!(f, "}}")
    }
}

impl RegFile {
    pub fn new() -> Self {
        Self {
            data: [0; REGFILE_CNT],
        }
    }

    pub fn read(&self, id1: u8, id2: u8) -> (WordType, WordType) {
        (self.data[id1 as usize], self.data[id2 as usize])
    }

    /// Writes to `x0` are dropped. Returns whether the register changed.
    pub fn write(&mut self, id: u8, data: WordType) -> bool {
        if id == 0u8 {
            return false;
        }

        self.data[id as usize] = data;
        true
    }
}

impl Default for RegFile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_x0_is_hardwired() {
        let mut rf = RegFile::new();
        assert!(!rf.write(0, 5));
        assert!(rf.write(10, 0x1234));
        assert_eq!(rf.read(0, 10), (0, 0x1234));
        assert!(format!("{rf:?}").contains("a0: 0x0000000000001234"));
    }
}
