use crate::config::arch_config::WordType;

pub mod icache;
pub mod riscv;

mod utils;

pub trait DecoderTrait<Desc, Rst> {
    fn from_isa(instrs: &[Desc]) -> Self;
    fn decode(&self, instr: u32) -> Option<Rst>;
}

pub trait InstrLen {
    fn len(&self) -> WordType;
}

impl InstrLen for u32 {
    fn len(&self) -> WordType {
        4
    }
}
