mod cpu_tester;
pub mod csr_reg;
pub mod debugger;
pub mod decoder;
pub mod diagnostic;
pub mod executor;
pub mod hart_state;
pub mod instruction;
pub mod mmu;
pub mod trap;
pub mod trigger;
pub mod vector;

/// Marker type for the RISC-V instruction set, used to key ISA-generic containers.
#[derive(Debug)]
pub struct RiscvTypes;
