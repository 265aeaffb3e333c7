#![cfg(test)]
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;

use crate::{
    config::{
        HartConfig,
        arch_config::{REGFILE_CNT, WordType},
    },
    isa::riscv::{
        csr_reg::PrivilegeLevel,
        decoder::DecodeInstr,
        executor::Hart,
        instruction::{
            InstructionFetch, NextPc, RVInstrInfo, exec_mapping::get_exec_func,
            instr_table::RiscvInstr,
        },
        trap::TrapEvent,
    },
    ram_config::BASE_ADDR,
    utils::{UnsignedInteger, sign_extend},
};

type Setup = Box<dyn FnOnce(&mut Hart)>;

pub(crate) struct TestCPUBuilder {
    config: HartConfig,
    setup: Vec<Setup>,
}

impl TestCPUBuilder {
    pub(crate) fn new() -> Self {
        Self {
            config: HartConfig::default(),
            setup: Vec::new(),
        }
    }

    fn with(mut self, f: impl FnOnce(&mut Hart) + 'static) -> Self {
        self.setup.push(Box::new(f));
        self
    }

    pub(crate) fn config(mut self, config: HartConfig) -> Self {
        self.config = config;
        self
    }

    pub(crate) fn reg(self, idx: u8, value: WordType) -> Self {
        self.with(move |hart| {
            hart.state.reg_file.write(idx, value);
        })
    }

    pub(crate) fn pc(self, value: WordType) -> Self {
        self.with(move |hart| hart.state.pc = value)
    }

    pub(crate) fn prv(self, prv: PrivilegeLevel) -> Self {
        self.with(move |hart| hart.state.prv = prv)
    }

    pub(crate) fn mem<T: UnsignedInteger + 'static>(self, addr: WordType, value: T) -> Self {
        self.with(move |hart| hart.mmu.write_phys(addr, value).unwrap())
    }

    pub(crate) fn mem_base<T: UnsignedInteger + 'static>(self, addr: WordType, value: T) -> Self {
        self.mem(BASE_ADDR + addr, value)
    }

    pub(crate) fn program(self, instrs: &[u32]) -> Self {
        let instrs = instrs.to_vec();
        self.with(move |hart| hart.load_program(BASE_ADDR, &instrs).unwrap())
    }

    pub(crate) fn csr(self, csr_addr: u16, value: WordType) -> Self {
        self.with(move |hart| hart.state.write_csr(csr_addr, value).unwrap())
    }

    /// Configure the vector unit as `vsetvli` with `avl` and `vtype` would.
    pub(crate) fn vtype(self, vtype: WordType, avl: WordType) -> Self {
        self.with(move |hart| {
            hart.state.vu.set_vl(1, false, avl, vtype);
        })
    }

    pub(crate) fn vreg(self, base: u8, sew: u32, elems: &[u64]) -> Self {
        let elems = elems.to_vec();
        self.with(move |hart| {
            for (i, value) in elems.into_iter().enumerate() {
                hart.state.vu.reg_file.write_elem(base, sew, i as u64, value);
            }
        })
    }

    pub(crate) fn build(self) -> Hart {
        let mut hart = Hart::new(self.config);
        for f in self.setup {
            f(&mut hart);
        }
        hart
    }
}

pub(crate) struct CPUChecker<'a> {
    pub(crate) hart: &'a mut Hart,
}

impl<'a> CPUChecker<'a> {
    pub(crate) fn new(hart: &'a mut Hart) -> Self {
        Self { hart }.reg(0, 0) // x0 is always 0
    }

    pub(crate) fn reg(self, idx: u8, value: WordType) -> Self {
        assert_eq!(
            self.hart.read_reg(idx),
            value,
            "Register #{} incorrect",
            idx,
        );
        self
    }

    pub(crate) fn pc(self, value: WordType) -> Self {
        assert_eq!(self.hart.state.pc, value, "PC incorrect");
        self
    }

    pub(crate) fn prv(self, prv: PrivilegeLevel) -> Self {
        assert_eq!(self.hart.state.prv, prv, "Privilege incorrect");
        self
    }

    pub(crate) fn mem<T>(self, addr: WordType, value: WordType) -> Self
    where
        T: UnsignedInteger,
    {
        assert_eq!(
            self.hart.mmu.read_phys::<T>(addr).unwrap().into(),
            value,
            "Memory value incorrect at pos {:#x}",
            addr
        );
        self
    }

    pub(crate) fn mem_base<T>(self, addr: WordType, value: WordType) -> Self
    where
        T: UnsignedInteger,
    {
        self.mem::<T>(BASE_ADDR + addr, value)
    }

    pub(crate) fn csr(self, addr: u16, value: WordType) -> Self {
        assert_eq!(
            self.hart.state.read_csr(addr).unwrap(),
            value,
            "CSR {:#x} incorrect",
            addr
        );
        self
    }

    pub(crate) fn csr_with<F>(self, addr: u16, f: F) -> Self
    where
        F: FnOnce(WordType),
    {
        f(self.hart.state.read_csr(addr).unwrap());
        self
    }

    pub(crate) fn vreg(self, base: u8, sew: u32, elems: &[u64]) -> Self {
        for (i, value) in elems.iter().enumerate() {
            assert_eq!(
                self.hart.state.vu.reg_file.read_elem(base, sew, i as u64),
                *value,
                "Element #{} of v{} incorrect",
                i,
                base
            );
        }
        self
    }

    pub(crate) fn customized<F>(self, f: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        f(self)
    }
}

/// Run one instruction the way a batch would, re-running serialize-before instructions.
fn exec_once(hart: &mut Hart, fetch: InstructionFetch) -> Result<(), TrapEvent> {
    let pc = hart.state.pc;
    loop {
        match hart.execute_insn(pc, fetch)? {
            NextPc::Jump(next) => {
                hart.state.pc = next;
                return Ok(());
            }
            NextPc::SerializeAfter => return Ok(()),
            NextPc::SerializeBefore => hart.state.serialized = true,
        }
    }
}

fn fetch_of(hart: &Hart, raw_instr: u32) -> InstructionFetch {
    let instr = hart.mmu.decode(raw_instr).unwrap();
    InstructionFetch {
        raw: raw_instr,
        instr,
        func: get_exec_func(instr.0),
    }
}

pub(crate) fn run_test_exec<F, G>(instr: RiscvInstr, info: RVInstrInfo, build: F, check: G)
where
    F: FnOnce(TestCPUBuilder) -> TestCPUBuilder,
    G: FnOnce(CPUChecker) -> CPUChecker,
{
    let mut hart = build(TestCPUBuilder::new()).build();
    let fetch = InstructionFetch {
        raw: 0,
        instr: DecodeInstr(instr, info),
        func: get_exec_func(instr),
    };
    exec_once(&mut hart, fetch).unwrap();
    check(CPUChecker::new(&mut hart));
}

pub(crate) fn run_test_exec_decode<F, G>(raw_instr: u32, build: F, check: G)
where
    F: FnOnce(TestCPUBuilder) -> TestCPUBuilder,
    G: FnOnce(CPUChecker) -> CPUChecker,
{
    let mut hart = build(TestCPUBuilder::new()).build();
    let fetch = fetch_of(&hart, raw_instr);
    exec_once(&mut hart, fetch).unwrap();
    check(CPUChecker::new(&mut hart));
}

pub(crate) fn run_test_exec_decode_err<F>(raw_instr: u32, build: F, expected: TrapEvent)
where
    F: FnOnce(TestCPUBuilder) -> TestCPUBuilder,
{
    let mut hart = build(TestCPUBuilder::new()).build();
    let fetch = fetch_of(&hart, raw_instr);
    assert_eq!(exec_once(&mut hart, fetch), Err(expected));
}

pub(crate) fn run_test_cpu_step<F, G>(raw_instrs: &[u32], build: F, check: G)
where
    F: FnOnce(TestCPUBuilder) -> TestCPUBuilder,
    G: FnOnce(CPUChecker) -> CPUChecker,
{
    let mut hart = build(TestCPUBuilder::new().program(raw_instrs)).build();
    for _ in 0..raw_instrs.len() {
        hart.step(1);
    }
    check(CPUChecker::new(&mut hart));
}

pub(crate) struct ExecTester {
    rng: ChaCha12Rng,
}

impl ExecTester {
    pub(crate) fn new() -> Self {
        Self {
            rng: ChaCha12Rng::seed_from_u64(0721),
        }
    }

    pub(crate) fn rand_imm12(&mut self) -> WordType {
        self.rng.random_range(0..=4095) as WordType
    }

    pub(crate) fn rand_word(&mut self) -> WordType {
        self.rng.random_range(0..=WordType::MAX)
    }

    pub(crate) fn rand_word2(&mut self) -> (WordType, WordType) {
        (self.rand_word(), self.rand_word())
    }

    pub(crate) fn rand_reg_idx(&mut self) -> u8 {
        self.rng.random_range(1..REGFILE_CNT) as u8
    }

    pub(crate) fn rand_reg_idx2(&mut self) -> (u8, u8) {
        (self.rand_reg_idx(), self.rand_reg_idx())
    }

    pub(crate) fn rand_unique_reg_idx2(&mut self) -> (u8, u8) {
        let idx1 = self.rand_reg_idx();
        let mut idx2 = self.rand_reg_idx();
        while idx1 == idx2 {
            idx2 = self.rand_reg_idx();
        }
        (idx1, idx2)
    }

    pub(crate) fn test_rand_r_with(
        &mut self,
        instr: RiscvInstr,
        lhs: WordType,
        rhs: WordType,
        expected: WordType,
    ) {
        let rd = self.rand_reg_idx();
        let (rs1, rs2) = self.rand_unique_reg_idx2();
        let info = RVInstrInfo::R { rd, rs1, rs2 };

        run_test_exec(
            instr,
            info,
            |builder| builder.reg(rs1, lhs).reg(rs2, rhs).pc(0x1000),
            |checker| checker.reg(rd, expected).pc(0x1004),
        );
    }

    pub(crate) fn test_rand_r<F>(&mut self, instr: RiscvInstr, calc: F)
    where
        F: FnOnce(WordType, WordType) -> WordType,
    {
        let (val1, val2) = self.rand_word2();
        self.test_rand_r_with(instr, val1, val2, calc(val1, val2));
    }

    pub(crate) fn test_rand_i_with(
        &mut self,
        instr: RiscvInstr,
        lhs: WordType,
        imm: WordType,
        expected: WordType,
    ) {
        let (rd, rs1) = self.rand_reg_idx2();
        let info = RVInstrInfo::I { rd, rs1, imm };

        // rd may alias rs1: the expected value is computed from the original rs1
        run_test_exec(
            instr,
            info,
            |builder| builder.reg(rs1, lhs).pc(0x1000),
            |checker| checker.reg(rd, expected).pc(0x1004),
        );
    }

    pub(crate) fn test_rand_i<F>(&mut self, instr: RiscvInstr, calc: F)
    where
        F: FnOnce(WordType, WordType) -> WordType,
    {
        let val = self.rand_word();
        let imm = self.rand_imm12();
        self.test_rand_i_with(instr, val, imm, calc(val, sign_extend(imm, 12)));
    }
}
