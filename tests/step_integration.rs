use riscv_hart_core::{
    config::HartConfig,
    isa::riscv::{
        debugger::{DebugCause, DebugEvent, Debugger},
        diagnostic::{Marker, RecordingSink},
        executor::Hart,
    },
    ram_config::BASE_ADDR,
};

/// a0 = 10 + 9 + ... + 1, then spin on `j .`
const SUM_LOOP: [u32; 6] = [
    0x0000_0513, // li a0, 0
    0x00a0_0593, // li a1, 10
    0x00b5_0533, // add a0, a0, a1
    0xfff5_8593, // addi a1, a1, -1
    0xfe05_9ce3, // bnez a1, -8
    0x0000_006f, // j .
];
const SUM_LOOP_LEN: usize = 2 + 10 * 3;

fn hart_with(config: HartConfig, program: &[u32]) -> Hart {
    let mut hart = Hart::new(config);
    hart.load_program(BASE_ADDR, program).unwrap();
    hart
}

#[test]
fn fast_and_slow_paths_agree() {
    let mut fast = hart_with(HartConfig::default(), &SUM_LOOP);
    let mut slow = hart_with(HartConfig::default().with_ext_debug(true), &SUM_LOOP);
    let fast_sink = RecordingSink::new();
    let slow_sink = RecordingSink::new();
    fast.attach_sink(Box::new(fast_sink.clone()));
    slow.attach_sink(Box::new(slow_sink.clone()));

    fast.step(SUM_LOOP_LEN);
    slow.step(SUM_LOOP_LEN);

    for hart in [&fast, &slow] {
        assert_eq!(hart.read_reg(10), 55);
        assert_eq!(hart.minstret(), SUM_LOOP_LEN as u64);
        assert_eq!(hart.state.pc, BASE_ADDR + 20);
    }
    for idx in 0..32 {
        assert_eq!(fast.read_reg(idx), slow.read_reg(idx));
    }

    assert_eq!(fast_sink.commit_count(), SUM_LOOP_LEN);
    let fast_pcs = fast_sink.with(|r| r.commits.iter().map(|c| c.pc).collect::<Vec<_>>());
    let slow_pcs = slow_sink.with(|r| r.commits.iter().map(|c| c.pc).collect::<Vec<_>>());
    assert_eq!(fast_pcs, slow_pcs);
}

#[test]
fn retirement_is_exact_for_any_batch_size() {
    for n in [1, 7, 31, 32, 100] {
        let mut hart = hart_with(HartConfig::default().with_icache_entries(16), &SUM_LOOP);
        hart.step(n);
        assert_eq!(hart.minstret(), n as u64);
        assert_eq!(hart.state.csr.mcycle, n as u64);
    }
}

#[test]
fn vector_scaling_shift_program() {
    let program = [
        0x0105_72d7, // vsetvli t0, a0, e32, m1
        0x00a0_d073, // csrwi vxrm, 1 (rne)
        0x0205_e087, // vle32.v v1, (a1)
        0x0206_6107, // vle32.v v2, (a2)
        0xaa11_01d7, // vssrl.vv v3, v1, v2
        0x0206_e1a7, // vse32.v v3, (a3)
    ];
    let src = BASE_ADDR + 0x1000;
    let shift = BASE_ADDR + 0x1010;
    let dst = BASE_ADDR + 0x1020;

    let mut hart = hart_with(HartConfig::default(), &program);
    hart.state.reg_file.write(10, 4);
    hart.state.reg_file.write(11, src);
    hart.state.reg_file.write(12, shift);
    hart.state.reg_file.write(13, dst);
    for i in 0..4 {
        hart.mmu.write_phys(src + 4 * i, 15u32).unwrap();
        hart.mmu.write_phys(shift + 4 * i, 2u32).unwrap();
    }

    let sink = RecordingSink::new();
    hart.attach_sink(Box::new(sink.clone()));
    hart.step(program.len());

    assert_eq!(hart.minstret(), program.len() as u64);
    for i in 0..4 {
        assert_eq!(hart.mmu.read_phys::<u32>(dst + 4 * i).unwrap(), 4);
    }
    assert_eq!(hart.state.csr.mhpmcounter[10], 1);
    sink.with(|r| {
        assert_eq!(r.markers, vec![Marker::VectorConfig { vl: 4, vtype: 0b010_000 }]);
        assert!(r.commits[4].vector.is_some());
    });
}

#[test]
fn debugger_breakpoint_and_single_step() {
    let hart = hart_with(HartConfig::default(), &SUM_LOOP);
    let mut dbg = Debugger::new(hart);
    let bnez = BASE_ADDR + 16;
    dbg.set_breakpoint(bnez);

    assert_eq!(
        dbg.continue_run().unwrap(),
        DebugEvent::Halted {
            pc: bnez,
            cause: DebugCause::HwBreakpoint
        }
    );
    assert_eq!(dbg.read_reg(10), 10);
    assert_eq!(dbg.read_reg(11), 9);

    // step over the breakpoint: the branch goes back to the add
    assert_eq!(
        dbg.step().unwrap(),
        DebugEvent::StepCompleted {
            pc: BASE_ADDR + 8
        }
    );

    dbg.clear_breakpoint(bnez);
    dbg.continue_until(10_000).unwrap();
    assert_eq!(dbg.read_reg(10), 55);
}
