mod logging;

use std::{path::PathBuf, process::ExitCode, time::Instant};

use clap::Parser;
use lazy_static::lazy_static;
use riscv_hart_core::{Emulator, config::HartConfig, load::LoadError};

use crate::logging::LogLevel;

lazy_static! {
    static ref cli_args: Args = Args::parse();
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, clap::ValueEnum)]
enum TargetFormat {
    Auto,
    Elf,
    Bin,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path of the target image (elf/bin).
    path: PathBuf,

    /// Specify target image format.
    #[arg(value_enum, short, long, default_value_t = TargetFormat::Auto)]
    format: TargetFormat,

    /// Stop after this many retired instructions.
    #[arg(short = 'n', long, default_value_t = 100_000_000)]
    max_insns: u64,

    /// Instructions per `step` call.
    #[arg(short, long, default_value_t = 5000)]
    batch: usize,

    /// Force the single-step path and log every fetched instruction.
    #[arg(short = 'g', long = "ext-debug", default_value_t = false)]
    ext_debug: bool,

    /// Number of instruction cache entries (power of two).
    #[arg(long, default_value_t = 1024)]
    icache: usize,

    /// Switch log level.
    #[arg(value_enum, long = "loglevel", default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

fn build_emulator(config: HartConfig) -> Result<Emulator, String> {
    let bytes = std::fs::read(&cli_args.path)
        .map_err(|e| format!("cannot read {}: {}", cli_args.path.display(), e))?;

    let is_elf = cli_args.path.extension() == Some("elf".as_ref());
    let emu = match (cli_args.format, is_elf) {
        (TargetFormat::Elf, _) | (TargetFormat::Auto, true) => {
            Emulator::from_elf(&bytes, config)
        }
        _ => Emulator::from_binary(&bytes, config),
    };
    emu.map_err(|e: LoadError| e.to_string())
}

fn main() -> ExitCode {
    let _logger_handle = match logging::init(cli_args.log_level) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("failed to start logger: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if !cli_args.icache.is_power_of_two() {
        eprintln!("--icache must be a power of two, got {}", cli_args.icache);
        return ExitCode::FAILURE;
    }

    let config = HartConfig::default()
        .with_ext_debug(cli_args.ext_debug)
        .with_icache_entries(cli_args.icache);

    let mut emulator = match build_emulator(config) {
        Ok(emu) => emu,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let now = Instant::now();
    let summary = emulator.run(cli_args.max_insns, cli_args.batch);
    let elapsed = now.elapsed().as_secs_f32();

    println!("retired: {}", summary.retired);
    println!("cycles:  {}", summary.cycles);
    if summary.halted {
        println!(
            "halted in debug mode, dpc = {:#x}",
            emulator.hart().state.csr.dpc
        );
    }
    println!("Used time: {}s", elapsed);
    ExitCode::SUCCESS
}
