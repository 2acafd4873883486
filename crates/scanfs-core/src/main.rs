//! scanfs binary entry point.

use clap::Parser;
use scanfs_core::cli::{Cli, Mode};
use scanfs_core::lock::RunLock;
use scanfs_core::runner::SystemRunner;
use scanfs_core::{logging, preflight, run, signal, ExitCode, RunContext};
use scanfs_common::Result;
use std::fs;
use std::process;
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();
    match run_cli(cli) {
        Ok(code) => process::exit(code.as_i32()),
        Err(err) => {
            // the summary file gets the error too, once logging exists
            error!("{err}");
            eprintln!("scanfs: {err}");
            process::exit(err.exit_code());
        }
    }
}

fn run_cli(cli: Cli) -> Result<ExitCode> {
    let scan_dir = preflight::validate_directory(&cli.directory_path)?;
    preflight::check_root()?;
    preflight::check_host()?;

    // held before anything else is created: a concurrent invocation must
    // fail with exit 7 having mutated nothing
    let _lock = RunLock::acquire(&scan_dir)?;

    let mode = cli.mode();
    let runner = SystemRunner;
    if mode != Mode::Clean {
        preflight::check_reflink(&runner, &scan_dir)?;
    }

    let mut ctx = RunContext::new(scan_dir);
    fs::create_dir_all(&ctx.output_dir)?;
    logging::init(&ctx.summary_path())?;
    info!("Scanfs {}", env!("CARGO_PKG_VERSION"));

    signal::install_handlers();

    run::run(&runner, &mut ctx, mode)
}
