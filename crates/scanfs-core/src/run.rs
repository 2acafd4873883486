//! Top-level pipeline for one invocation.
//!
//! Whatever `execute` returns, the cleanup coordinator runs over the
//! context before the result is inspected; the only exits that skip it
//! are pre-flight failures (nothing created yet) and a successful
//! `--setup` run (devices left attached on purpose).

use crate::cleanup::{orphan, CleanupCoordinator};
use crate::cli::Mode;
use crate::context::RunContext;
use crate::exit_codes::ExitCode;
use crate::ledger::CorruptionLedger;
use crate::preflight;
use crate::runner::CommandRunner;
use crate::scan::FilesystemScanner;
use crate::setup;
use crate::signal;
use scanfs_common::{FsType, Result};
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// Run the selected mode to completion and decide the exit code.
pub fn run(runner: &dyn CommandRunner, ctx: &mut RunContext, mode: Mode) -> Result<ExitCode> {
    if mode == Mode::Clean {
        preflight::log_debug_header(ctx, &[]);
        let code = orphan::clean(runner, ctx)?;
        info!("check {} for more details", ctx.summary_path().display());
        return Ok(code);
    }

    preflight::ensure_no_loop_devices(runner)?;
    let images = preflight::discover_images(&ctx.scan_dir)?;
    preflight::log_debug_header(ctx, &images);

    let mut ledger = CorruptionLedger::new();
    let result = execute(runner, ctx, mode, &images, &mut ledger);

    if mode == Mode::Setup && result.is_ok() {
        info!("stopping after setup");
        return Ok(ExitCode::Success);
    }

    CleanupCoordinator::new(runner).run(ctx);
    info!("check {} for more details", ctx.summary_path().display());

    result?;
    ledger.finish(&ctx.corruption_path())
}

/// Setup and scan; any error here reaches cleanup with the context
/// recording exactly what was created.
fn execute(
    runner: &dyn CommandRunner,
    ctx: &mut RunContext,
    mode: Mode,
    images: &[PathBuf],
    ledger: &mut CorruptionLedger,
) -> Result<()> {
    signal::check_interrupted()?;
    setup::run(runner, ctx, images)?;
    if mode == Mode::Setup {
        return Ok(());
    }

    fs::create_dir_all(&ctx.mount_dir)?;
    for fs_type in FsType::all() {
        signal::check_interrupted()?;
        FilesystemScanner::new(runner, fs_type).scan(ctx, ledger)?;
    }
    Ok(())
}
