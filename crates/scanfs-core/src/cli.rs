//! Command-line interface for scanfs.

use clap::Parser;
use std::path::PathBuf;

/// Scan KVM images for corruption. Supports XFS and EXT4.
#[derive(Parser, Debug)]
#[command(name = "scanfs", version, about)]
pub struct Cli {
    /// Path to the image files
    pub directory_path: PathBuf,

    /// Clean up if any loopback devices are left behind
    #[arg(short, long, conflicts_with = "setup")]
    pub clean: bool,

    /// Set up loopback devices and exit
    #[arg(short, long)]
    pub setup: bool,
}

/// Operating mode derived from the flag combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Full pipeline: setup, scan, cleanup, report.
    Scan,
    /// Stop after setup, leaving devices attached for inspection.
    Setup,
    /// Discover and remove devices left behind by an earlier run.
    Clean,
}

impl Cli {
    pub fn mode(&self) -> Mode {
        if self.clean {
            Mode::Clean
        } else if self.setup {
            Mode::Setup
        } else {
            Mode::Scan
        }
    }
}
