//! scanfs core pipeline.
//!
//! Scans copy-on-write snapshots of VM disk images for filesystem
//! corruption without touching the originals. The pipeline is strictly
//! sequential: discover images, snapshot, bind loop devices, resolve and
//! activate volume groups, scan XFS and EXT4 volumes, then tear every
//! kernel-visible resource back down on every exit path.

pub mod cleanup;
pub mod cli;
pub mod context;
pub mod exit_codes;
pub mod ledger;
pub mod lock;
pub mod logging;
pub mod preflight;
pub mod run;
pub mod runner;
pub mod scan;
pub mod setup;
pub mod signal;

pub use cli::{Cli, Mode};
pub use context::RunContext;
pub use exit_codes::ExitCode;
pub use ledger::{CorruptionLedger, CorruptionRecord};
pub use runner::{CommandOutput, CommandRunner, ScriptedRunner, SystemRunner};
