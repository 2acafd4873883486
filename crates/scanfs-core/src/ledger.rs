//! Corruption findings and the final report.

use crate::exit_codes::ExitCode;
use scanfs_common::{FsType, Result};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// One failing volume. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorruptionRecord {
    pub fs: FsType,
    /// True when the volume never mounted within the retry limit (the
    /// check tool was not run).
    pub mount_failed: bool,
    pub volume: String,
}

impl CorruptionRecord {
    /// Marker column of the report: `xfs`, `ext4`, or the mount-fail form.
    pub fn marker(&self) -> String {
        if self.mount_failed {
            format!("{} - mount-fail", self.fs)
        } else {
            self.fs.to_string()
        }
    }

    /// One line of the corruption report.
    pub fn report_line(&self) -> String {
        format!("{} - {}", self.marker(), self.volume)
    }
}

/// Accumulates findings and decides the process outcome.
#[derive(Debug, Default)]
pub struct CorruptionLedger {
    records: Vec<CorruptionRecord>,
}

impl CorruptionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The check tool reported corruption on `volume`.
    pub fn record_corruption(&mut self, fs: FsType, volume: &str) {
        self.records.push(CorruptionRecord {
            fs,
            mount_failed: false,
            volume: volume.to_string(),
        });
    }

    /// `volume` exhausted its mount retries.
    pub fn record_mount_failure(&mut self, fs: FsType, volume: &str) {
        self.records.push(CorruptionRecord {
            fs,
            mount_failed: true,
            volume: volume.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[CorruptionRecord] {
        &self.records
    }

    /// Write the corruption report (only when non-empty) and return the
    /// run's exit code.
    pub fn finish(&self, corruption_path: &Path) -> Result<ExitCode> {
        if self.records.is_empty() {
            info!("no corrupt volume found");
            return Ok(ExitCode::Success);
        }
        info!("corruption found in these volumes:");
        let mut file = File::create(corruption_path)?;
        for record in &self.records {
            info!("{}", record.report_line());
            writeln!(file, "{}", record.report_line())?;
        }
        Ok(ExitCode::CorruptionFound)
    }
}
