//! Run identity for a single scanfs invocation.
//!
//! A run is identified by its start timestamp. The identifier names every
//! per-run artifact (output directory, snapshot directory, mount point) and
//! the prefix applied to imported volume groups, so that leftovers from a
//! crashed run remain attributable.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Timestamp format shared by every per-run directory name.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// Identifier for one scanfs run.
///
/// Example: `2026-08-08T14-03-22`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a run id from the current local time.
    pub fn new() -> Self {
        RunId(Local::now().format(TIMESTAMP_FORMAT).to_string())
    }

    /// Output directory for the summary and corruption reports.
    pub fn output_dir(&self, scan_dir: &Path) -> PathBuf {
        scan_dir.join(format!("Scanfs-{}", self.0))
    }

    /// Directory holding the reflink snapshots for this run.
    pub fn snapshot_dir(&self, scan_dir: &Path) -> PathBuf {
        scan_dir.join(format!("ref_dir-{}", self.0))
    }

    /// Temporary mount point shared by every volume scanned this run.
    pub fn mount_dir(&self, scan_dir: &Path) -> PathBuf {
        scan_dir.join(format!("mnt-{}", self.0))
    }

    /// Prefix applied to every imported volume group.
    ///
    /// The suffix is the tail of the scan directory's basename, so renamed
    /// groups stay traceable to the guest they came from.
    pub fn vg_prefix(scan_dir: &Path) -> String {
        let stem = scan_dir
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let chars = stem.chars().count();
        let suffix: String = stem.chars().skip(chars.saturating_sub(6)).collect();
        format!("Scan{suffix}")
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
