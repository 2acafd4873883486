//! Per-run state threaded through every pipeline component.

use scanfs_common::{FsType, RunId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One snapshot bound to one loop device.
///
/// The device name is recorded at bind time; cleanup matches volume groups
/// by identifiers derived from it rather than by name, so a same-named
/// group created concurrently elsewhere is never touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopBinding {
    /// Reflink snapshot backing the device.
    pub snapshot: PathBuf,
    /// Loop device node, e.g. `/dev/loop3`.
    pub device: String,
}

impl LoopBinding {
    /// Device basename, e.g. `loop3`.
    pub fn device_name(&self) -> &str {
        self.device.rsplit('/').next().unwrap_or(&self.device)
    }
}

/// Process-wide state for one invocation.
///
/// Replaces ambient globals: every component receives the context
/// explicitly and records what it created here, so cleanup always knows
/// the full set of live resources no matter which step failed.
#[derive(Debug)]
pub struct RunContext {
    /// Directory being scanned (canonicalized).
    pub scan_dir: PathBuf,
    pub run_id: RunId,
    /// `Scanfs-<ts>`: summary and corruption reports.
    pub output_dir: PathBuf,
    /// `ref_dir-<ts>`: reflink snapshots.
    pub snapshot_dir: PathBuf,
    /// `mnt-<ts>`: shared temporary mount point.
    pub mount_dir: PathBuf,
    /// Prefix for imported volume-group names.
    pub vg_prefix: String,
    /// Volume-group names present before any binding (collision denylist).
    pub preexisting_vgs: Vec<String>,
    /// Snapshots created so far.
    pub snapshots: Vec<PathBuf>,
    /// Loop devices bound so far.
    pub bindings: Vec<LoopBinding>,
    /// Volume groups after rename, in resolution order.
    pub resolved_vgs: Vec<String>,
    /// Scannable partitions not belonging to any volume group.
    pub bare_partitions: HashMap<FsType, Vec<String>>,
}

impl RunContext {
    pub fn new(scan_dir: PathBuf) -> Self {
        Self::with_run_id(scan_dir, RunId::new())
    }

    pub fn with_run_id(scan_dir: PathBuf, run_id: RunId) -> Self {
        let output_dir = run_id.output_dir(&scan_dir);
        let snapshot_dir = run_id.snapshot_dir(&scan_dir);
        let mount_dir = run_id.mount_dir(&scan_dir);
        let vg_prefix = RunId::vg_prefix(&scan_dir);
        RunContext {
            scan_dir,
            run_id,
            output_dir,
            snapshot_dir,
            mount_dir,
            vg_prefix,
            preexisting_vgs: Vec::new(),
            snapshots: Vec::new(),
            bindings: Vec::new(),
            resolved_vgs: Vec::new(),
            bare_partitions: HashMap::new(),
        }
    }

    /// Full operation log for this run.
    pub fn summary_path(&self) -> PathBuf {
        self.output_dir.join("summary")
    }

    /// Corruption report; only written when corruption was found.
    pub fn corruption_path(&self) -> PathBuf {
        self.output_dir.join("corruption")
    }

    /// Bare partitions of the given type, in discovery order.
    pub fn bare_partitions_of(&self, fs: FsType) -> &[String] {
        self.bare_partitions
            .get(&fs)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Prefix shared by every snapshot directory under `scan_dir`,
    /// regardless of run: used by orphan discovery to attribute leftover
    /// loop devices to this directory.
    pub fn snapshot_dir_prefix(scan_dir: &Path) -> String {
        format!("{}/ref_dir", scan_dir.display())
    }
}
