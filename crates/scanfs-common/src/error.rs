//! Error types for scanfs.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for scanfs operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for scanfs.
#[derive(Error, Debug)]
pub enum Error {
    // Pre-flight errors: nothing has been created yet
    #[error("this tool should be run as root")]
    NotRoot,

    #[error("not running on a hypervisor host")]
    NotOnHost,

    #[error("filesystem for '{path}' does not support reflink")]
    ReflinkUnsupported { path: PathBuf },

    #[error("invalid directory path '{path}'")]
    InvalidDirectory { path: PathBuf },

    #[error("directory '{dir}' does not contain any .img files")]
    NoImages { dir: PathBuf },

    #[error("pre-existing loop devices detected, clean them up first")]
    LoopDevicesPresent,

    // Setup errors: fatal, whatever was created so far is cleaned up
    #[error("reflink copy of '{image}' failed")]
    SnapshotFailed { image: PathBuf },

    #[error("loop device setup failed for '{snapshot}'")]
    LoopSetupFailed { snapshot: PathBuf },

    #[error("volume group rename failed for '{group}'")]
    VgRenameFailed { group: String },

    #[error("conflicting volume groups found: {names:?}")]
    ConflictingGroups { names: Vec<String> },

    // Teardown errors promoted to fatal
    #[error("unmount of '{mount_point}' failed")]
    UnmountFailed { mount_point: PathBuf },

    // Process-level errors
    #[error("another instance is already running")]
    AlreadyRunning,

    #[error("interrupted by signal")]
    Interrupted,

    #[error("failed to spawn '{program}': {source}")]
    CommandSpawn {
        program: String,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Process exit code for this error, per the scanfs CLI contract.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::NotOnHost => 2,
            Error::ReflinkUnsupported { .. } => 3,
            Error::UnmountFailed { .. } => 4,
            Error::VgRenameFailed { .. } => 6,
            Error::AlreadyRunning => 7,
            _ => 1,
        }
    }

    /// Whether this error occurred before any kernel resource was created.
    ///
    /// Pre-flight errors skip cleanup entirely; everything else funnels
    /// through the cleanup coordinator.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Error::NotRoot
                | Error::NotOnHost
                | Error::ReflinkUnsupported { .. }
                | Error::InvalidDirectory { .. }
                | Error::NoImages { .. }
                | Error::LoopDevicesPresent
                | Error::AlreadyRunning
        )
    }
}
