//! Exit codes for the scanfs CLI.
//!
//! Exit codes communicate operation outcome without requiring output
//! parsing. These are stable; monitoring jobs key off them.

/// Exit codes for scanfs operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Scan completed, no corruption found
    Success = 0,

    /// General error
    GeneralError = 1,

    /// Not running on a hypervisor host
    NotOnHost = 2,

    /// Filesystem does not support reflink copies
    ReflinkUnsupported = 3,

    /// Unmount failed while a device was still attached (fatal path)
    MountFailure = 4,

    /// Corruption found in at least one volume
    CorruptionFound = 5,

    /// Volume group rename failed
    VgRenameFailed = 6,

    /// Another instance is already running
    AlreadyRunning = 7,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code indicates a clean run.
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Success)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}
