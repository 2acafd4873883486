//! Single-instance lock for a scan directory.
//!
//! Two concurrent scans against the same directory would race on the
//! host-global loop-device and LVM namespaces, so a non-blocking exclusive
//! lock is taken at start-up and contention fails fast (exit 7).

use scanfs_common::{Error, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Lock file name inside the scan directory.
const LOCK_FILE_NAME: &str = ".scanfs.lock";

/// Held for the lifetime of one invocation.
#[derive(Debug)]
pub struct RunLock {
    file: std::fs::File,
}

impl RunLock {
    /// Acquire the per-directory lock, failing immediately if held.
    pub fn acquire(scan_dir: &Path) -> Result<Self> {
        let path = scan_dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false) // Keep lock file contents (advisory lock only)
            .open(path)?;

        {
            use std::os::unix::io::AsRawFd;
            let fd = file.as_raw_fd();
            // LOCK_EX = Exclusive lock
            // LOCK_NB = Non-blocking (fail if held)
            let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };

            if result != 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::WouldBlock {
                    return Err(Error::AlreadyRunning);
                }
                return Err(Error::Io(err));
            }
        }

        // Truncate and write our PID
        file.set_len(0)?;
        let mut writer = &file;
        let _ = writer.write_all(format!("{}", std::process::id()).as_bytes());
        let _ = writer.flush();

        Ok(Self { file })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        use std::os::unix::io::AsRawFd;
        // Best effort unlock
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
        // Do NOT remove the lock file. Removing it introduces a race where a
        // waiting process could lock a deleted inode while a new process
        // creates a fresh file. The empty lock file persisting is safe.
    }
}
