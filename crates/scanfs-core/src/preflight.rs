//! Pre-flight checks: everything that must hold before any kernel
//! resource is created. Failures here exit immediately with nothing to
//! clean up.

use crate::context::RunContext;
use crate::runner::CommandRunner;
use scanfs_common::{Error, Result};
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The scanner mutates host-global device namespaces; root only.
pub fn check_root() -> Result<()> {
    if unsafe { libc::geteuid() } != 0 {
        return Err(Error::NotRoot);
    }
    Ok(())
}

/// Refuse to run inside a guest: images must be scanned from the
/// hypervisor host where their backing storage lives.
pub fn check_host() -> Result<()> {
    let cpuinfo = fs::read_to_string("/proc/cpuinfo")?;
    if running_in_guest(&cpuinfo) {
        return Err(Error::NotOnHost);
    }
    Ok(())
}

/// The `hypervisor` CPU flag is set by the kernel only under a hypervisor.
fn running_in_guest(cpuinfo: &str) -> bool {
    cpuinfo
        .lines()
        .filter(|line| line.starts_with("flags"))
        .any(|line| line.split_whitespace().any(|flag| flag == "hypervisor"))
}

/// Canonicalize the CLI path and require it to be a directory.
pub fn validate_directory(path: &Path) -> Result<PathBuf> {
    let canonical = path
        .canonicalize()
        .map_err(|_| Error::InvalidDirectory { path: path.into() })?;
    if !canonical.is_dir() {
        return Err(Error::InvalidDirectory { path: path.into() });
    }
    Ok(canonical)
}

/// Walk up from `path` to the root of its filesystem (first device-id
/// change).
pub fn find_mount_point(path: &Path) -> Result<PathBuf> {
    let mut current = path.canonicalize()?;
    loop {
        let Some(parent) = current.parent() else {
            return Ok(current);
        };
        if current.metadata()?.dev() != parent.metadata()?.dev() {
            return Ok(current);
        }
        current = parent.to_path_buf();
    }
}

/// Snapshots are reflink clones; the backing filesystem must support them.
pub fn check_reflink(runner: &dyn CommandRunner, scan_dir: &Path) -> Result<()> {
    let mount_point = find_mount_point(scan_dir)?;
    let mount_point_arg = mount_point.to_string_lossy();
    let out = runner.run("/sbin/xfs_info", &[mount_point_arg.as_ref()])?;
    if !out.stdout.contains("reflink=1") {
        return Err(Error::ReflinkUnsupported {
            path: scan_dir.into(),
        });
    }
    Ok(())
}

/// All `*.img` files directly under the scan directory, sorted.
pub fn discover_images(scan_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images: Vec<PathBuf> = fs::read_dir(scan_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "img"))
        .collect();
    images.sort();
    if images.is_empty() {
        return Err(Error::NoImages {
            dir: scan_dir.into(),
        });
    }
    Ok(images)
}

/// Refuse to start while any loop device is attached: leftover devices
/// cannot be attributed to their owner once a new run starts binding.
pub fn ensure_no_loop_devices(runner: &dyn CommandRunner) -> Result<()> {
    let out = runner.run("/sbin/losetup", &["-n", "-O", "NAME"])?;
    if out.stdout.split_whitespace().next().is_some() {
        return Err(Error::LoopDevicesPresent);
    }
    Ok(())
}

/// Support-bundle header in the summary log.
pub fn log_debug_header(ctx: &RunContext, images: &[PathBuf]) {
    debug!("scan directory path - {}", ctx.scan_dir.display());
    for image in images {
        match fs::metadata(image) {
            Ok(meta) => debug!("{} - {} bytes", image.display(), meta.len()),
            Err(err) => debug!("stat {} failed: {err}", image.display()),
        }
    }
    if let Ok(version) = fs::read_to_string("/proc/version") {
        debug!("kernel - {}", version.trim());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{CommandOutput, ScriptedRunner};
    use tempfile::tempdir;

    #[test]
    fn guest_detection_reads_cpu_flags() {
        let host = "processor : 0\nflags : fpu vme de pse\n";
        let guest = "processor : 0\nflags : fpu vme hypervisor de\n";
        assert!(!running_in_guest(host));
        assert!(running_in_guest(guest));
        // `hypervisor` must be a whole flag, not a substring
        let odd = "flags : fpu hypervisorish\n";
        assert!(!running_in_guest(odd));
    }

    #[test]
    fn validate_directory_rejects_missing_and_plain_files() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            validate_directory(&missing),
            Err(Error::InvalidDirectory { .. })
        ));
        let file = dir.path().join("plain");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(
            validate_directory(&file),
            Err(Error::InvalidDirectory { .. })
        ));
        assert_eq!(
            validate_directory(dir.path()).unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn reflink_check_requires_feature_bit() {
        let dir = tempdir().unwrap();
        let runner = ScriptedRunner::new();
        // default empty xfs_info output lacks reflink=1
        let err = check_reflink(&runner, dir.path()).unwrap_err();
        assert!(matches!(err, Error::ReflinkUnsupported { .. }));
        assert_eq!(err.exit_code(), 3);
        assert_eq!(runner.count_calls("/sbin/xfs_info"), 1);
    }

    #[test]
    fn reflink_check_accepts_supporting_filesystem() {
        let dir = tempdir().unwrap();
        let mount_point = find_mount_point(dir.path()).unwrap();
        let runner = ScriptedRunner::new();
        runner.respond(
            &format!("/sbin/xfs_info {}", mount_point.display()),
            CommandOutput::with_stdout("meta-data=/dev/sda1 ... reflink=1 bigtime=1"),
        );
        assert!(check_reflink(&runner, dir.path()).is_ok());
    }

    #[test]
    fn discover_images_filters_and_sorts() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.img"), b"").unwrap();
        fs::write(dir.path().join("a.img"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();
        let images = discover_images(dir.path()).unwrap();
        assert_eq!(images.len(), 2);
        assert!(images[0].ends_with("a.img"));
        assert!(images[1].ends_with("b.img"));
    }

    #[test]
    fn discover_images_empty_directory_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            discover_images(dir.path()),
            Err(Error::NoImages { .. })
        ));
    }

    #[test]
    fn loop_device_guard() {
        let runner = ScriptedRunner::new();
        assert!(ensure_no_loop_devices(&runner).is_ok());
        runner.respond(
            "/sbin/losetup -n -O NAME",
            CommandOutput::with_stdout("/dev/loop0\n/dev/loop1\n"),
        );
        assert!(matches!(
            ensure_no_loop_devices(&runner),
            Err(Error::LoopDevicesPresent)
        ));
    }

    #[test]
    fn mount_point_walk_terminates() {
        let dir = tempdir().unwrap();
        let mount_point = find_mount_point(dir.path()).unwrap();
        assert!(dir.path().canonicalize().unwrap().starts_with(&mount_point));
    }
}
