//! Non-destructive filesystem scanning.
//!
//! One scanner per filesystem type, same algorithm: enumerate mountable
//! volumes, mount and immediately unmount each one, then run the
//! type-specific check tool against the unmounted device. Corruption and
//! mount failures are recorded and scanning continues; an unmount failure
//! is fatal because a stuck mount would leak a busy device through
//! cleanup.

use crate::context::RunContext;
use crate::ledger::CorruptionLedger;
use crate::runner::CommandRunner;
use scanfs_common::{Error, FsType, Result};
use std::path::Path;
use tracing::{debug, info};

/// Mount attempts per volume before recording a mount failure.
///
/// A fragmented host filesystem with extent-size hints can fail COW
/// extent allocation transiently; repeated mounts succeed once the
/// allocation is fulfilled (fixed upstream by "xfs: don't use delalloc
/// extents for COW on files with extsize hints", kept for older kernels).
pub const MOUNT_RETRIES: u32 = 5;

pub struct FilesystemScanner<'a> {
    runner: &'a dyn CommandRunner,
    fs: FsType,
}

impl<'a> FilesystemScanner<'a> {
    pub fn new(runner: &'a dyn CommandRunner, fs: FsType) -> Self {
        Self { runner, fs }
    }

    /// Scan every volume of this scanner's type, appending findings to
    /// the ledger. Only unmount failures abort.
    pub fn scan(&self, ctx: &RunContext, ledger: &mut CorruptionLedger) -> Result<()> {
        info!("checking {} filesystems", self.fs);
        for volume in self.enumerate(ctx)? {
            if !self.mount_with_retry(&volume, &ctx.mount_dir)? {
                info!("{volume} - mount failed - marking it as corrupt");
                ledger.record_mount_failure(self.fs, &volume);
                continue;
            }
            self.unmount(&ctx.mount_dir)?;

            info!("scanning {volume}");
            if !self.check(&volume)? {
                ledger.record_corruption(self.fs, &volume);
            }
        }
        Ok(())
    }

    /// Logical volumes of this type inside every resolved group, plus the
    /// bare loop partitions classified during setup.
    fn enumerate(&self, ctx: &RunContext) -> Result<Vec<String>> {
        let mut volumes = Vec::new();
        for vg in &ctx.resolved_vgs {
            let out = self
                .runner
                .run("/sbin/lvs", &["--noheadings", "-o", "lv_path", vg])?;
            for lv in out.fields() {
                if self.device_type(&lv)? == Some(self.fs) {
                    volumes.push(lv);
                }
            }
        }
        volumes.extend(ctx.bare_partitions_of(self.fs).iter().cloned());
        Ok(volumes)
    }

    fn device_type(&self, device: &str) -> Result<Option<FsType>> {
        let out = self
            .runner
            .run("/sbin/blkid", &["-o", "value", "-s", "TYPE", device])?;
        Ok(FsType::from_blkid_tag(out.stdout.trim()))
    }

    fn mount_with_retry(&self, volume: &str, mount_dir: &Path) -> Result<bool> {
        let mount_arg = mount_dir.to_string_lossy();
        for attempt in 1..=MOUNT_RETRIES {
            let out = self.runner.run("/bin/mount", &[volume, mount_arg.as_ref()])?;
            if out.success() {
                debug!("mount {volume} successful");
                return Ok(true);
            }
            debug!("mount {volume} failed (attempt {attempt}), retrying");
            debug!("output: {}", out.stdout.trim_end());
        }
        Ok(false)
    }

    /// The check tool wants the unmounted block device; a volume that
    /// cannot be unmounted must not reach cleanup still busy.
    fn unmount(&self, mount_dir: &Path) -> Result<()> {
        let mount_arg = mount_dir.to_string_lossy();
        let out = self.runner.run("/bin/umount", &[mount_arg.as_ref()])?;
        if !out.success() {
            info!("umount failed - doing a cleanup");
            debug!("output: {}", out.stdout.trim_end());
            return Err(Error::UnmountFailed {
                mount_point: mount_dir.to_path_buf(),
            });
        }
        Ok(())
    }

    /// Run the read-only checker; false means corruption was reported.
    fn check(&self, volume: &str) -> Result<bool> {
        let (program, base_args) = self.fs.check_command();
        let mut args: Vec<&str> = base_args.to_vec();
        args.push(volume);
        debug!("{program} {}", args.join(" "));
        let out = self.runner.run(program, &args)?;
        debug!("{}", out.stderr.trim_end());
        debug!("{}", out.stdout.trim_end());
        Ok(out.success())
    }
}
