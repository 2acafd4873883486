//! Loop-device binding and partition publication.

use crate::context::{LoopBinding, RunContext};
use crate::runner::CommandRunner;
use scanfs_common::{Error, Result};
use std::path::Path;
use tracing::debug;

/// Binds snapshots to loop devices and exposes their partitions as
/// device-mapper nodes.
pub struct LoopDeviceManager<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> LoopDeviceManager<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Volume-group names already on the system. Must be read before any
    /// binding: it is the resolver's collision denylist.
    pub fn preexisting_groups(&self) -> Result<Vec<String>> {
        let out = self
            .runner
            .run("/sbin/vgs", &["--readonly", "--noheadings", "-o", "vg_name"])?;
        Ok(out.fields())
    }

    /// Bind every snapshot and record the binding as it happens, so a
    /// failure part-way leaves an accurate worklist for cleanup.
    pub fn bind_all(&self, ctx: &mut RunContext) -> Result<()> {
        debug!("setting up the loop devices");
        let snapshots = ctx.snapshots.clone();
        for snapshot in &snapshots {
            let snapshot_arg = snapshot.to_string_lossy();
            let out = self.runner.run("/sbin/kpartx", &["-av", snapshot_arg.as_ref()])?;
            debug!("{}", out.stdout.trim_end());
            if !out.success() {
                return Err(Error::LoopSetupFailed {
                    snapshot: snapshot.clone(),
                });
            }
            let Some(device) = self.device_for(snapshot)? else {
                return Err(Error::LoopSetupFailed {
                    snapshot: snapshot.clone(),
                });
            };
            ctx.bindings.push(LoopBinding {
                snapshot: snapshot.clone(),
                device,
            });
        }

        // refresh PV labels so the resolver sees the new partitions
        let out = self.runner.run("/sbin/pvscan", &[])?;
        debug!("{}", out.stdout.trim_end());
        let out = self.runner.run("/sbin/pvscan", &["--cache"])?;
        debug!("{}", out.stdout.trim_end());
        Ok(())
    }

    /// Loop device currently backed by `file`, if any. With multiple
    /// bindings the most recent one wins.
    pub fn device_for(&self, file: &Path) -> Result<Option<String>> {
        let file_arg = file.to_string_lossy();
        let out = self
            .runner
            .run("/sbin/losetup", &["-j", file_arg.as_ref(), "-O", "NAME", "-n"])?;
        Ok(out.fields().into_iter().last())
    }
}
