//! Setup stage: snapshot the images, bind loop devices, resolve and
//! activate volume groups, classify bare partitions.
//!
//! Order matters: the pre-existing volume-group denylist is read after the
//! snapshots exist but strictly before the first binding, so freshly
//! published groups can never be mistaken for system ones.

pub mod loopdev;
pub mod snapshot;
pub mod vgroup;

use self::loopdev::LoopDeviceManager;
use self::snapshot::ReflinkSnapshotter;
use self::vgroup::VolumeGroupResolver;
use crate::context::RunContext;
use crate::runner::CommandRunner;
use scanfs_common::{FsType, Result};
use std::path::PathBuf;
use tracing::{debug, info};

/// Run the whole setup stage. On error, whatever was recorded in `ctx`
/// up to that point is the cleanup coordinator's worklist.
pub fn run(runner: &dyn CommandRunner, ctx: &mut RunContext, images: &[PathBuf]) -> Result<()> {
    info!("setting up");

    ReflinkSnapshotter::new(runner).snapshot_all(ctx, images)?;

    let loopdev = LoopDeviceManager::new(runner);
    ctx.preexisting_vgs = loopdev.preexisting_groups()?;
    loopdev.bind_all(ctx)?;

    let resolver = VolumeGroupResolver::new(runner);
    resolver.resolve(ctx)?;
    resolver.activate(ctx)?;

    for fs in FsType::all() {
        let devices = bare_partitions(runner, ctx, fs)?;
        ctx.bare_partitions.insert(fs, devices);
    }

    let out = runner.run("/bin/lsblk", &["-f"])?;
    debug!("lsblk output\n{}", out.stdout.trim_end());
    info!("setup complete");
    Ok(())
}

/// Loop partitions of type `fs` that are not LVM members (those report
/// `TYPE=LVM2_member` and are reached through their volume group instead).
/// Restricted to partitions of this run's loop devices.
fn bare_partitions(
    runner: &dyn CommandRunner,
    ctx: &RunContext,
    fs: FsType,
) -> Result<Vec<String>> {
    let tag = format!("TYPE={}", fs.blkid_tag());
    let out = runner.run("/sbin/blkid", &["-o", "device", "-t", &tag])?;
    Ok(out
        .fields()
        .into_iter()
        .filter(|dev| {
            ctx.bindings
                .iter()
                .any(|binding| dev.contains(binding.device_name()))
        })
        .collect())
}
