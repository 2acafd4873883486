//! Teardown of every kernel-visible resource the run created.
//!
//! Runs exactly once per invocation, on every exit path. Each step is
//! best-effort: individual failures are logged and later steps still run,
//! so one stuck resource cannot starve the rest of the teardown.

pub mod orphan;

use crate::context::RunContext;
use crate::runner::{CommandOutput, CommandRunner};
use std::fs;
use tracing::{debug, info, warn};

pub struct CleanupCoordinator<'a> {
    runner: &'a dyn CommandRunner,
    delete_snapshots: bool,
}

impl<'a> CleanupCoordinator<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            delete_snapshots: true,
        }
    }

    /// Leave snapshot files on disk (orphan mode reports them instead:
    /// it never deletes files some other run created).
    pub fn keep_snapshots(mut self) -> Self {
        self.delete_snapshots = false;
        self
    }

    /// Tear down in dependency order: stray mount, volume groups,
    /// partition mappings, loop devices, snapshot files, run
    /// directories, then the LVM cache.
    pub fn run(&self, ctx: &RunContext) {
        info!("cleaning up");
        self.release_stray_mount(ctx);
        self.deactivate_groups(ctx);
        self.remove_devices(ctx);
        if self.delete_snapshots {
            self.delete_snapshot_files(ctx);
        }
        self.remove_run_dirs(ctx);
        self.refresh_vg_cache();
        info!("cleanup complete");
    }

    /// Run a teardown command, logging instead of propagating failure.
    fn try_run(&self, program: &str, args: &[&str]) -> Option<CommandOutput> {
        match self.runner.run(program, args) {
            Ok(out) => {
                if !out.success() {
                    warn!("{program} {} exited {}", args.join(" "), out.status);
                }
                Some(out)
            }
            Err(err) => {
                warn!("{program} failed to run: {err}");
                None
            }
        }
    }

    /// An abort between mount and unmount leaves the shared mount point
    /// busy; release it before touching devices.
    fn release_stray_mount(&self, ctx: &RunContext) {
        let mounts = fs::read_to_string("/proc/self/mounts").unwrap_or_default();
        let mount_str = ctx.mount_dir.to_string_lossy();
        if mounts
            .lines()
            .filter_map(|line| line.split_whitespace().nth(1))
            .any(|target| target == mount_str)
        {
            warn!("mount point {} still busy, unmounting", mount_str);
            self.try_run("/bin/umount", &[mount_str.as_ref()]);
        }
    }

    /// Deactivate groups by uuid derived from this run's loop devices,
    /// never by name: a same-named group created concurrently by someone
    /// else must stay untouched.
    fn deactivate_groups(&self, ctx: &RunContext) {
        let mut uuids: Vec<String> = Vec::new();
        for binding in &ctx.bindings {
            let selector = format!("pv_name=~{}p", binding.device_name());
            if let Some(out) = self.try_run(
                "/sbin/vgs",
                &["--noheadings", "-o", "vg_uuid", "--select", &selector],
            ) {
                uuids.extend(out.fields());
            }
        }
        uuids.sort();
        uuids.dedup();
        for uuid in &uuids {
            let selector = format!("vg_uuid={uuid}");
            if let Some(out) = self.try_run("/sbin/vgchange", &["-an", "--select", &selector]) {
                debug!("{}", out.stdout.trim_end());
            }
        }
        self.try_run("/sbin/vgscan", &["--cache"]);
    }

    /// Partition mappings first, then the loop device itself.
    fn remove_devices(&self, ctx: &RunContext) {
        debug!("removing partition mappings and loop devices");
        for binding in &ctx.bindings {
            self.try_run("/sbin/kpartx", &["-d", &binding.device]);
            self.try_run("/sbin/losetup", &["-d", &binding.device]);
        }
    }

    fn delete_snapshot_files(&self, ctx: &RunContext) {
        for snapshot in &ctx.snapshots {
            if let Err(err) = fs::remove_file(snapshot) {
                warn!("failed to delete snapshot {}: {err}", snapshot.display());
            }
        }
    }

    /// Remove the per-run mount point and snapshot directory, but only
    /// once empty: leftover content means something above failed.
    fn remove_run_dirs(&self, ctx: &RunContext) {
        for dir in [&ctx.mount_dir, &ctx.snapshot_dir] {
            if !dir.is_dir() {
                continue;
            }
            match fs::read_dir(dir) {
                Ok(mut entries) => {
                    if entries.next().is_some() {
                        warn!("{} not empty, leaving in place", dir.display());
                        continue;
                    }
                }
                Err(err) => {
                    warn!("failed to read {}: {err}", dir.display());
                    continue;
                }
            }
            if let Err(err) = fs::remove_dir(dir) {
                warn!("failed to remove {}: {err}", dir.display());
            }
        }
    }

    /// Drop this run's stale entries from the LVM cache so other tools
    /// never see them.
    fn refresh_vg_cache(&self) {
        debug!("updating VG cache");
        self.try_run("/sbin/vgscan", &["--cache"]);
        if let Some(out) = self.try_run("/bin/lsblk", &[]) {
            debug!("lsblk output\n{}", out.stdout.trim_end());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::LoopBinding;
    use crate::runner::ScriptedRunner;
    use scanfs_common::RunId;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn ctx_with_bindings(dir: &std::path::Path, devices: &[&str]) -> RunContext {
        let mut ctx =
            RunContext::with_run_id(dir.to_path_buf(), RunId("t".to_string()));
        for (i, device) in devices.iter().enumerate() {
            let snapshot = ctx.snapshot_dir.join(format!("ref{i}.img"));
            ctx.snapshots.push(snapshot.clone());
            ctx.bindings.push(LoopBinding {
                snapshot,
                device: device.to_string(),
            });
        }
        ctx
    }

    #[test]
    fn every_binding_is_unmapped_and_detached() {
        let dir = tempdir().unwrap();
        let runner = ScriptedRunner::new();
        let ctx = ctx_with_bindings(dir.path(), &["/dev/loop0", "/dev/loop1"]);
        CleanupCoordinator::new(&runner).run(&ctx);
        assert_eq!(runner.count_calls("/sbin/kpartx -d"), 2);
        assert_eq!(runner.count_calls("/sbin/losetup -d"), 2);
        assert!(runner.calls().contains(&"/sbin/losetup -d /dev/loop0".to_string()));
        assert!(runner.calls().contains(&"/sbin/losetup -d /dev/loop1".to_string()));
    }

    #[test]
    fn mappings_are_removed_before_the_loop_device() {
        let dir = tempdir().unwrap();
        let runner = ScriptedRunner::new();
        let ctx = ctx_with_bindings(dir.path(), &["/dev/loop0"]);
        CleanupCoordinator::new(&runner).run(&ctx);
        let calls = runner.calls();
        let kpartx = calls
            .iter()
            .position(|c| c == "/sbin/kpartx -d /dev/loop0")
            .unwrap();
        let losetup = calls
            .iter()
            .position(|c| c == "/sbin/losetup -d /dev/loop0")
            .unwrap();
        assert!(kpartx < losetup);
    }

    #[test]
    fn groups_are_deactivated_by_uuid_selector() {
        let dir = tempdir().unwrap();
        let runner = ScriptedRunner::new();
        let ctx = ctx_with_bindings(dir.path(), &["/dev/loop0"]);
        runner.respond(
            "/sbin/vgs --noheadings -o vg_uuid --select pv_name=~loop0p",
            crate::runner::CommandOutput::with_stdout("  abc-123\n"),
        );
        CleanupCoordinator::new(&runner).run(&ctx);
        assert!(runner
            .calls()
            .contains(&"/sbin/vgchange -an --select vg_uuid=abc-123".to_string()));
        // never deactivated by name
        assert!(!runner.calls().iter().any(|c| c.starts_with("/sbin/vgchange -an Scan")));
    }

    #[test]
    fn snapshots_are_deleted_unless_suppressed() {
        let dir = tempdir().unwrap();
        let runner = ScriptedRunner::new();
        let ctx = ctx_with_bindings(dir.path(), &["/dev/loop0"]);
        std::fs::create_dir_all(&ctx.snapshot_dir).unwrap();
        std::fs::write(&ctx.snapshots[0], b"data").unwrap();

        CleanupCoordinator::new(&runner).keep_snapshots().run(&ctx);
        assert!(ctx.snapshots[0].exists());

        CleanupCoordinator::new(&runner).run(&ctx);
        assert!(!ctx.snapshots[0].exists());
    }

    #[test]
    fn empty_run_dirs_are_removed_and_nonempty_kept() {
        let dir = tempdir().unwrap();
        let runner = ScriptedRunner::new();
        let ctx = ctx_with_bindings(dir.path(), &[]);
        std::fs::create_dir_all(&ctx.mount_dir).unwrap();
        std::fs::create_dir_all(&ctx.snapshot_dir).unwrap();
        std::fs::write(ctx.snapshot_dir.join("leftover"), b"x").unwrap();
        CleanupCoordinator::new(&runner).run(&ctx);
        assert!(!ctx.mount_dir.exists());
        assert!(ctx.snapshot_dir.exists());
    }

    #[test]
    fn failing_steps_do_not_starve_later_ones() {
        let dir = tempdir().unwrap();
        let runner = ScriptedRunner::new();
        let ctx = ctx_with_bindings(dir.path(), &["/dev/loop0"]);
        runner.respond(
            "/sbin/kpartx -d /dev/loop0",
            crate::runner::CommandOutput::failed(1),
        );
        CleanupCoordinator::new(&runner).run(&ctx);
        // loop device detach and cache refresh still happened
        assert_eq!(runner.count_calls("/sbin/losetup -d"), 1);
        assert!(runner.count_calls("/sbin/vgscan --cache") >= 1);
    }
}
