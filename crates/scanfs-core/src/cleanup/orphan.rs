//! Orphaned-device discovery for `--clean`.
//!
//! A crashed run leaves loop devices attached; they are found again by
//! matching each device's backing file against this directory's snapshot
//! prefix. Devices backed by other paths are reported but never touched.

use crate::cleanup::CleanupCoordinator;
use crate::context::{LoopBinding, RunContext};
use crate::exit_codes::ExitCode;
use crate::runner::CommandRunner;
use scanfs_common::Result;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

/// `losetup --json` report shape.
#[derive(Debug, Deserialize)]
struct LosetupReport {
    #[serde(default)]
    loopdevices: Vec<LoopEntry>,
}

#[derive(Debug, Deserialize)]
struct LoopEntry {
    name: String,
    #[serde(rename = "back-file")]
    back_file: Option<String>,
}

impl LoopEntry {
    /// losetup appends " (deleted)" when the backing file is gone.
    fn backing_deleted(&self) -> bool {
        self.back_file
            .as_deref()
            .is_some_and(|f| f.ends_with(" (deleted)"))
    }

    fn backing_path(&self) -> Option<&str> {
        let file = self.back_file.as_deref()?;
        Some(file.strip_suffix(" (deleted)").unwrap_or(file))
    }
}

/// Find and remove loop devices whose backing snapshot lives under this
/// directory. Always exits 0: having nothing to clean is success.
pub fn clean(runner: &dyn CommandRunner, ctx: &RunContext) -> Result<ExitCode> {
    let out = runner.run("/sbin/losetup", &["--json", "-O", "NAME,BACK-FILE"])?;
    let devices = parse_losetup_report(&out.stdout)?;
    if devices.is_empty() {
        info!("no loop devices found, nothing to clean");
        return Ok(ExitCode::Success);
    }

    for device in &devices {
        if device.backing_deleted() {
            info!("underlying file of loop device {} is deleted", device.name);
        }
    }

    let prefix = RunContext::snapshot_dir_prefix(&ctx.scan_dir);
    let orphaned: Vec<&LoopEntry> = devices
        .iter()
        .filter(|device| {
            device
                .backing_path()
                .is_some_and(|path| path.starts_with(&prefix))
        })
        .collect();

    if orphaned.is_empty() {
        info!(
            "no loop devices found from {}; they belong to a different path, \
             clean them up manually",
            ctx.scan_dir.display()
        );
        return Ok(ExitCode::Success);
    }

    let mut orphan_ctx = RunContext::with_run_id(ctx.scan_dir.clone(), ctx.run_id.clone());
    for device in &orphaned {
        let snapshot = PathBuf::from(device.backing_path().unwrap_or_default());
        orphan_ctx.snapshots.push(snapshot.clone());
        orphan_ctx.bindings.push(LoopBinding {
            snapshot,
            device: device.name.clone(),
        });
    }

    CleanupCoordinator::new(runner)
        .keep_snapshots()
        .run(&orphan_ctx);

    info!("the base images of the loop devices are left behind:");
    for snapshot in &orphan_ctx.snapshots {
        info!("{}", snapshot.display());
    }
    info!("delete these manually if they are not required");
    Ok(ExitCode::Success)
}

fn parse_losetup_report(stdout: &str) -> Result<Vec<LoopEntry>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let report: LosetupReport = serde_json::from_str(trimmed)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
    Ok(report.loopdevices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{CommandOutput, ScriptedRunner};

    const LOSETUP_CMD: &str = "/sbin/losetup --json -O NAME,BACK-FILE";

    fn ctx() -> RunContext {
        RunContext::with_run_id(
            PathBuf::from("/backups/vm1"),
            scanfs_common::RunId("t".to_string()),
        )
    }

    #[test]
    fn nothing_attached_is_nothing_to_clean() {
        let runner = ScriptedRunner::new();
        let code = clean(&runner, &ctx()).unwrap();
        assert_eq!(code, ExitCode::Success);
        assert_eq!(runner.count_calls("/sbin/losetup -d"), 0);
    }

    #[test]
    fn orphans_under_snapshot_prefix_are_removed_and_reported() {
        let runner = ScriptedRunner::new();
        runner.respond(
            LOSETUP_CMD,
            CommandOutput::with_stdout(
                r#"{"loopdevices": [
                    {"name": "/dev/loop2",
                     "back-file": "/backups/vm1/ref_dir-2026-08-08T01-02-03/refdisk.img"},
                    {"name": "/dev/loop3", "back-file": "/other/place/refdisk.img"}
                ]}"#,
            ),
        );
        let code = clean(&runner, &ctx()).unwrap();
        assert_eq!(code, ExitCode::Success);
        // only the device backed by this directory's snapshots is touched
        assert!(runner.calls().contains(&"/sbin/losetup -d /dev/loop2".to_string()));
        assert!(!runner.calls().contains(&"/sbin/losetup -d /dev/loop3".to_string()));
        assert!(runner.calls().contains(&"/sbin/kpartx -d /dev/loop2".to_string()));
    }

    #[test]
    fn foreign_devices_only_is_still_success_without_mutation() {
        let runner = ScriptedRunner::new();
        runner.respond(
            LOSETUP_CMD,
            CommandOutput::with_stdout(
                r#"{"loopdevices": [{"name": "/dev/loop9", "back-file": "/srv/other.img"}]}"#,
            ),
        );
        let code = clean(&runner, &ctx()).unwrap();
        assert_eq!(code, ExitCode::Success);
        assert_eq!(runner.count_calls("/sbin/losetup -d"), 0);
        assert_eq!(runner.count_calls("/sbin/kpartx -d"), 0);
    }

    #[test]
    fn deleted_backing_file_suffix_is_stripped_for_matching() {
        let entry = LoopEntry {
            name: "/dev/loop0".to_string(),
            back_file: Some(
                "/backups/vm1/ref_dir-x/refdisk.img (deleted)".to_string(),
            ),
        };
        assert!(entry.backing_deleted());
        assert_eq!(
            entry.backing_path(),
            Some("/backups/vm1/ref_dir-x/refdisk.img")
        );
    }

    #[test]
    fn clean_never_deletes_snapshot_files() {
        let runner = ScriptedRunner::new();
        let dir = tempfile::tempdir().unwrap();
        let snapshot_dir = dir.path().join("ref_dir-old");
        std::fs::create_dir_all(&snapshot_dir).unwrap();
        let snapshot = snapshot_dir.join("refdisk.img");
        std::fs::write(&snapshot, b"img").unwrap();
        runner.respond(
            LOSETUP_CMD,
            CommandOutput::with_stdout(format!(
                r#"{{"loopdevices": [{{"name": "/dev/loop0", "back-file": "{}"}}]}}"#,
                snapshot.display()
            )),
        );
        let ctx = RunContext::with_run_id(
            dir.path().to_path_buf(),
            scanfs_common::RunId("t".to_string()),
        );
        clean(&runner, &ctx).unwrap();
        assert!(snapshot.exists());
    }
}
