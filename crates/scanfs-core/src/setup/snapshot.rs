//! Copy-on-write snapshots of the discovered images.

use crate::context::RunContext;
use crate::runner::CommandRunner;
use scanfs_common::{Error, Result};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

/// Creates one reflink clone per image so the originals are never touched.
pub struct ReflinkSnapshotter<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> ReflinkSnapshotter<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Clone every image into the snapshot directory, recording each
    /// snapshot in the context as it is created.
    ///
    /// `--reflink=always` makes the clone fail outright instead of
    /// degrading to a full copy; a failed clone leaves no destination
    /// file behind.
    pub fn snapshot_all(&self, ctx: &mut RunContext, images: &[PathBuf]) -> Result<()> {
        debug!(
            "creating {} to store reflink copies",
            ctx.snapshot_dir.display()
        );
        fs::create_dir_all(&ctx.snapshot_dir)?;

        for image in images {
            let basename = image
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let dest = ctx.snapshot_dir.join(format!("ref{basename}"));
            info!("setting up - {basename}");
            debug!("original image - {}", image.display());

            let image_arg = image.to_string_lossy();
            let dest_arg = dest.to_string_lossy();
            let started = Instant::now();
            let out = self.runner.run(
                "/bin/cp",
                &["--reflink=always", image_arg.as_ref(), dest_arg.as_ref()],
            )?;
            if !out.success() {
                let _ = fs::remove_file(&dest);
                return Err(Error::SnapshotFailed {
                    image: image.clone(),
                });
            }
            debug!(
                "reflink copy - {} copy time = {:.3}s",
                dest.display(),
                started.elapsed().as_secs_f64()
            );
            ctx.snapshots.push(dest);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{CommandOutput, ScriptedRunner};
    use tempfile::tempdir;

    fn ctx_for(dir: &std::path::Path) -> RunContext {
        RunContext::new(dir.to_path_buf())
    }

    #[test]
    fn snapshots_are_named_and_recorded() {
        let dir = tempdir().unwrap();
        let mut ctx = ctx_for(dir.path());
        let runner = ScriptedRunner::new();
        let images = vec![dir.path().join("disk1.img"), dir.path().join("disk2.img")];

        ReflinkSnapshotter::new(&runner)
            .snapshot_all(&mut ctx, &images)
            .unwrap();

        assert_eq!(ctx.snapshots.len(), 2);
        assert!(ctx.snapshots[0].ends_with("refdisk1.img"));
        assert!(ctx.snapshots[1].ends_with("refdisk2.img"));
        assert!(ctx.snapshot_dir.is_dir());
        assert_eq!(runner.count_calls("/bin/cp --reflink=always"), 2);
    }

    #[test]
    fn failed_clone_aborts_and_removes_stray_destination() {
        let dir = tempdir().unwrap();
        let mut ctx = ctx_for(dir.path());
        let runner = ScriptedRunner::new();
        let image = dir.path().join("disk1.img");
        let dest = ctx.snapshot_dir.join("refdisk1.img");
        runner.respond(
            &format!("/bin/cp --reflink=always {} {}", image.display(), dest.display()),
            CommandOutput::failed(1),
        );
        // simulate cp leaving a partial destination
        fs::create_dir_all(&ctx.snapshot_dir).unwrap();
        fs::write(&dest, b"partial").unwrap();

        let err = ReflinkSnapshotter::new(&runner)
            .snapshot_all(&mut ctx, &[image])
            .unwrap_err();
        assert!(matches!(err, Error::SnapshotFailed { .. }));
        assert!(!dest.exists());
        assert!(ctx.snapshots.is_empty());
    }

    #[test]
    fn earlier_snapshots_stay_recorded_when_a_later_clone_fails() {
        let dir = tempdir().unwrap();
        let mut ctx = ctx_for(dir.path());
        let runner = ScriptedRunner::new();
        let good = dir.path().join("a.img");
        let bad = dir.path().join("b.img");
        let bad_dest = ctx.snapshot_dir.join("refb.img");
        runner.respond(
            &format!("/bin/cp --reflink=always {} {}", bad.display(), bad_dest.display()),
            CommandOutput::failed(1),
        );

        let result =
            ReflinkSnapshotter::new(&runner).snapshot_all(&mut ctx, &[good, bad]);
        assert!(result.is_err());
        // the first clone is still the cleanup coordinator's problem
        assert_eq!(ctx.snapshots.len(), 1);
        assert!(ctx.snapshots[0].ends_with("refa.img"));
    }
}
