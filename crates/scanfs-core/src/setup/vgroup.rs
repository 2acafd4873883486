//! Volume-group discovery, collision resolution, and activation.
//!
//! Every discovered group is renamed to `<prefix>-<name>`: colliding
//! groups via `vgimportclone` (which also regenerates their identifiers so
//! they can never be confused with the system group of the same name),
//! non-colliding ones via a plain `vgrename` for uniform traceability.

use crate::context::RunContext;
use crate::runner::CommandRunner;
use scanfs_common::{Error, Result};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// One physical volume and the group it belongs to, as reported by `pvs`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PvRecord {
    pv: String,
    vg: String,
}

pub struct VolumeGroupResolver<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> VolumeGroupResolver<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Physical volumes sitting on loop partitions. Lines without a group
    /// (orphan PVs) are skipped; they have nothing to rename or activate.
    fn loop_physical_volumes(&self) -> Result<Vec<PvRecord>> {
        let out = self.runner.run(
            "/sbin/pvs",
            &[
                "--noheadings",
                "-o",
                "pv_name,vg_name",
                "-S",
                "pv_name=~loop",
            ],
        )?;
        Ok(out
            .stdout
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let pv = fields.next()?;
                let vg = fields.next()?;
                Some(PvRecord {
                    pv: pv.to_string(),
                    vg: vg.to_string(),
                })
            })
            .collect())
    }

    /// Rename every candidate group and record the resolved names.
    ///
    /// Post-condition: the resolved name set is disjoint from the
    /// pre-existing denylist; a surviving original name is fatal.
    pub fn resolve(&self, ctx: &mut RunContext) -> Result<()> {
        let records = self.loop_physical_volumes()?;
        // only partitions of this run's loop devices, never pre-existing PVs
        let records: Vec<PvRecord> = records
            .into_iter()
            .filter(|record| {
                ctx.bindings
                    .iter()
                    .any(|binding| record.pv.contains(binding.device_name()))
            })
            .collect();

        let candidates: BTreeSet<String> =
            records.iter().map(|record| record.vg.clone()).collect();
        let mut colliding: Vec<String> = Vec::new();

        for vg in &candidates {
            let new_name = format!("{}-{}", ctx.vg_prefix, vg);
            if ctx.preexisting_vgs.contains(vg) {
                colliding.push(vg.clone());
                let members: Vec<&str> = records
                    .iter()
                    .filter(|record| &record.vg == vg)
                    .map(|record| record.pv.as_str())
                    .collect();
                debug!("pv list = {members:?}");
                debug!("renaming volume group {vg} to {new_name} (import-as-clone)");
                let out = self.runner.run("/sbin/pvscan", &["--cache"])?;
                debug!("{}", out.stdout.trim_end());
                let mut args = vec!["-n", new_name.as_str()];
                args.extend(members.iter());
                let out = self.runner.run("/sbin/vgimportclone", &args)?;
                if !out.success() {
                    info!("failed to rename volume group {vg}, cleaning up");
                    return Err(Error::VgRenameFailed { group: vg.clone() });
                }
            } else {
                debug!("renaming volume group {vg} to {new_name}");
                let out = self.runner.run("/sbin/vgrename", &[vg, &new_name])?;
                debug!("{}", out.stdout.trim_end());
                if !out.success() {
                    warn!("vgrename {vg} {new_name} failed");
                }
            }
            ctx.resolved_vgs.push(new_name);
        }

        let survivors: Vec<String> = colliding
            .iter()
            .filter(|vg| ctx.resolved_vgs.iter().any(|resolved| &resolved == vg))
            .cloned()
            .collect();
        if !survivors.is_empty() {
            info!("conflicting volume groups still present, cleaning up");
            return Err(Error::ConflictingGroups { names: survivors });
        }
        Ok(())
    }

    /// Bring every resolved group online so its logical volumes become
    /// mountable.
    pub fn activate(&self, ctx: &RunContext) -> Result<()> {
        let out = self.runner.run("/sbin/vgscan", &[])?;
        debug!("{}", out.stdout.trim_end());
        for vg in &ctx.resolved_vgs {
            debug!("activating volume group {vg}");
            let out = self.runner.run("/sbin/vgchange", &["-ay", vg])?;
            debug!("{}", out.stdout.trim_end());
        }
        Ok(())
    }
}
