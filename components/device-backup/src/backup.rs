use std::path::{Path, PathBuf};

use chrono::Local;
use log::{error, info, warn};
use partition_registry::Role;

use crate::command::Command;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::operator::Operator;
use crate::outcome::{Failure, Outcome, Warning};
use crate::probe;
use crate::workspace::{archive_name, discard, Scratch};

pub const NAND_MEMBER: &str = "nand.tgz";
pub const SYSTEM_MEMBER: &str = "system.tgz";
pub const DATA_MEMBER: &str = "data.tgz";

/// Components to put into a backup.
///
/// `system` covers the kernel, the NAND root filesystem and the SD
/// `system` partition; `data` the SD `data` partition.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Selection {
    pub system: bool,
    pub data: bool,
}

impl Selection {
    pub const SYSTEM: Self = Self {
        system: true,
        data: false,
    };
    pub const DATA: Self = Self {
        system: false,
        data: true,
    };
    pub const ALL: Self = Self {
        system: true,
        data: true,
    };

    pub fn is_empty(&self) -> bool {
        !self.system && !self.data
    }
}

impl<'r, E: Executor> Device<'r, E> {
    /// Bytes a backup of `selection` may need, `None` if a size is unknown.
    pub fn estimate_backup_size(&self, selection: Selection) -> Option<u64> {
        let registry = self.registry;
        let sd = registry.sd();
        let mut total = 0;

        if selection.system {
            let kernel = registry.lookup(Role::Kernel);
            if kernel.is_defined() {
                total += Some(kernel.size).filter(|size| *size > 0)?;
            }
            let rootfs = registry.lookup(Role::Rootfs);
            if rootfs.is_present() {
                total += probe::block_device_size(&rootfs.presence)?;
            }
            total += probe::block_device_size(&sd.system.presence)?;
        }
        if selection.data {
            total += probe::block_device_size(&sd.data.presence)?;
        }
        Some(total)
    }

    fn backup_fits(&self, selection: Selection, places: &[&Path]) -> bool {
        let Some(required) = self.estimate_backup_size(selection) else {
            return false;
        };
        places
            .iter()
            .all(|place| probe::free_space(place).map_or(false, |free| required < free))
    }

    /// Creates `Backup_<timestamp>.mfw` in a folder the operator picks.
    ///
    /// A failed backup removes its partial archive and never touches the
    /// device's storage contents.
    pub fn create_backup(
        &mut self,
        ui: &mut impl Operator,
        selection: Selection,
    ) -> Result<Outcome, Failure> {
        let sd = self.registry.sd();
        if selection.system && !sd.system.is_present() {
            return Err(Failure::unmodified(Error::StorageUnreachable(
                "'system' partition on internal SD".into(),
            )));
        }
        if selection.data && !sd.data.is_present() {
            return Err(Failure::unmodified(Error::StorageUnreachable(
                "'data' partition on internal SD".into(),
            )));
        }

        let scratch = Scratch::create(self.home()).map_err(Failure::unmodified)?;
        let mut outcome = Outcome::default();
        let mut archive = None;

        let packed = self.pack_backup(ui, selection, &scratch, &mut outcome, &mut archive);

        ui.say("* Cleaning up temporary folder used for backup creation...");
        let cleaned = scratch.close();

        if packed.is_err() || cleaned.is_err() {
            if let Some(archive) = &archive {
                ui.say("* Cleaning up failed backup archive...");
                if let Err(err) = discard(archive) {
                    error!("partial backup archive is left behind: {err}");
                }
            }
        }

        match (packed, cleaned) {
            (Ok(()), Ok(())) => Ok(outcome),
            (Err(err), cleaned) => {
                if let Err(cleanup) = cleaned {
                    warn!("scratch folder cleanup failed as well: {cleanup}");
                }
                Err(Failure::unmodified(err))
            }
            (Ok(()), Err(err)) => Err(Failure::unmodified(err)),
        }
    }

    fn pack_backup(
        &mut self,
        ui: &mut impl Operator,
        selection: Selection,
        scratch: &Scratch,
        outcome: &mut Outcome,
        archive: &mut Option<PathBuf>,
    ) -> Result<()> {
        let registry = self.registry;
        let sd = registry.sd();
        let mounts = registry.mounts();

        ui.say("Select a folder to place the backup in.");
        if !ui.confirm("Create a backup?") {
            return Err(Error::Cancelled);
        }
        let destination = ui
            .choose_directory(self.home())
            .ok_or(Error::Cancelled)?;

        if !self.backup_fits(selection, &[scratch.path(), destination.as_path()]) {
            outcome.warn(Warning::InsufficientSpace("for creating a backup".into()));
            ui.say("WARNING: There may be insufficient space for creating a backup.");
            if !ui.confirm("Continue anyway?") {
                return Err(Error::Cancelled);
            }
        }

        let mut members = Vec::new();

        if selection.system {
            let kernel = registry.lookup(Role::Kernel);
            if kernel.is_defined() {
                ui.say("* Backing up kernel...");
                let file = scratch.member(&kernel.filename);
                outcome.track("kernel", self.backup_partition(kernel, &file))?;
                members.push(kernel.filename.clone());
            } else {
                outcome.skip("kernel", "no kernel partition");
            }

            let rootfs = registry.lookup(Role::Rootfs);
            if rootfs.is_present() {
                ui.say("* Backing up NAND...");
                let file = scratch.member(NAND_MEMBER);
                outcome.track("nand", self.backup_ubi(&file, rootfs))?;
                members.push(NAND_MEMBER.to_owned());
            } else {
                outcome.skip("nand", "no NAND");
            }

            ui.say("* Backing up system...");
            let file = scratch.member(SYSTEM_MEMBER);
            let fs = sd.system.filesystem();
            let result = self.backup_mountpoint(&file, &sd.system.device, &mounts.system, fs, "ro");
            outcome.track("system", result)?;
            members.push(SYSTEM_MEMBER.to_owned());
        }

        if selection.data {
            ui.say("* Backing up data...");
            let file = scratch.member(DATA_MEMBER);
            let fs = sd.data.filesystem();
            let result = self.backup_mountpoint(&file, &sd.data.device, &mounts.data, fs, "ro");
            outcome.track("data", result)?;
            members.push(DATA_MEMBER.to_owned());
        }

        let path = destination.join(archive_name(&Local::now().naive_local()));
        *archive = Some(path.clone());

        ui.say("* Preparing final backup...");
        info!("packing {} member(s) into {}", members.len(), path.display());
        let packed = self.run(Command::TarCreate {
            archive: path,
            dir: scratch.path().to_owned(),
            members: Some(members),
            preserve: false,
            compress: true,
        });
        outcome.track("archive", packed)
    }
}
