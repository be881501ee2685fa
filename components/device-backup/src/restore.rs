use std::path::{Path, PathBuf};

use log::{info, warn};
use partition_registry::{Registry, Role};

use crate::backup::{DATA_MEMBER, NAND_MEMBER, SYSTEM_MEMBER};
use crate::command::Command;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::operator::Operator;
use crate::outcome::{DeviceState, Failure, Outcome, Warning};
use crate::probe;
use crate::workspace::{Scratch, ARCHIVE_FILTER};

/// Stage of a restore. Nothing is written to the device while verifying.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    Verifying,
    Extracting,
}

impl Phase {
    pub fn device_state(self) -> DeviceState {
        match self {
            Phase::Verifying => DeviceState::Unmodified,
            Phase::Extracting => DeviceState::PossiblyInconsistent,
        }
    }
}

/// Role of a backup archive member, in restore order.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum Member {
    Kernel,
    Nand,
    System,
    Data,
    Unknown(String),
}

impl Member {
    pub fn classify(name: &str, registry: &Registry) -> Self {
        let kernel = registry.lookup(Role::Kernel);
        match name {
            _ if kernel.is_defined() && name == kernel.filename => Member::Kernel,
            NAND_MEMBER => Member::Nand,
            SYSTEM_MEMBER => Member::System,
            DATA_MEMBER => Member::Data,
            _ => Member::Unknown(name.to_owned()),
        }
    }

    fn label(&self) -> &str {
        match self {
            Member::Kernel => "kernel",
            Member::Nand => "nand",
            Member::System => "system",
            Member::Data => "data",
            Member::Unknown(name) => name,
        }
    }
}

impl<'r, E: Executor> Device<'r, E> {
    /// Restores a backup archive the operator picks.
    ///
    /// All members are checked against the device before anything is
    /// written. The returned [`Failure`] tells whether the device was
    /// touched.
    pub fn restore_backup(&mut self, ui: &mut impl Operator) -> Result<Outcome, Failure> {
        let scratch = Scratch::create(self.home()).map_err(Failure::unmodified)?;
        let mut outcome = Outcome::default();
        let mut phase = Phase::Verifying;

        let restored = self.unpack_backup(ui, &scratch, &mut outcome, &mut phase);
        if let Err(err) = &restored {
            warn!("restore failed while {phase:?}: {err}");
        }

        ui.say("* Cleaning up temporary folder used for backup restoration...");
        let cleaned = scratch.close();

        match (restored, cleaned) {
            (Ok(()), Ok(())) => Ok(outcome),
            (Err(err), cleaned) => {
                if let Err(cleanup) = cleaned {
                    warn!("scratch folder cleanup failed as well: {cleanup}");
                }
                Err(Failure {
                    error: err,
                    device: phase.device_state(),
                })
            }
            (Ok(()), Err(err)) => Err(Failure {
                error: err,
                device: DeviceState::Written,
            }),
        }
    }

    fn unpack_backup(
        &mut self,
        ui: &mut impl Operator,
        scratch: &Scratch,
        outcome: &mut Outcome,
        phase: &mut Phase,
    ) -> Result<()> {
        ui.say("Select the backup to restore.");
        if !ui.confirm("Restore a backup?") {
            return Err(Error::Cancelled);
        }
        let archive = ui
            .choose_file(self.home(), &[ARCHIVE_FILTER])
            .ok_or(Error::Cancelled)?;

        let free = probe::free_space(scratch.path()).unwrap_or(0);
        if probe::file_size(&archive) >= free {
            outcome.warn(Warning::InsufficientSpace("for restoring the backup".into()));
            ui.say(
                "WARNING: There may be insufficient space for restoring the backup. \
                 Your device has not yet been modified.",
            );
            if !ui.confirm("Continue anyway?") {
                return Err(Error::Cancelled);
            }
        }

        ui.say("* Extracting archived backup...");
        self.run(Command::TarExtract {
            archive: archive.clone(),
            dir: scratch.path().to_owned(),
        })?;

        let registry = self.registry;
        let mut members: Vec<(Member, PathBuf)> = scratch
            .members()?
            .into_iter()
            .map(|name| (Member::classify(&name, registry), scratch.member(&name)))
            .collect();
        members.sort();
        info!("{} holds {} member(s)", archive.display(), members.len());

        ui.say("+ Verifying...");
        let mut consent = false;
        for (member, file) in &members {
            if let Some(warning) = self.verify_member(member, file)? {
                consent |= warning.needs_consent();
                match &warning {
                    Warning::UnknownMember(name) => {
                        ui.say(&format!(
                            "An unknown file in the backup archive was ignored: {name}"
                        ));
                        warn!("{}", Error::ArchiveMemberUnknown(name.clone()));
                        outcome.skip(name.clone(), "unknown file");
                    }
                    Warning::InsufficientSpace(place) => {
                        ui.say(&format!("WARNING: There may be insufficient space {place}."));
                    }
                    Warning::MissingImage(_) => {}
                }
                outcome.warn(warning);
            }
        }

        if consent {
            ui.say("Your device has not yet been modified.");
            if !ui.confirm("Continue restoring the backup?") {
                return Err(Error::Cancelled);
            }
        }

        *phase = Phase::Extracting;
        ui.say("+ Extracting...");
        for (member, file) in &members {
            if matches!(member, Member::Unknown(_)) {
                continue;
            }
            let result = self.extract_member(ui, member, file);
            outcome.track(member.label(), result)?;
        }
        Ok(())
    }

    /// Checks that the storage for `member` exists. Never writes.
    fn verify_member(&self, member: &Member, file: &Path) -> Result<Option<Warning>> {
        let registry = self.registry;
        let sd = registry.sd();
        let size = probe::file_size(file);

        let (capacity, place) = match member {
            Member::Kernel => {
                let kernel = registry.lookup(Role::Kernel);
                if !kernel.is_present() && !probe::exists(&sd.presence) {
                    return Err(Error::StorageUnreachable("kernel on NAND/MMC".into()));
                }
                (kernel.size, "on 'kernel' partition")
            }
            Member::Nand => {
                let rootfs = registry.lookup(Role::Rootfs);
                if !rootfs.is_present() {
                    return Err(Error::StorageUnreachable("NAND".into()));
                }
                let capacity = probe::block_device_size(&rootfs.presence).unwrap_or(0);
                (capacity, "on NAND")
            }
            Member::System => {
                if !sd.system.is_present() {
                    return Err(Error::StorageUnreachable(
                        "'system' partition on internal SD".into(),
                    ));
                }
                let capacity = probe::block_device_size(&sd.system.presence).unwrap_or(0);
                (capacity, "on 'system' partition")
            }
            Member::Data => {
                if !sd.data.is_present() {
                    return Err(Error::StorageUnreachable(
                        "'data' partition on internal SD".into(),
                    ));
                }
                let capacity = probe::block_device_size(&sd.data.presence).unwrap_or(0);
                (capacity, "on 'data' partition")
            }
            Member::Unknown(name) => return Ok(Some(Warning::UnknownMember(name.clone()))),
        };

        Ok((capacity < size).then(|| Warning::InsufficientSpace(place.to_owned())))
    }

    fn extract_member(&mut self, ui: &mut impl Operator, member: &Member, file: &Path) -> Result<()> {
        let registry = self.registry;
        let sd = registry.sd();
        let mounts = registry.mounts();

        match member {
            Member::Kernel => {
                ui.say("* Flashing kernel...");
                self.restore_partition(registry.lookup(Role::Kernel), file)
            }
            Member::Nand => {
                ui.say("* Restoring NAND...");
                self.restore_ubi(file, registry.lookup(Role::Rootfs))
            }
            Member::System => {
                ui.say("* Restoring 'system' partition...");
                let fs = sd
                    .system
                    .filesystem()
                    .ok_or(Error::Logic("'system' partition has no filesystem"))?;
                self.restore_mountpoint(file, &sd.system.device, &mounts.system, fs, "rw", true)
            }
            Member::Data => {
                ui.say("* Restoring 'data' partition...");
                let fs = sd
                    .data
                    .filesystem()
                    .ok_or(Error::Logic("'data' partition has no filesystem"))?;
                self.restore_mountpoint(file, &sd.data.device, &mounts.data, fs, "rw", true)
            }
            Member::Unknown(_) => Err(Error::Logic("unknown member reached extraction")),
        }
    }
}
