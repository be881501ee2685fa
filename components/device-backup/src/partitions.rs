use log::info;
use partition_registry::{Partition, Role};

use crate::device::Device;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::operator::Operator;
use crate::outcome::{Failure, Outcome};

impl<'r, E: Executor> Device<'r, E> {
    /// Saves one flash partition under its canonical file name in a folder
    /// the operator picks.
    pub fn backup_single(&mut self, ui: &mut impl Operator, role: Role) -> Result<Outcome, Failure> {
        let partition = self.defined(role).map_err(Failure::unmodified)?;
        let mut outcome = Outcome::default();

        ui.say(&format!(
            "Select a folder to back up '{}' partition in. It will be saved as '{}'.",
            partition.name, partition.filename
        ));
        if !ui.confirm("Back up this partition?") {
            return Err(Failure::unmodified(Error::Cancelled));
        }
        let dir = ui
            .choose_directory(self.home())
            .ok_or_else(|| Failure::unmodified(Error::Cancelled))?;

        ui.say(&format!("Backing up '{}' partition...", partition.name));
        let file = dir.join(&partition.filename);
        let saved = self.backup_partition(partition, &file);
        outcome
            .track(role.label(), saved)
            .map_err(Failure::unmodified)?;
        info!("'{}' saved to {}", partition.name, file.display());
        Ok(outcome)
    }

    /// Flashes one partition from a file matching its file pattern.
    pub fn flash_single(&mut self, ui: &mut impl Operator, role: Role) -> Result<Outcome, Failure> {
        let partition = self.defined(role).map_err(Failure::unmodified)?;
        let mut outcome = Outcome::default();

        ui.say(&format!("Select a file to flash '{}' partition.", partition.name));
        if !ui.confirm("Flash this partition?") {
            return Err(Failure::unmodified(Error::Cancelled));
        }
        let image = ui
            .choose_file(self.home(), &[partition.pattern.as_str()])
            .ok_or_else(|| Failure::unmodified(Error::Cancelled))?;

        ui.say(&format!("Preparing to flash '{}' partition...", partition.name));
        let flashed = self.restore_partition(partition, &image);
        outcome
            .track(role.label(), flashed)
            .map_err(Failure::inconsistent)?;
        Ok(outcome)
    }

    /// Flashes the bootloader arguments after two separate confirmations.
    pub fn flash_boot_args(&mut self, ui: &mut impl Operator) -> Result<Outcome, Failure> {
        ui.say(
            "WARNING!!! Incorrectly modifiying bootloader arguments may render \
             your tablet unbootable!",
        );
        if !ui.confirm("Continue?") {
            return Err(Failure::unmodified(Error::Cancelled));
        }
        if !ui.confirm("This *will* flash the bootloader arguments. Continue?") {
            return Err(Failure::unmodified(Error::Cancelled));
        }
        self.flash_single(ui, Role::BootArgs)
    }

    fn defined(&self, role: Role) -> Result<&'r Partition> {
        let partition = self.registry.lookup(role);
        if !partition.is_defined() {
            return Err(Error::PartitionMissing(role.label()));
        }
        Ok(partition)
    }
}
