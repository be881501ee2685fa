use log::info;
use partition_registry::Partition;

use crate::command::Command;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::operator::Operator;
use crate::outcome::{Failure, Outcome};

impl<'r, E: Executor> Device<'r, E> {
    /// Factory reset: formats the SD `data` partition.
    pub fn wipe_data(&mut self, ui: &mut impl Operator) -> Result<Outcome, Failure> {
        if !ui.confirm("Wipe data/factory reset?") {
            return Err(Failure::unmodified(Error::Cancelled));
        }
        ui.say("Formatting /data...");
        let registry = self.registry;
        self.wipe("data", &registry.sd().data)
    }

    pub fn wipe_cache(&mut self, ui: &mut impl Operator) -> Result<Outcome, Failure> {
        if !ui.confirm("Wipe cache?") {
            return Err(Failure::unmodified(Error::Cancelled));
        }
        ui.say("Formatting /cache...");
        let registry = self.registry;
        self.wipe("cache", &registry.sd().cache)
    }

    fn wipe(&mut self, name: &str, partition: &Partition) -> Result<Outcome, Failure> {
        let mut outcome = Outcome::default();
        let wiped = partition
            .filesystem()
            .ok_or(Error::Logic("wiped partition has no filesystem"))
            .and_then(|fs| self.format(&partition.device, fs));
        outcome.track(name, wiped).map_err(Failure::inconsistent)?;
        Ok(outcome)
    }

    /// Empties the Dalvik cache on the `data` partition.
    pub fn wipe_dalvik_cache(&mut self, ui: &mut impl Operator) -> Result<Outcome, Failure> {
        if !ui.confirm("Wipe Dalvik cache?") {
            return Err(Failure::unmodified(Error::Cancelled));
        }
        let registry = self.registry;
        let mounts = registry.mounts();
        let mut outcome = Outcome::default();

        ui.say("Mounting /data...");
        self.mount(&registry.sd().data.device, &mounts.data, None, None)
            .map_err(Failure::unmodified)?;

        ui.say("Cleaning...");
        let cleared = self.run(Command::Clear {
            dir: mounts.dalvik_cache(),
        });

        ui.say("Unmounting...");
        let unmounted = self.unmount(&mounts.data);
        outcome
            .track("dalvik-cache", cleared.and(unmounted))
            .map_err(Failure::inconsistent)?;
        Ok(outcome)
    }

    /// Sends the kernel ring buffer to the operation log.
    pub fn dump_kernel_messages(&mut self) -> Result<()> {
        info!("dumping kernel messages");
        self.run(Command::KernelMessages)
    }

    /// Forces an immediate reboot. Returns only if the reboot could not be
    /// started.
    pub fn shutdown(&mut self) -> Result<()> {
        info!("rebooting");
        self.run_with(Command::Reboot, false)
    }
}
