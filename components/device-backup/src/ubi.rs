use log::{error, info, warn};
use partition_registry::{Partition, UbiVolume};

use crate::command::Command;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::executor::Executor;

/// Attach state of the single logical UBI device the recovery uses.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum UbiState {
    #[default]
    Detached,
    Attached,
    VolumeCreated,
}

impl<'r, E: Executor> Device<'r, E> {
    pub fn ubi_attach(&mut self, volume: &UbiVolume, controller: u32) -> Result<()> {
        if self.ubi != UbiState::Detached {
            return Err(Error::Logic("UBI device is already attached"));
        }
        info!("attaching mtd{controller} as ubi{}", volume.device);
        self.run(Command::UbiAttach {
            control: volume.control.clone(),
            controller,
            device: volume.device,
        })?;
        self.ubi = UbiState::Attached;
        Ok(())
    }

    /// `size: None` makes the volume span the whole UBI device.
    pub fn ubi_create_volume(&mut self, volume: &UbiVolume, size: Option<u64>) -> Result<()> {
        if self.ubi != UbiState::Attached {
            return Err(Error::Logic("UBI volume needs a freshly attached device"));
        }
        self.run(Command::UbiMakeVolume {
            node: volume.device_node(),
            volume: volume.volume,
            name: volume.name.clone(),
            size,
        })?;
        self.ubi = UbiState::VolumeCreated;
        Ok(())
    }

    pub fn ubi_detach(&mut self, volume: &UbiVolume) -> Result<()> {
        if self.ubi == UbiState::Detached {
            return Err(Error::Logic("UBI device is not attached"));
        }
        info!("detaching ubi{}", volume.device);
        self.run(Command::UbiDetach {
            control: volume.control.clone(),
            device: volume.device,
        })?;
        self.ubi = UbiState::Detached;
        Ok(())
    }

    /// Erases the flash behind `partition` and leaves an empty volume
    /// attached. The caller detaches after use.
    ///
    /// An attachment left behind by an earlier failed detach gets one more
    /// detach attempt. The flash is never erased while UBI holds it.
    pub fn ubi_format_and_attach(&mut self, partition: &Partition) -> Result<()> {
        let volume = partition
            .ubi_volume()
            .ok_or(Error::Logic("partition does not carry a UBI volume"))?;

        if self.ubi != UbiState::Detached {
            warn!("ubi{} is still attached, detaching before erase", volume.device);
            if let Err(err) = self.ubi_detach(volume) {
                error!("cannot release stale UBI attachment: {err}");
                return Err(Error::Logic("UBI device is still attached"));
            }
        }

        self.run(Command::FlashErase {
            device: partition.device.clone(),
        })?;
        self.ubi_attach(volume, partition.controller)?;

        if let Err(err) = self.ubi_create_volume(volume, None) {
            if let Err(detach) = self.ubi_detach(volume) {
                warn!("detaching after failed volume creation: {detach}");
            }
            return Err(err);
        }
        Ok(())
    }
}
