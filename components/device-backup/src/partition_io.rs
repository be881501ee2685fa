use std::path::Path;

use log::{error, info};
use partition_registry::{Partition, SECTOR_SIZE};

use crate::command::Command;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::workspace::discard;

impl<'r, E: Executor> Device<'r, E> {
    /// Dumps one partition into `file`.
    ///
    /// Without the MTD, the partition's byte range is read from the internal
    /// SD card instead, one sector past its partition table.
    pub fn backup_partition(&mut self, partition: &Partition, file: &Path) -> Result<()> {
        if !partition.is_defined() {
            return Err(Error::Logic("backup of an undefined partition"));
        }

        let command = if partition.is_present() {
            info!("dumping '{}' from {}", partition.name, partition.device.display());
            Command::NandDump {
                device: partition.device.clone(),
                file: file.to_owned(),
            }
        } else {
            info!("'{}' has no MTD, reading the SD card mirror", partition.name);
            Command::DiskRead {
                device: self.registry.sd().device.clone(),
                file: file.to_owned(),
                block_size: SECTOR_SIZE,
                count: partition.size / SECTOR_SIZE,
                skip: sd_block(partition),
            }
        };

        let result = self.run(command);
        if result.is_err() {
            // discard logs its own failure, the dump error matters more
            discard(file).ok();
        }
        result
    }

    /// Writes `file` back into one partition.
    ///
    /// Flashing an MTD erases it first. A write failure after the erase is
    /// reported as [`Error::PartiallyModified`].
    pub fn restore_partition(&mut self, partition: &Partition, file: &Path) -> Result<()> {
        if !partition.is_defined() {
            return Err(Error::Logic("restore of an undefined partition"));
        }

        if !partition.is_present() {
            info!("'{}' has no MTD, writing the SD card mirror", partition.name);
            return self.run(Command::DiskWrite {
                file: file.to_owned(),
                device: self.registry.sd().device.clone(),
                block_size: SECTOR_SIZE,
                count: partition.size / SECTOR_SIZE,
                seek: sd_block(partition),
            });
        }

        info!("erasing '{}'", partition.name);
        self.run(Command::FlashErase {
            device: partition.device.clone(),
        })?;

        info!("flashing '{}'", partition.name);
        self.run(Command::NandWrite {
            device: partition.device.clone(),
            file: file.to_owned(),
        })
        .map_err(|err| {
            error!("'{}' is left erased", partition.name);
            Error::PartiallyModified {
                partition: partition.name.clone(),
                source: Box::new(err),
            }
        })
    }
}

/// First SD block of a flash partition's mirror; block 0 is the MBR.
fn sd_block(partition: &Partition) -> u64 {
    1 + partition.offset / SECTOR_SIZE
}
