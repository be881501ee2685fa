use std::path::Path;

use log::{info, warn};
use partition_registry::{Filesystem, Partition};

use crate::command::Command;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::workspace::discard;

impl<'r, E: Executor> Device<'r, E> {
    pub fn mount(
        &mut self,
        source: &Path,
        mountpoint: &Path,
        fs: Option<Filesystem>,
        options: Option<&'static str>,
    ) -> Result<()> {
        self.run(Command::Mount {
            source: source.to_owned(),
            mountpoint: mountpoint.to_owned(),
            fs,
            options,
        })
    }

    /// Unmounts, falling back to a lazy unmount when the mountpoint is busy.
    pub fn unmount(&mut self, mountpoint: &Path) -> Result<()> {
        let normal = self.run(Command::Unmount {
            mountpoint: mountpoint.to_owned(),
            lazy: false,
        });
        if let Err(err) = normal {
            warn!("unmounting {} lazily after: {err}", mountpoint.display());
            self.run(Command::Unmount {
                mountpoint: mountpoint.to_owned(),
                lazy: true,
            })?;
        }
        Ok(())
    }

    pub fn format(&mut self, device: &Path, fs: Filesystem) -> Result<()> {
        if fs == Filesystem::Ubifs {
            return Err(Error::Logic("ubifs volumes are formatted through UBI"));
        }
        info!("formatting {} as {}", device.display(), fs.as_str());
        self.run(Command::Format {
            device: device.to_owned(),
            fs,
        })
    }

    /// Mounts `device`, archives the whole tree into `archive` and unmounts.
    ///
    /// `archive` must not live below `mountpoint`.
    pub fn backup_mountpoint(
        &mut self,
        archive: &Path,
        device: &Path,
        mountpoint: &Path,
        fs: Option<Filesystem>,
        options: &'static str,
    ) -> Result<()> {
        info!("archiving {} into {}", device.display(), archive.display());
        self.mount(device, mountpoint, fs, Some(options))?;

        let archived = self.run(Command::TarCreate {
            archive: archive.to_owned(),
            dir: mountpoint.to_owned(),
            members: None,
            preserve: true,
            compress: true,
        });
        if archived.is_err() {
            discard(archive).ok();
        }

        let unmounted = self.unmount(mountpoint);
        archived.and(unmounted)
    }

    /// Optionally formats `device`, then mounts it and unpacks `archive` into it.
    pub fn restore_mountpoint(
        &mut self,
        archive: &Path,
        device: &Path,
        mountpoint: &Path,
        fs: Filesystem,
        options: &'static str,
        format_first: bool,
    ) -> Result<()> {
        if format_first {
            self.format(device, fs)?;
        }
        info!("unpacking {} onto {}", archive.display(), device.display());
        self.mount(device, mountpoint, Some(fs), Some(options))?;

        let extracted = self.run(Command::TarExtract {
            archive: archive.to_owned(),
            dir: mountpoint.to_owned(),
        });

        let unmounted = self.unmount(mountpoint);
        extracted.and(unmounted)
    }

    /// Archives the UBI volume of a NAND filesystem partition.
    pub fn backup_ubi(&mut self, archive: &Path, partition: &Partition) -> Result<()> {
        let volume = partition
            .ubi_volume()
            .ok_or(Error::Logic("partition does not carry a UBI volume"))?;
        let registry = self.registry;
        let mountpoint = &registry.mounts().nand;

        self.ubi_attach(volume, partition.controller)?;
        let archived = self.backup_mountpoint(
            archive,
            &volume.mount_source(),
            mountpoint,
            Some(Filesystem::Ubifs),
            "ro",
        );
        let detached = self.ubi_detach(volume);
        archived.and(detached)
    }

    /// Recreates the UBI volume of a NAND filesystem partition from `archive`.
    pub fn restore_ubi(&mut self, archive: &Path, partition: &Partition) -> Result<()> {
        let volume = partition
            .ubi_volume()
            .ok_or(Error::Logic("partition does not carry a UBI volume"))?;
        let registry = self.registry;
        let mountpoint = &registry.mounts().nand;

        self.ubi_format_and_attach(partition)?;
        let restored = self.restore_mountpoint(
            archive,
            &volume.mount_source(),
            mountpoint,
            Filesystem::Ubifs,
            "rw",
            false,
        );
        let detached = self.ubi_detach(volume);
        restored.and(detached)
    }
}
