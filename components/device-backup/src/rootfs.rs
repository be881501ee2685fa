use std::path::Path;

use log::{error, info, warn};
use partition_registry::{Filesystem, Role, UbiVolume};

use crate::command::Command;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::executor::Executor;

/// The device's root filesystem mounted read-write at the root mountpoint.
///
/// On NAND devices the UBI `rootfs` volume is the root and the SD `system`
/// partition is mounted at its `system` subdirectory. Without NAND the
/// `system` partition is the root.
///
/// [`RootfsSession::release`] tears everything down and reports failures.
/// Dropping an unreleased session tears down as well, logging failures.
pub struct RootfsSession<'d, 'r, E: Executor> {
    device: &'d mut Device<'r, E>,
    nand: bool,
    released: bool,
}

impl<'r, E: Executor> Device<'r, E> {
    /// Mounts the root tree. Either every step succeeds or the completed
    /// steps are undone before the error is returned.
    pub fn mount_rootfs(&mut self) -> Result<RootfsSession<'_, 'r, E>> {
        let registry = self.registry;
        let mounts = registry.mounts();
        let system = registry
            .fallback(Role::Rootfs)
            .ok_or(Error::PartitionMissing("system"))?;
        let rootfs = registry.lookup(Role::Rootfs);

        let volume = match rootfs.ubi_volume() {
            Some(volume) if registry.is_present(Role::Rootfs) => volume,
            _ => {
                info!("mounting 'system' as the root tree");
                self.mount(&system.device, &mounts.root, None, Some("rw"))?;
                return Ok(RootfsSession {
                    device: self,
                    nand: false,
                    released: false,
                });
            }
        };

        info!("mounting NAND as the root tree");
        self.ubi_attach(volume, rootfs.controller)?;

        if let Err(err) = self.mount(
            &volume.mount_source(),
            &mounts.root,
            Some(Filesystem::Ubifs),
            Some("rw"),
        ) {
            self.unwind_rootfs(volume, false);
            return Err(err);
        }

        let layers = self
            .run(Command::MakeDirectory {
                path: mounts.root_system(),
                parents: true,
            })
            .and_then(|()| self.mount(&system.device, &mounts.root_system(), None, Some("rw")));
        if let Err(err) = layers {
            self.unwind_rootfs(volume, true);
            return Err(err);
        }

        Ok(RootfsSession {
            device: self,
            nand: true,
            released: false,
        })
    }

    fn unwind_rootfs(&mut self, volume: &UbiVolume, mounted: bool) {
        let registry = self.registry;
        let root = &registry.mounts().root;
        if mounted {
            if let Err(err) = self.unmount(root) {
                error!("cannot unmount NAND while unwinding: {err}");
            }
        }
        if let Err(err) = self.ubi_detach(volume) {
            error!("cannot detach NAND while unwinding: {err}");
        }
    }
}

impl<'d, 'r, E: Executor> RootfsSession<'d, 'r, E> {
    /// Root of the mounted tree.
    pub fn root(&self) -> &'r Path {
        &self.device.registry().mounts().root
    }

    pub fn has_nand(&self) -> bool {
        self.nand
    }

    pub fn device(&mut self) -> &mut Device<'r, E> {
        self.device
    }

    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        let registry = self.device.registry();
        let mounts = registry.mounts();
        let mut errors = Vec::new();

        let system = if self.nand {
            mounts.root_system()
        } else {
            mounts.root.clone()
        };
        if let Err(err) = self.device.unmount(&system) {
            errors.push(err);
        }

        if self.nand {
            if let Err(err) = self.device.unmount(&mounts.root) {
                errors.push(err);
            }
            match registry.lookup(Role::Rootfs).ubi_volume() {
                Some(volume) => {
                    if let Err(err) = self.device.ubi_detach(volume) {
                        errors.push(err);
                    }
                }
                None => errors.push(Error::Logic("NAND session without a UBI volume")),
            }
        }

        Error::collect(errors)
    }
}

impl<E: Executor> Drop for RootfsSession<'_, '_, E> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        warn!("root tree was not released, tearing down");
        if let Err(err) = self.teardown() {
            error!("tearing down the root tree: {err}");
        }
    }
}
