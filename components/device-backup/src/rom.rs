use std::path::{Path, PathBuf};

use log::{info, warn};
use partition_registry::{Registry, Role};

use crate::command::Command;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::operator::Operator;
use crate::outcome::{Failure, Outcome, Warning};

/// Root filesystem image names looked up in a ROM folder, first match wins.
pub const ROOTFS_IMAGES: [&str; 11] = [
    "utv210_root.tgz",
    "utv210_root.tar",
    "rootfs.tgz",
    "root.tgz",
    "rootfs.tar",
    "root.tar",
    "utv210_rootfs.tgz",
    "utv210_rootfs.tar",
    "system.tgz",
    "system.tar",
    "update.zip",
];

pub const PATCH_FILTERS: [&str; 3] = ["*.tgz", "*.tar", "*.zip"];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImageFormat {
    Tar,
    Zip,
}

impl ImageFormat {
    pub fn detect(image: &Path) -> Self {
        match image.extension() {
            Some(ext) if ext.eq_ignore_ascii_case("zip") => ImageFormat::Zip,
            _ => ImageFormat::Tar,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RomImages {
    pub kernel: Option<PathBuf>,
    pub rootfs: PathBuf,
    pub format: ImageFormat,
}

/// Finds the kernel and root filesystem images in a ROM folder.
///
/// A missing kernel is a warning; a missing root image is an error.
pub fn locate_rom(registry: &Registry, dir: &Path, outcome: &mut Outcome) -> Result<RomImages> {
    let kernel = registry.lookup(Role::Kernel);
    let kernel = if kernel.is_defined() {
        let image = dir.join(&kernel.filename);
        if image.is_file() {
            Some(image)
        } else {
            outcome.warn(Warning::MissingImage(kernel.filename.clone()));
            None
        }
    } else {
        None
    };

    let rootfs = ROOTFS_IMAGES
        .iter()
        .map(|name| dir.join(name))
        .find(|image| image.is_file())
        .ok_or_else(|| Error::ImageNotFound("main update archive".into()))?;

    Ok(RomImages {
        kernel,
        format: ImageFormat::detect(&rootfs),
        rootfs,
    })
}

impl<'r, E: Executor> Device<'r, E> {
    /// Installs a ROM folder: kernel, fresh NAND volume, formatted `system`
    /// and the root image unpacked over both.
    pub fn flash_rom(&mut self, ui: &mut impl Operator) -> Result<Outcome, Failure> {
        let mut outcome = Outcome::default();

        ui.say("Select a folder where the ROM is stored.");
        if !ui.confirm("Flash a ROM?") {
            return Err(Failure::unmodified(Error::Cancelled));
        }
        let dir = ui
            .choose_directory(self.home())
            .ok_or_else(|| Failure::unmodified(Error::Cancelled))?;

        let images = locate_rom(self.registry, &dir, &mut outcome).map_err(Failure::unmodified)?;
        if images.kernel.is_none() && !outcome.warnings().is_empty() {
            ui.say("WARNING: Kernel not found in ROM. Your device has not yet been modified.");
            if !ui.confirm("Continue without flashing a kernel?") {
                return Err(Failure::unmodified(Error::Cancelled));
            }
        }

        self.install_rom(ui, &images, &mut outcome)
            .map_err(Failure::inconsistent)?;
        Ok(outcome)
    }

    fn install_rom(
        &mut self,
        ui: &mut impl Operator,
        images: &RomImages,
        outcome: &mut Outcome,
    ) -> Result<()> {
        let registry = self.registry;
        let system = &registry.sd().system;

        match &images.kernel {
            Some(image) => {
                ui.say("* Preparing to flash kernel...");
                let flashed = self.restore_partition(registry.lookup(Role::Kernel), image);
                outcome.track("kernel", flashed)?;
            }
            None => outcome.skip("kernel", "no kernel image"),
        }

        let rootfs = registry.lookup(Role::Rootfs);
        match rootfs.ubi_volume() {
            Some(volume) if rootfs.is_present() => {
                ui.say("* Preparing NAND...");
                let prepared = self
                    .ubi_format_and_attach(rootfs)
                    .and_then(|()| self.ubi_detach(volume));
                outcome.track("nand", prepared)?;
            }
            _ => outcome.skip("nand", "no NAND"),
        }

        ui.say("* Formatting 'system' partition...");
        let fs = system
            .filesystem()
            .ok_or(Error::Logic("'system' partition has no filesystem"))?;
        outcome.track("format system", self.format(&system.device, fs))?;

        ui.say("* Installing system...");
        let installed = self.in_rootfs(ui, |device, root| {
            device.extract_image(&images.rootfs, images.format, root)
        });
        outcome.track("install", installed)
    }

    /// Unpacks a patch into the root tree and runs the patch script on it.
    pub fn apply_patch(&mut self, ui: &mut impl Operator) -> Result<Outcome, Failure> {
        let mut outcome = Outcome::default();
        let script = self.registry.scripts().apply_patch.clone();

        ui.say("Select the patch to apply.");
        if !ui.confirm("Apply a patch?") {
            return Err(Failure::unmodified(Error::Cancelled));
        }
        let patch = ui
            .choose_file(self.home(), &PATCH_FILTERS)
            .ok_or_else(|| Failure::unmodified(Error::Cancelled))?;
        let format = ImageFormat::detect(&patch);

        ui.say("* Mounting partition(s)...");
        let mut session = self.mount_rootfs().map_err(Failure::unmodified)?;
        let root = session.root();

        ui.say("* Extracting patch...");
        let applied = session
            .device()
            .extract_image(&patch, format, root)
            .and_then(|()| {
                ui.say("* Applying patch...");
                session.device().run(Command::Script {
                    script,
                    args: vec![root.to_string_lossy().into_owned()],
                })
            });

        ui.say("* Unmounting partition(s)...");
        let released = session.release();
        outcome
            .track("patch", applied.and(released))
            .map_err(Failure::inconsistent)?;
        Ok(outcome)
    }

    pub fn fix_permissions(&mut self, ui: &mut impl Operator) -> Result<Outcome, Failure> {
        let mut outcome = Outcome::default();
        if !ui.confirm("Fix ROM permissions?") {
            return Err(Failure::unmodified(Error::Cancelled));
        }

        ui.say("* Mounting partition(s)...");
        let mut session = self.mount_rootfs().map_err(Failure::unmodified)?;
        let fixed = session.device().run_fix_permissions();
        ui.say("* Unmounting partition(s)...");
        let released = session.release();
        outcome
            .track("fix permissions", fixed.and(released))
            .map_err(Failure::inconsistent)?;
        Ok(outcome)
    }

    /// Runs `work` with the root tree mounted. The tree is released whether
    /// or not `work` succeeds.
    fn in_rootfs<F>(&mut self, ui: &mut impl Operator, work: F) -> Result<()>
    where
        F: FnOnce(&mut Device<'r, E>, &Path) -> Result<()>,
    {
        ui.say("* Mounting partition(s)...");
        let mut session = self.mount_rootfs()?;
        let root = session.root();
        let worked = work(session.device(), root);
        ui.say("* Unmounting partition(s)...");
        let released = session.release();
        worked.and(released)
    }

    fn extract_image(&mut self, image: &Path, format: ImageFormat, root: &Path) -> Result<()> {
        info!("unpacking {} into {}", image.display(), root.display());
        match format {
            ImageFormat::Tar => self.run(Command::TarExtract {
                archive: image.to_owned(),
                dir: root.to_owned(),
            }),
            ImageFormat::Zip => {
                let unzipped = self.run(Command::Unzip {
                    archive: image.to_owned(),
                    dir: root.to_owned(),
                });
                if let Err(err) = &unzipped {
                    warn!("fixing permissions after failed unzip: {err}");
                }
                unzipped.and(self.run_fix_permissions())
            }
        }
    }

    fn run_fix_permissions(&mut self) -> Result<()> {
        self.run(Command::Script {
            script: self.registry.scripts().fix_permissions.clone(),
            args: Vec::new(),
        })
    }
}
