//! Static partition tables for the supported MID hardware variants.
//!
//! A [`Registry`] is built once at start-up from a hardware profile and is
//! never mutated afterwards. Everything else borrows it.
//!
//! # Storage classes
//! | class            | backup primitive         | restore primitive              |
//! |------------------|--------------------------|--------------------------------|
//! | `RawFlash`       | `nanddump` of the MTD    | `flash_eraseall` + `nandwrite` |
//! | `NandFilesystem` | UBI attach, mount, tar   | erase, UBI format, mount, untar |
//! | `BlockDevice`    | mount, tar               | format, mount, untar           |
//!
//! A raw flash partition whose MTD is missing on the running device is
//! mirrored at the same byte range of the internal SD card, one sector past
//! the partition table.

use std::path::{Path, PathBuf};

/// Size of a sector on every block device the recovery touches.
pub const SECTOR_SIZE: u64 = 512;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Role {
    Bootloader,
    BootArgs,
    Recovery,
    Kernel,
    Logo,
    Param,
    Rootfs,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Bootloader,
        Role::BootArgs,
        Role::Recovery,
        Role::Kernel,
        Role::Logo,
        Role::Param,
        Role::Rootfs,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Role::Bootloader => "bootloader",
            Role::BootArgs => "bootargs",
            Role::Recovery => "recovery",
            Role::Kernel => "kernel",
            Role::Logo => "logo",
            Role::Param => "parameters",
            Role::Rootfs => "rootfs",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Filesystem {
    Vfat,
    Ext2,
    Ext3,
    Ext4,
    Ubifs,
}

impl Filesystem {
    pub const fn as_str(self) -> &'static str {
        match self {
            Filesystem::Vfat => "vfat",
            Filesystem::Ext2 => "ext2",
            Filesystem::Ext3 => "ext3",
            Filesystem::Ext4 => "ext4",
            Filesystem::Ubifs => "ubifs",
        }
    }
}

/// The flash-translation volume that carries a NAND-resident filesystem.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UbiVolume {
    /// Logical UBI device number, reused for every attach.
    pub device: u32,
    pub volume: u32,
    pub name: String,
    /// `ubi_ctrl` node used by `ubiattach`/`ubidetach`.
    pub control: PathBuf,
    /// Prefix of the per-device node, `/dev/ubi` for `/dev/ubi0`.
    pub node_prefix: PathBuf,
}

impl UbiVolume {
    /// Source string handed to `mount`, e.g. `ubi0:rootfs`.
    pub fn mount_source(&self) -> PathBuf {
        PathBuf::from(format!("ubi{}:{}", self.device, self.name))
    }

    pub fn device_node(&self) -> PathBuf {
        let mut node = self.node_prefix.clone().into_os_string();
        node.push(self.device.to_string());
        PathBuf::from(node)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StorageClass {
    RawFlash,
    NandFilesystem(UbiVolume),
    BlockDevice(Filesystem),
}

/// One physical partition of a hardware profile.
///
/// A partition the profile does not define has an empty `name`, see
/// [`Partition::absent`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Partition {
    pub name: String,
    pub class: StorageClass,
    pub device: PathBuf,
    /// Exists only on hardware that actually carries the partition.
    pub presence: PathBuf,
    /// MTD number used by the flash tools.
    pub controller: u32,
    pub offset: u64,
    pub size: u64,
    pub filename: String,
    pub pattern: String,
}

impl Partition {
    pub fn absent() -> Self {
        Self {
            name: String::new(),
            class: StorageClass::RawFlash,
            device: PathBuf::new(),
            presence: PathBuf::new(),
            controller: 0,
            offset: 0,
            size: 0,
            filename: String::new(),
            pattern: String::new(),
        }
    }

    pub fn is_defined(&self) -> bool {
        !self.name.is_empty()
    }

    pub fn is_present(&self) -> bool {
        self.is_defined() && self.presence.exists()
    }

    pub fn ubi_volume(&self) -> Option<&UbiVolume> {
        match &self.class {
            StorageClass::NandFilesystem(volume) => Some(volume),
            _ => None,
        }
    }

    pub fn filesystem(&self) -> Option<Filesystem> {
        match &self.class {
            StorageClass::NandFilesystem(_) => Some(Filesystem::Ubifs),
            StorageClass::BlockDevice(fs) => Some(*fs),
            StorageClass::RawFlash => None,
        }
    }

    fn block(name: &str, device: &str, presence: &str, fs: Filesystem) -> Self {
        Self {
            name: name.into(),
            class: StorageClass::BlockDevice(fs),
            device: device.into(),
            presence: presence.into(),
            ..Self::absent()
        }
    }

    fn relocate(mut self, root: &Path) -> Self {
        if !self.is_defined() {
            return self;
        }
        self.device = rebase(root, &self.device);
        self.presence = rebase(root, &self.presence);
        if let StorageClass::NandFilesystem(volume) = &mut self.class {
            volume.control = rebase(root, &volume.control);
            volume.node_prefix = rebase(root, &volume.node_prefix);
        }
        self
    }
}

/// Internal SD card: the whole device and its four partitions.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SdCard {
    pub device: PathBuf,
    pub presence: PathBuf,
    pub user_area: Partition,
    pub cache: Partition,
    pub data: Partition,
    pub system: Partition,
}

impl SdCard {
    fn mmcblk0() -> Self {
        Self {
            device: "/dev/mmcblk0".into(),
            presence: "/sys/block/mmcblk0".into(),
            user_area: Partition::block(
                "user area",
                "/dev/mmcblk0p1",
                "/sys/block/mmcblk0/mmcblk0p1",
                Filesystem::Vfat,
            ),
            cache: Partition::block(
                "cache",
                "/dev/mmcblk0p2",
                "/sys/block/mmcblk0/mmcblk0p2",
                Filesystem::Ext4,
            ),
            data: Partition::block(
                "data",
                "/dev/mmcblk0p3",
                "/sys/block/mmcblk0/mmcblk0p3",
                Filesystem::Ext4,
            ),
            system: Partition::block(
                "system",
                "/dev/mmcblk0p4",
                "/sys/block/mmcblk0/mmcblk0p4",
                Filesystem::Ext4,
            ),
        }
    }

    fn relocate(self, root: &Path) -> Self {
        Self {
            device: rebase(root, &self.device),
            presence: rebase(root, &self.presence),
            user_area: self.user_area.relocate(root),
            cache: self.cache.relocate(root),
            data: self.data.relocate(root),
            system: self.system.relocate(root),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Mounts {
    pub nand: PathBuf,
    pub intsd: PathBuf,
    pub cache: PathBuf,
    pub data: PathBuf,
    pub system: PathBuf,
    pub sdcard: PathBuf,
    pub root: PathBuf,
    pub tmp: PathBuf,
}

impl Mounts {
    fn standard() -> Self {
        Self {
            nand: "/mnt/nand".into(),
            intsd: "/mnt/intsd".into(),
            cache: "/mnt/cache".into(),
            data: "/mnt/data".into(),
            system: "/mnt/system".into(),
            sdcard: "/mnt/sdcard".into(),
            root: "/mnt/root".into(),
            tmp: "/mnt/tmp".into(),
        }
    }

    /// Where `/system` lands inside the composed root tree on NAND devices.
    pub fn root_system(&self) -> PathBuf {
        self.root.join("system")
    }

    pub fn dalvik_cache(&self) -> PathBuf {
        self.data.join("dalvik-cache")
    }

    pub fn all(&self) -> [&Path; 8] {
        [
            &self.nand,
            &self.intsd,
            &self.cache,
            &self.data,
            &self.system,
            &self.sdcard,
            &self.root,
            &self.tmp,
        ]
    }

    fn relocate(self, root: &Path) -> Self {
        Self {
            nand: rebase(root, &self.nand),
            intsd: rebase(root, &self.intsd),
            cache: rebase(root, &self.cache),
            data: rebase(root, &self.data),
            system: rebase(root, &self.system),
            sdcard: rebase(root, &self.sdcard),
            root: rebase(root, &self.root),
            tmp: rebase(root, &self.tmp),
        }
    }
}

/// Helper scripts shipped on the recovery ram-disk.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Scripts {
    pub partition: PathBuf,
    pub fix_permissions: PathBuf,
    pub apply_patch: PathBuf,
}

impl Scripts {
    fn standard() -> Self {
        Self {
            partition: "/scripts/partition.sh".into(),
            fix_permissions: "/scripts/fixperms.sh".into(),
            apply_patch: "/scripts/applypatch.sh".into(),
        }
    }

    fn relocate(self, root: &Path) -> Self {
        Self {
            partition: rebase(root, &self.partition),
            fix_permissions: rebase(root, &self.fix_permissions),
            apply_patch: rebase(root, &self.apply_patch),
        }
    }
}

struct FlashEntry {
    role: Role,
    name: &'static str,
    device: &'static str,
    presence: &'static str,
    controller: u32,
    offset: u64,
    size: u64,
    filename: &'static str,
    pattern: &'static str,
}

const fn raw(
    role: Role,
    name: &'static str,
    controller: u32,
    offset: u64,
    size: u64,
    filename: &'static str,
    pattern: &'static str,
) -> FlashEntry {
    FlashEntry {
        role,
        name,
        device: MTD_DEVICES[controller as usize],
        presence: MTD_BLOCKS[controller as usize],
        controller,
        offset,
        size,
        filename,
        pattern,
    }
}

const MTD_DEVICES: [&str; 7] = [
    "/dev/mtd0",
    "/dev/mtd1",
    "/dev/mtd2",
    "/dev/mtd3",
    "/dev/mtd4",
    "/dev/mtd5",
    "/dev/mtd6",
];

const MTD_BLOCKS: [&str; 7] = [
    "/sys/block/mtdblock0",
    "/sys/block/mtdblock1",
    "/sys/block/mtdblock2",
    "/sys/block/mtdblock3",
    "/sys/block/mtdblock4",
    "/sys/block/mtdblock5",
    "/sys/block/mtdblock6",
];

// rootfs spans the rest of the chip, its size is never used
const MID703: [FlashEntry; 7] = [
    raw(Role::Bootloader, "bootloader", 6, 0x0000_0000, 0x0008_0000, "u-boot.bin", "u-boot.bin"),
    raw(Role::BootArgs, "bootargs", 0, 0x0008_0000, 0x0008_0000, "u-boot.arg", "u-boot.arg"),
    raw(Role::Recovery, "recovery", 1, 0x0010_0000, 0x0080_0000, "recovery", "recovery"),
    raw(Role::Kernel, "kernel", 2, 0x0090_0000, 0x0060_0000, "zImage", "zImage"),
    raw(Role::Logo, "logo", 3, 0x00F0_0000, 0x0040_0000, "logo.bmp", "*.bmp"),
    raw(Role::Param, "param", 5, 0x0130_0000, 0x0020_0000, "param", "param"),
    raw(Role::Rootfs, "rootfs", 4, 0x0150_0000, 0, "", ""),
];

pub const UBI_DEVICE: u32 = 0;
pub const UBI_VOLUME: u32 = 0;
pub const UBI_VOLUME_NAME: &str = "rootfs";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Target {
    Mid703,
    Pc,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Registry {
    target: Target,
    partitions: [Partition; 7],
    sd: SdCard,
    mounts: Mounts,
    scripts: Scripts,
}

impl Registry {
    pub fn new(target: Target) -> Self {
        match target {
            Target::Mid703 => Self::mid703(),
            Target::Pc => Self::pc(),
        }
    }

    /// Coby MID703: every flash partition, rootfs on UBI.
    pub fn mid703() -> Self {
        let mut registry = Self::bare(Target::Mid703);
        for entry in MID703.iter() {
            let class = if entry.role == Role::Rootfs {
                StorageClass::NandFilesystem(UbiVolume {
                    device: UBI_DEVICE,
                    volume: UBI_VOLUME,
                    name: UBI_VOLUME_NAME.into(),
                    control: "/dev/ubi_ctrl".into(),
                    node_prefix: "/dev/ubi".into(),
                })
            } else {
                StorageClass::RawFlash
            };
            registry.partitions[entry.role.index()] = Partition {
                name: entry.name.into(),
                class,
                device: entry.device.into(),
                presence: entry.presence.into(),
                controller: entry.controller,
                offset: entry.offset,
                size: entry.size,
                filename: entry.filename.into(),
                pattern: entry.pattern.into(),
            };
        }
        registry
    }

    /// Desktop build: no flash chip, only the internal SD card layout.
    pub fn pc() -> Self {
        Self::bare(Target::Pc)
    }

    fn bare(target: Target) -> Self {
        Self {
            target,
            partitions: core::array::from_fn(|_| Partition::absent()),
            sd: SdCard::mmcblk0(),
            mounts: Mounts::standard(),
            scripts: Scripts::standard(),
        }
    }

    /// Moves every device, sysfs, mount and script path below `root`.
    pub fn relocate(self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let Self {
            target,
            partitions,
            sd,
            mounts,
            scripts,
        } = self;
        Self {
            target,
            partitions: partitions.map(|p| p.relocate(root)),
            sd: sd.relocate(root),
            mounts: mounts.relocate(root),
            scripts: scripts.relocate(root),
        }
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn lookup(&self, role: Role) -> &Partition {
        &self.partitions[role.index()]
    }

    pub fn is_present(&self, role: Role) -> bool {
        self.lookup(role).is_present()
    }

    /// SD-resident storage standing in for a NAND filesystem role.
    pub fn fallback(&self, role: Role) -> Option<&Partition> {
        match role {
            Role::Rootfs => Some(&self.sd.system),
            _ => None,
        }
    }

    pub fn sd(&self) -> &SdCard {
        &self.sd
    }

    pub fn mounts(&self) -> &Mounts {
        &self.mounts
    }

    pub fn scripts(&self) -> &Scripts {
        &self.scripts
    }
}

fn rebase(root: &Path, path: &Path) -> PathBuf {
    if path.as_os_str().is_empty() {
        return PathBuf::new();
    }
    root.join(path.strip_prefix("/").unwrap_or(path))
}
