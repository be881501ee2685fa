use core::fmt;
use std::path::PathBuf;

use partition_registry::Filesystem;

/// A storage tool invocation.
///
/// Commands stay structured until an [`Executor`](crate::Executor) turns them
/// into a process; `argv` is the canonical rendering.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    /// `members: None` archives the whole of `dir`.
    TarCreate {
        archive: PathBuf,
        dir: PathBuf,
        members: Option<Vec<String>>,
        preserve: bool,
        compress: bool,
    },
    TarExtract {
        archive: PathBuf,
        dir: PathBuf,
    },
    Unzip {
        archive: PathBuf,
        dir: PathBuf,
    },
    Mount {
        source: PathBuf,
        mountpoint: PathBuf,
        fs: Option<Filesystem>,
        options: Option<&'static str>,
    },
    Unmount {
        mountpoint: PathBuf,
        lazy: bool,
    },
    Format {
        device: PathBuf,
        fs: Filesystem,
    },
    /// Copies `count` blocks starting at block `skip` of `device` into `file`.
    DiskRead {
        device: PathBuf,
        file: PathBuf,
        block_size: u64,
        count: u64,
        skip: u64,
    },
    /// Copies `file` into `device` starting at block `seek`.
    DiskWrite {
        file: PathBuf,
        device: PathBuf,
        block_size: u64,
        count: u64,
        seek: u64,
    },
    FlashErase {
        device: PathBuf,
    },
    NandDump {
        device: PathBuf,
        file: PathBuf,
    },
    NandWrite {
        device: PathBuf,
        file: PathBuf,
    },
    UbiAttach {
        control: PathBuf,
        controller: u32,
        device: u32,
    },
    /// `size: None` fills the remaining space of the UBI device.
    UbiMakeVolume {
        node: PathBuf,
        volume: u32,
        name: String,
        size: Option<u64>,
    },
    UbiDetach {
        control: PathBuf,
        device: u32,
    },
    MakeDirectory {
        path: PathBuf,
        parents: bool,
    },
    /// Removes everything below `dir`, keeping `dir` itself.
    Clear {
        dir: PathBuf,
    },
    Script {
        script: PathBuf,
        args: Vec<String>,
    },
    KernelMessages,
    Reboot,
}

impl Command {
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Argv::default();
        match self {
            Command::TarCreate {
                archive,
                dir,
                members,
                preserve,
                compress,
            } => {
                let mut flags = String::from("-c");
                if *preserve {
                    flags.push('p');
                }
                if *compress {
                    flags.push('z');
                }
                flags.push_str("vf");
                argv.push("tar").push(flags).path(archive).push("-C").path(dir);
                match members {
                    None => {
                        argv.push(".");
                    }
                    Some(members) if members.is_empty() => {
                        argv.push("-T").push("/dev/null");
                    }
                    Some(members) => {
                        for member in members {
                            argv.push(member);
                        }
                    }
                }
            }
            Command::TarExtract { archive, dir } => {
                argv.push("tar").push("-xvf").path(archive).push("-C").path(dir);
            }
            Command::Unzip { archive, dir } => {
                argv.push("unzip").push("-o").path(archive).push("-d").path(dir);
            }
            Command::Mount {
                source,
                mountpoint,
                fs,
                options,
            } => {
                argv.push("mount");
                if let Some(fs) = fs {
                    argv.push("-t").push(fs.as_str());
                }
                if let Some(options) = options {
                    argv.push("-o").push(*options);
                }
                argv.path(source).path(mountpoint);
            }
            Command::Unmount { mountpoint, lazy } => {
                argv.push("umount");
                if *lazy {
                    argv.push("-l");
                }
                argv.path(mountpoint);
            }
            Command::Format { device, fs } => {
                let tool = match fs {
                    Filesystem::Vfat => "mkdosfs",
                    Filesystem::Ext2 => "mkfs.ext2",
                    Filesystem::Ext3 => "mkfs.ext3",
                    Filesystem::Ext4 => "mkfs.ext4",
                    Filesystem::Ubifs => "mkfs.ubifs",
                };
                argv.push(tool).path(device);
            }
            Command::DiskRead {
                device,
                file,
                block_size,
                count,
                skip,
            } => {
                argv.push("dd")
                    .push(format!("if={}", device.display()))
                    .push(format!("of={}", file.display()))
                    .push(format!("bs={block_size}"))
                    .push(format!("count={count}"));
                if *skip != 0 {
                    argv.push(format!("skip={skip}"));
                }
            }
            Command::DiskWrite {
                file,
                device,
                block_size,
                count,
                seek,
            } => {
                argv.push("dd")
                    .push(format!("if={}", file.display()))
                    .push(format!("of={}", device.display()))
                    .push(format!("bs={block_size}"))
                    .push(format!("count={count}"));
                if *seek != 0 {
                    argv.push(format!("seek={seek}"));
                }
            }
            Command::FlashErase { device } => {
                argv.push("flash_eraseall").push("-q").path(device);
            }
            Command::NandDump { device, file } => {
                // skip OOB data and bad blocks
                argv.push("nanddump")
                    .push("-f")
                    .path(file)
                    .push("-o")
                    .push("-b")
                    .path(device);
            }
            Command::NandWrite { device, file } => {
                argv.push("nandwrite").path(device).path(file).push("-p").push("-q");
            }
            Command::UbiAttach {
                control,
                controller,
                device,
            } => {
                argv.push("ubiattach")
                    .path(control)
                    .push("-m")
                    .push(controller.to_string())
                    .push("-d")
                    .push(device.to_string());
            }
            Command::UbiMakeVolume {
                node,
                volume,
                name,
                size,
            } => {
                argv.push("ubimkvol")
                    .path(node)
                    .push("-n")
                    .push(volume.to_string())
                    .push("-N")
                    .push(name);
                match size {
                    Some(size) => argv.push("-s").push(size.to_string()),
                    None => argv.push("-m"),
                };
            }
            Command::UbiDetach { control, device } => {
                argv.push("ubidetach")
                    .path(control)
                    .push("-d")
                    .push(device.to_string());
            }
            Command::MakeDirectory { path, parents } => {
                argv.push("mkdir");
                if *parents {
                    argv.push("-p");
                }
                argv.path(path);
            }
            Command::Clear { dir } => {
                argv.push("find")
                    .path(dir)
                    .push("-mindepth")
                    .push("1")
                    .push("-delete");
            }
            Command::Script { script, args } => {
                argv.push("sh").path(script);
                for arg in args {
                    argv.push(arg);
                }
            }
            Command::KernelMessages => {
                argv.push("dmesg");
            }
            Command::Reboot => {
                argv.push("reboot").push("-f");
            }
        }
        argv.0
    }

    /// Commands that write to device storage outside of a mounted tree.
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            Command::Format { .. }
                | Command::DiskWrite { .. }
                | Command::FlashErase { .. }
                | Command::NandWrite { .. }
                | Command::UbiMakeVolume { .. }
                | Command::Clear { .. }
                | Command::Script { .. }
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv().join(" "))
    }
}

#[derive(Default)]
struct Argv(Vec<String>);

impl Argv {
    fn push(&mut self, arg: impl Into<String>) -> &mut Self {
        self.0.push(arg.into());
        self
    }

    fn path(&mut self, path: &std::path::Path) -> &mut Self {
        self.push(path.to_string_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(command: Command) -> String {
        command.to_string()
    }

    #[test]
    fn tar_create_flags() {
        assert_eq!(
            line(Command::TarCreate {
                archive: "/tmp/t/system.tgz".into(),
                dir: "/mnt/system".into(),
                members: None,
                preserve: true,
                compress: true,
            }),
            "tar -cpzvf /tmp/t/system.tgz -C /mnt/system ."
        );
        assert_eq!(
            line(Command::TarCreate {
                archive: "/b.mfw".into(),
                dir: "/tmp/t".into(),
                members: Some(vec!["zImage".into(), "data.tgz".into()]),
                preserve: false,
                compress: true,
            }),
            "tar -czvf /b.mfw -C /tmp/t zImage data.tgz"
        );
        assert_eq!(
            line(Command::TarCreate {
                archive: "/b.mfw".into(),
                dir: "/tmp/t".into(),
                members: Some(Vec::new()),
                preserve: false,
                compress: false,
            }),
            "tar -cvf /b.mfw -C /tmp/t -T /dev/null"
        );
    }

    #[test]
    fn sd_fallback_dd() {
        assert_eq!(
            line(Command::DiskRead {
                device: "/dev/mmcblk0".into(),
                file: "/t/zImage".into(),
                block_size: 512,
                count: 12288,
                skip: 18433,
            }),
            "dd if=/dev/mmcblk0 of=/t/zImage bs=512 count=12288 skip=18433"
        );
        assert_eq!(
            line(Command::DiskWrite {
                file: "/t/zImage".into(),
                device: "/dev/mmcblk0".into(),
                block_size: 512,
                count: 12288,
                seek: 18433,
            }),
            "dd if=/t/zImage of=/dev/mmcblk0 bs=512 count=12288 seek=18433"
        );
    }

    #[test]
    fn flash_tools() {
        assert_eq!(
            line(Command::NandDump {
                device: "/dev/mtd2".into(),
                file: "/t/zImage".into()
            }),
            "nanddump -f /t/zImage -o -b /dev/mtd2"
        );
        assert_eq!(
            line(Command::NandWrite {
                device: "/dev/mtd2".into(),
                file: "/t/zImage".into()
            }),
            "nandwrite /dev/mtd2 /t/zImage -p -q"
        );
        assert_eq!(
            line(Command::UbiAttach {
                control: "/dev/ubi_ctrl".into(),
                controller: 4,
                device: 0
            }),
            "ubiattach /dev/ubi_ctrl -m 4 -d 0"
        );
        assert_eq!(
            line(Command::UbiMakeVolume {
                node: "/dev/ubi0".into(),
                volume: 0,
                name: "rootfs".into(),
                size: None
            }),
            "ubimkvol /dev/ubi0 -n 0 -N rootfs -m"
        );
    }

    #[test]
    fn mount_options() {
        assert_eq!(
            line(Command::Mount {
                source: "ubi0:rootfs".into(),
                mountpoint: "/mnt/nand".into(),
                fs: Some(Filesystem::Ubifs),
                options: Some("ro"),
            }),
            "mount -t ubifs -o ro ubi0:rootfs /mnt/nand"
        );
        assert_eq!(
            line(Command::Unmount {
                mountpoint: "/mnt/nand".into(),
                lazy: true
            }),
            "umount -l /mnt/nand"
        );
    }

    #[test]
    fn reads_are_not_destructive() {
        assert!(!Command::NandDump {
            device: "/dev/mtd2".into(),
            file: "/t/k".into()
        }
        .is_destructive());
        assert!(!Command::TarExtract {
            archive: "/b.mfw".into(),
            dir: "/t".into()
        }
        .is_destructive());
        assert!(Command::FlashErase {
            device: "/dev/mtd2".into()
        }
        .is_destructive());
    }
}
