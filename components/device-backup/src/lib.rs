//! Partition backup, restore and flashing engine of the MID recovery.
//!
//! The engine drives external storage tools through an [`Executor`] and asks
//! the person in front of the device through an [`Operator`]. Both are
//! traits; the recovery runner implements them on top of real processes and
//! a terminal UI, the tests implement them on top of a simulated device.
//!
//! Every storage operation is a method on [`Device`], which owns the
//! executor and tracks the UBI attach state. A [`Registry`] describes the
//! hardware and is shared by reference.
//!
//! # Backup Archive Layout
//! A backup is a single gzip-compressed tar file named
//! ```text
//! Backup_<year>-<month>-<day>_<hour>-<min>-<sec>.mfw
//! ```
//! with unpadded fields. Its members are bare file names:
//!
//! | member       | content                                         |
//! |--------------|-------------------------------------------------|
//! | `zImage`     | raw dump of the kernel partition                |
//! | `nand.tgz`   | tar of the UBI `rootfs` volume, permissions kept |
//! | `system.tgz` | tar of the SD `system` partition                |
//! | `data.tgz`   | tar of the SD `data` partition                  |
//!
//! The kernel member is named after the kernel partition's canonical file
//! name. Members that are missing were not selected at backup time. Members
//! with unknown names are ignored on restore.
//!
//! # Failure Guarantees
//! * a failed backup leaves neither a scratch folder nor an archive behind
//! * a restore verifies every member before the first write; a failure
//!   before that point leaves the device unmodified
//! * UBI is never left attached and no mountpoint is left mounted when an
//!   operation returns, except inside a [`RootfsSession`]
//!
//! [`Registry`]: partition_registry::Registry

mod backup;
mod command;
mod device;
mod error;
mod executor;
mod maintenance;
mod mountpoint;
mod operator;
mod outcome;
mod partition_io;
mod partitions;
pub mod probe;
mod restore;
mod rom;
mod rootfs;
pub mod sdcard;
mod ubi;
mod workspace;

pub use crate::backup::{Selection, DATA_MEMBER, NAND_MEMBER, SYSTEM_MEMBER};
pub use crate::command::Command;
pub use crate::device::Device;
pub use crate::error::{Error, Result};
pub use crate::executor::{Executor, Status};
pub use crate::operator::Operator;
pub use crate::outcome::{DeviceState, Failure, Outcome, Step, Warning};
pub use crate::restore::{Member, Phase};
pub use crate::rom::{locate_rom, ImageFormat, RomImages, PATCH_FILTERS, ROOTFS_IMAGES};
pub use crate::rootfs::RootfsSession;
pub use crate::ubi::UbiState;
pub use crate::workspace::{archive_name, Scratch, ARCHIVE_FILTER};

pub use partition_registry;

#[cfg(test)]
mod tests;
