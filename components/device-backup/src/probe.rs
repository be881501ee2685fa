//! Read-only queries against sysfs and mounted filesystems.

use std::fs;
use std::path::Path;

use log::debug;
use nix::sys::statvfs::statvfs;
use partition_registry::SECTOR_SIZE;

/// Capacity in bytes of the block device whose sysfs directory is `sysfs`.
///
/// `None` when the size cannot be read or is reported as zero.
pub fn block_device_size(sysfs: &Path) -> Option<u64> {
    let path = sysfs.join("size");
    let sectors = fs::read_to_string(&path)
        .map_err(|err| debug!("cannot read {}: {err}", path.display()))
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()?;
    (sectors > 0).then(|| sectors * SECTOR_SIZE)
}

/// Bytes available to unprivileged users on the filesystem holding `path`.
pub fn free_space(path: &Path) -> Option<u64> {
    match statvfs(path) {
        Ok(stat) => Some(stat.block_size() as u64 * stat.blocks_available() as u64),
        Err(err) => {
            debug!("statvfs({}) failed: {err}", path.display());
            None
        }
    }
}

pub fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

pub fn exists(path: &Path) -> bool {
    !path.as_os_str().is_empty() && path.exists()
}
