//! Operation log.
//!
//! Every record at info level or above is appended to the log file with a
//! severity tag. Executed command lines and their output use dedicated
//! targets:
//!
//! | target      | written as            |
//! |-------------|-----------------------|
//! | [`COMMAND`] | `<CMMD> <command>`    |
//! | [`OUTPUT`]  | the output line as is |
//! | other       | `<INFO>`, `<WARN>` or `<ERRR>` tag |
//!
//! All records are also passed to a `pretty_env_logger` console logger,
//! filtered by `RUST_LOG`.

use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;
use device_backup::partition_registry::Mounts;
use log::{info, Level, LevelFilter, Log, Metadata, Record};

pub const COMMAND: &str = "command";
pub const OUTPUT: &str = "output";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogLocation {
    InternalSd,
    ExternalSd,
    RamDisk,
}

impl LogLocation {
    /// A log given on the command line lives on the internal card if it is
    /// below its mountpoint and on the external card otherwise.
    pub fn of(log: Option<&Path>, mounts: &Mounts) -> Self {
        match log {
            None => LogLocation::RamDisk,
            Some(path) if path.starts_with(&mounts.intsd) => LogLocation::InternalSd,
            Some(_) => LogLocation::ExternalSd,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            LogLocation::InternalSd => "internal SD card",
            LogLocation::ExternalSd => "external SD card",
            LogLocation::RamDisk => "ram-disk",
        }
    }
}

/// Starting folder of file choosers: the card holding the log, or `/`.
pub fn default_path(log: Option<&Path>, mounts: &Mounts) -> PathBuf {
    match log {
        Some(path) if path.starts_with(&mounts.intsd) => mounts.intsd.clone(),
        Some(path) if path.starts_with(&mounts.sdcard) => mounts.sdcard.clone(),
        _ => PathBuf::from("/"),
    }
}

struct OperationLog {
    file: Mutex<BufWriter<File>>,
    console: Box<dyn Log>,
}

impl OperationLog {
    fn append(&self, record: &Record) {
        let line = match (record.target(), record.level()) {
            (COMMAND, _) => format!("<CMMD> {}", record.args()),
            (OUTPUT, _) => record.args().to_string(),
            (_, Level::Error) => format!("<ERRR> {}", record.args()),
            (_, Level::Warn) => format!("<WARN> {}", record.args()),
            _ => format!("<INFO> {}", record.args()),
        };
        if let Ok(mut file) = self.file.lock() {
            // nowhere left to report a failing log
            let _ = writeln!(file, "{line}");
        }
    }
}

impl Log for OperationLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info || self.console.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if record.level() <= Level::Info {
            self.append(record);
        }
        if self.console.enabled(record.metadata()) {
            self.console.log(record);
        }
    }

    fn flush(&self) {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
        self.console.flush();
    }
}

/// Creates the log file and installs the global logger.
pub fn install(path: &Path, location: LogLocation) -> Result<()> {
    let file = File::create(path)?;
    let console = pretty_env_logger::formatted_builder()
        .parse_default_env()
        .build();
    let logger = OperationLog {
        file: Mutex::new(BufWriter::new(file)),
        console: Box::new(console),
    };
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(LevelFilter::Trace);

    info!("Begin log on {}.", location.describe());
    log::logger().flush();
    Ok(())
}

pub fn close() {
    info!("End log.");
    log::logger().flush();
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use device_backup::partition_registry::Registry;

    use super::*;

    #[test]
    fn log_location_follows_mountpoints() {
        let registry = Registry::mid703();
        let mounts = registry.mounts();
        assert_eq!(LogLocation::of(None, mounts), LogLocation::RamDisk);
        assert_eq!(
            LogLocation::of(Some(Path::new("/mnt/intsd/recovery.log")), mounts),
            LogLocation::InternalSd
        );
        assert_eq!(
            LogLocation::of(Some(Path::new("/mnt/sdcard/recovery.log")), mounts),
            LogLocation::ExternalSd
        );
        assert_eq!(
            LogLocation::of(Some(Path::new("/mnt/intsd2/recovery.log")), mounts),
            LogLocation::ExternalSd
        );
    }

    #[test]
    fn choosers_start_on_the_card_holding_the_log() {
        let registry = Registry::mid703();
        let mounts = registry.mounts();
        assert_eq!(
            default_path(Some(Path::new("/mnt/intsd/log.txt")), mounts),
            Path::new("/mnt/intsd")
        );
        assert_eq!(
            default_path(Some(Path::new("/mnt/sdcard/logs/log.txt")), mounts),
            Path::new("/mnt/sdcard")
        );
        assert_eq!(
            default_path(Some(Path::new("log.txt")), mounts),
            Path::new("/")
        );
        assert_eq!(default_path(None, mounts), Path::new("/"));
    }

    #[test]
    fn relocated_mounts_are_honoured() {
        let root = tempfile::tempdir().unwrap();
        let registry = Registry::mid703().relocate(root.path());
        let log = root.path().join("mnt/intsd/log.txt");
        assert_eq!(
            LogLocation::of(Some(&log), registry.mounts()),
            LogLocation::InternalSd
        );
        assert_eq!(
            default_path(Some(&log), registry.mounts()),
            root.path().join("mnt/intsd")
        );
    }
}
