use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDateTime, Timelike};
use log::{debug, warn};
use tempfile::TempDir;

use crate::error::Result;

pub const ARCHIVE_FILTER: &str = "*.mfw";

/// Per-operation temporary folder, `<parent>/tempdir.XXXXXXXX`.
///
/// Dropping it removes the folder as well; [`Scratch::close`] does the same
/// but reports failures.
pub struct Scratch {
    dir: TempDir,
}

impl Scratch {
    pub fn create(parent: &Path) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("tempdir.")
            .rand_bytes(8)
            .tempdir_in(parent)?;
        debug!("created scratch folder {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn member(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Names of the files directly inside the folder, sorted.
    pub fn members(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.dir.path())? {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_owned();
        self.dir.close()?;
        debug!("removed scratch folder {}", path.display());
        Ok(())
    }
}

pub fn archive_name(at: &NaiveDateTime) -> String {
    format!(
        "Backup_{}-{}-{}_{}-{}-{}.mfw",
        at.year(),
        at.month(),
        at.day(),
        at.hour(),
        at.minute(),
        at.second()
    )
}

/// Removes a partially written file. A missing file is fine.
pub(crate) fn discard(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("removed {}", path.display());
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => {
            warn!("cannot remove {}: {err}", path.display());
            Err(err.into())
        }
    }
}
