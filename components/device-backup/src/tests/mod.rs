
mod backup;
mod maintenance;

use std::fs;
use std::path::{Path, PathBuf};

use crate::Command;

/// Files in `dir` whose name ends with `.<extension>`.
fn files_with_extension(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().map_or(false, |ext| ext == extension))
        .collect();
    files.sort();
    files
}

fn leftover_scratch(dir: &Path) -> bool {
    fs::read_dir(dir).unwrap().any(|entry| {
        entry
            .unwrap()
            .file_name()
            .to_string_lossy()
            .starts_with("tempdir.")
    })
}

fn destructive(commands: &[Command]) -> Vec<&Command> {
    commands.iter().filter(|c| c.is_destructive()).collect()
}
