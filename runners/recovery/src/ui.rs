use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use device_backup::Operator;
use dialoguer::{Confirm, Input, Select};
use log::{info, warn};

const SELECT_FOLDER: &str = "[Select this folder]";
const PARENT: &str = "..";

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum ConfirmMode {
    #[default]
    Interactive,
    AcceptAll,
    RejectAll,
}

/// Terminal front end of the recovery.
pub struct Console {
    confirm: ConfirmMode,
}

impl Console {
    pub fn new(confirm: ConfirmMode) -> Self {
        Self { confirm }
    }

    pub fn pause(&mut self) {
        let answer = Input::<String>::new()
            .with_prompt("Press Enter to return to the menu")
            .allow_empty(true)
            .interact_text();
        if let Err(err) = answer {
            warn!("Failed to read from terminal: {err}");
        }
    }

    /// Walks the tree from `start`. In folder mode files are hidden and the
    /// current folder can be picked; otherwise a file matching `filters` is.
    fn browse(&mut self, start: &Path, filters: Option<&[&str]>) -> Option<PathBuf> {
        let mut dir = start.to_owned();
        loop {
            let listing = match Listing::read(&dir, filters) {
                Ok(listing) => listing,
                Err(err) => {
                    warn!("Failed to list {}: {err}", dir.display());
                    self.say(&format!("Unable to open folder {}.", dir.display()));
                    return None;
                }
            };

            let mut items = Vec::new();
            if filters.is_none() {
                items.push(SELECT_FOLDER.to_owned());
            }
            items.push(PARENT.to_owned());
            let first_dir = items.len();
            items.extend(listing.dirs.iter().map(|name| format!("{name}/")));
            let first_file = items.len();
            items.extend(listing.files.iter().cloned());

            let title = dir.display().to_string();
            let index = self.choose(&title, &items)?;
            if filters.is_none() && index == 0 {
                return Some(dir);
            } else if index < first_dir {
                if let Some(parent) = dir.parent() {
                    dir = parent.to_owned();
                }
            } else if index < first_file {
                dir.push(&listing.dirs[index - first_dir]);
            } else {
                return Some(dir.join(&listing.files[index - first_file]));
            }
        }
    }
}

impl Operator for Console {
    fn say(&mut self, message: &str) {
        println!("{message}");
    }

    fn confirm(&mut self, prompt: &str) -> bool {
        let confirmed = match self.confirm {
            ConfirmMode::AcceptAll => true,
            ConfirmMode::RejectAll => false,
            ConfirmMode::Interactive => Confirm::new()
                .with_prompt(prompt)
                .default(false)
                .interact()
                .unwrap_or_else(|err| {
                    warn!("Failed to read from terminal: {err}");
                    false
                }),
        };
        info!("Answering {prompt:?} with {confirmed}");
        confirmed
    }

    fn choose_directory(&mut self, start: &Path) -> Option<PathBuf> {
        self.browse(start, None)
    }

    fn choose_file(&mut self, start: &Path, filters: &[&str]) -> Option<PathBuf> {
        self.browse(start, Some(filters))
    }

    fn choose(&mut self, title: &str, options: &[String]) -> Option<usize> {
        Select::new()
            .with_prompt(title)
            .items(options)
            .default(0)
            .interact_opt()
            .unwrap_or_else(|err| {
                warn!("Failed to read from terminal: {err}");
                None
            })
    }

    fn present_file(&mut self, path: &Path) {
        match fs::read(path) {
            Ok(content) => println!("{}", String::from_utf8_lossy(&content)),
            Err(err) => self.say(&format!("Unable to read {}: {err}", path.display())),
        }
        self.pause();
    }
}

#[derive(Debug, Default, PartialEq)]
struct Listing {
    dirs: Vec<String>,
    files: Vec<String>,
}

impl Listing {
    /// Without `filters` only folders are listed. An empty filter list
    /// matches every file.
    fn read(dir: &Path, filters: Option<&[&str]>) -> io::Result<Self> {
        let mut listing = Self::default();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.path().is_dir() {
                listing.dirs.push(name);
            } else if let Some(filters) = filters {
                if filters.is_empty() || filters.iter().any(|filter| matches(filter, &name)) {
                    listing.files.push(name);
                }
            }
        }
        listing.dirs.sort();
        listing.files.sort();
        Ok(listing)
    }
}

/// Glob match supporting `*` and `?`, ignoring ASCII case.
fn matches(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();
    let name: Vec<char> = name.chars().map(|c| c.to_ascii_lowercase()).collect();

    let (mut p, mut n) = (0, 0);
    // position of the last `*` and the name index it is currently covering up to
    let mut star = None;
    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                star = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match star {
                Some((star_p, star_n)) => {
                    star = Some((star_p, star_n + 1));
                    p = star_p + 1;
                    n = star_n + 1;
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matching() {
        assert!(matches("*.mfw", "Backup_2011-1-1_0-0-0.mfw"));
        assert!(matches("*.zip", "UPDATE.ZIP"));
        assert!(matches("zImage", "zimage"));
        assert!(matches("*", ""));
        assert!(matches("a*b*c", "aXXbYYbc"));
        assert!(matches("?Image", "zImage"));
        assert!(!matches("*.tgz", "rootfs.tar"));
        assert!(!matches("*.tgz", "rootfs.tgz.old"));
        assert!(!matches("?Image", "Image"));
        assert!(!matches("", "a"));
    }

    #[test]
    fn listings_are_filtered_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.mfw", "a.mfw", "notes.txt"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("roms")).unwrap();
        fs::create_dir(dir.path().join("backups.mfw")).unwrap();

        let listing = Listing::read(dir.path(), Some(&["*.mfw"])).unwrap();
        assert_eq!(listing.dirs, ["backups.mfw", "roms"]);
        assert_eq!(listing.files, ["a.mfw", "b.mfw"]);

        let listing = Listing::read(dir.path(), Some(&[])).unwrap();
        assert_eq!(listing.files, ["a.mfw", "b.mfw", "notes.txt"]);

        let listing = Listing::read(dir.path(), None).unwrap();
        assert!(listing.files.is_empty());
        assert_eq!(listing.dirs.len(), 2);
    }

    #[test]
    fn confirm_modes_answer_without_a_terminal() {
        assert!(Console::new(ConfirmMode::AcceptAll).confirm("Flash a ROM?"));
        assert!(!Console::new(ConfirmMode::RejectAll).confirm("Flash a ROM?"));
    }
}
