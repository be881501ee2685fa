use std::path::{Path, PathBuf};

/// The person in front of the device.
///
/// Every call blocks until answered. `None` from a chooser means the
/// operator backed out.
pub trait Operator {
    /// Shows a progress or diagnostic line.
    fn say(&mut self, message: &str);

    fn confirm(&mut self, prompt: &str) -> bool;

    fn choose_directory(&mut self, start: &Path) -> Option<PathBuf>;

    /// Picks a file below `start` whose name matches one of the glob `filters`.
    fn choose_file(&mut self, start: &Path, filters: &[&str]) -> Option<PathBuf>;

    fn choose(&mut self, title: &str, options: &[String]) -> Option<usize>;

    fn present_file(&mut self, path: &Path);
}
