use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unable to access {0}")]
    StorageUnreachable(String),
    #[error("your device does not have the '{0}' partition")]
    PartitionMissing(&'static str),
    #[error("there may be insufficient space {0}")]
    InsufficientSpace(String),
    #[error("`{command}` exited with status {status}")]
    CommandFailed { command: String, status: i32 },
    #[error("`{command}` could not be executed: {reason}")]
    CommandNotLaunched { command: String, reason: String },
    #[error("'{partition}' was erased but could not be written: {source}")]
    PartiallyModified {
        partition: String,
        #[source]
        source: Box<Error>,
    },
    #[error("unknown file in backup archive: {0}")]
    ArchiveMemberUnknown(String),
    #[error("{0} not found")]
    ImageNotFound(String),
    #[error("{0} is in use")]
    InUse(String),
    #[error("logic error: {0}")]
    Logic(&'static str),
    #[error("cancelled")]
    Cancelled,
    #[error("{} steps failed: {}", .0.len(), join(.0))]
    Multiple(Vec<Error>),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

impl Error {
    /// Folds the failures of independent steps that all had to run.
    pub fn collect(mut errors: Vec<Error>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Multiple(errors)),
        }
    }
}

fn join(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
