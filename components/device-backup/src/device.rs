use std::path::{Path, PathBuf};

use log::{debug, error};
use partition_registry::Registry;

use crate::command::Command;
use crate::error::{Error, Result};
use crate::executor::{Executor, Status};
use crate::ubi::UbiState;

/// The device being serviced: hardware description, tool runner and the
/// process-wide UBI attach state.
pub struct Device<'r, E> {
    pub(crate) registry: &'r Registry,
    pub(crate) exec: E,
    pub(crate) ubi: UbiState,
    home: PathBuf,
}

impl<'r, E: Executor> Device<'r, E> {
    /// `home` is where file choosers start and scratch folders are made.
    pub fn new(registry: &'r Registry, exec: E, home: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            exec,
            ubi: UbiState::Detached,
            home: home.into(),
        }
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    pub fn executor(&self) -> &E {
        &self.exec
    }

    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.exec
    }

    pub fn ubi_state(&self) -> UbiState {
        self.ubi
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub(crate) fn run(&mut self, command: Command) -> Result<()> {
        self.run_with(command, true)
    }

    pub(crate) fn run_with(&mut self, command: Command, capture_output: bool) -> Result<()> {
        debug!("running `{command}`");
        let status = self.exec.execute(&command, capture_output);
        if status.success() {
            return Ok(());
        }
        error!("`{command}` failed: {status:?}");
        let not_launched = status.is_launch_failure();
        match status {
            Status::NotLaunched(reason) => Err(Error::CommandNotLaunched {
                command: command.to_string(),
                reason,
            }),
            Status::Exited(code) if not_launched => {
                Err(Error::CommandNotLaunched {
                    command: command.to_string(),
                    reason: format!("exit status {code}"),
                })
            }
            Status::Exited(status) => Err(Error::CommandFailed {
                command: command.to_string(),
                status,
            }),
        }
    }
}
