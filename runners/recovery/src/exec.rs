use std::os::unix::process::ExitStatusExt as _;
use std::process::{self, ExitStatus, Stdio};

use device_backup::{Command, Executor, Status};
use log::{error, info};

use crate::oplog::{COMMAND, OUTPUT};

/// Runs commands as child processes and logs them with their output.
pub struct SystemExecutor {
    sandbox: bool,
}

impl SystemExecutor {
    pub fn new(sandbox: bool) -> Self {
        Self { sandbox }
    }

    fn spawn(&self, argv: &[String], capture_output: bool) -> Status {
        let Some((program, args)) = argv.split_first() else {
            return Status::NotLaunched("empty command line".into());
        };
        let mut child = process::Command::new(program);
        child.args(args).stdin(Stdio::null());

        if !capture_output {
            return match child.status() {
                Ok(status) => exit_status(status),
                Err(err) => Status::NotLaunched(err.to_string()),
            };
        }
        match child.output() {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                for line in stdout.lines().chain(stderr.lines()) {
                    info!(target: OUTPUT, "{line}");
                }
                exit_status(output.status)
            }
            Err(err) => {
                error!("Error creating pipe for the last command.");
                Status::NotLaunched(err.to_string())
            }
        }
    }
}

impl Executor for SystemExecutor {
    fn execute(&mut self, command: &Command, capture_output: bool) -> Status {
        info!(target: COMMAND, "{command}");
        if self.sandbox {
            return Status::Exited(0);
        }

        let status = self.spawn(&command.argv(), capture_output);
        if status.success() {
            info!("The operation completed successfully.");
        } else if status.is_launch_failure() {
            error!("Error executing the last command.");
        } else {
            error!("Error while executing the last command.");
        }
        status
    }
}

/// Killed processes report like a shell does, 128 plus the signal.
fn exit_status(status: ExitStatus) -> Status {
    match (status.code(), status.signal()) {
        (Some(code), _) => Status::Exited(code),
        (None, Some(signal)) => Status::Exited(128 + signal),
        (None, None) => Status::Exited(-1),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn exit_codes_are_reported() {
        let mut exec = SystemExecutor::new(false);
        let clear = |dir: &str| Command::Clear {
            dir: PathBuf::from(dir),
        };

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("junk"), b"x").unwrap();
        let status = exec.execute(&clear(dir.path().to_str().unwrap()), true);
        assert_eq!(status, Status::Exited(0));
        assert!(!dir.path().join("junk").exists());

        let status = exec.execute(&clear("/nonexistent/recovery-test"), true);
        assert!(!status.success());
        assert!(!status.is_launch_failure());
    }

    #[test]
    fn missing_program_is_a_launch_failure() {
        let exec = SystemExecutor::new(false);
        let status = exec.spawn(&["/nonexistent/recovery-tool".to_owned()], true);
        assert!(matches!(status, Status::NotLaunched(_)));
        assert!(matches!(exec.spawn(&[], false), Status::NotLaunched(_)));
    }

    #[test]
    fn sandbox_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("keep"), b"x").unwrap();
        let mut exec = SystemExecutor::new(true);
        let status = exec.execute(
            &Command::Clear {
                dir: dir.path().to_owned(),
            },
            true,
        );
        assert!(status.success());
        assert!(dir.path().join("keep").exists());
    }
}
