use crate::command::Command;

/// Exit code a shell reports for a program it could not find.
const NOT_FOUND: i32 = 127;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Status {
    Exited(i32),
    /// The process could not be started at all.
    NotLaunched(String),
}

impl Status {
    pub fn success(&self) -> bool {
        matches!(self, Status::Exited(0))
    }

    pub fn is_launch_failure(&self) -> bool {
        matches!(self, Status::NotLaunched(_) | Status::Exited(NOT_FOUND))
    }
}

/// Runs storage tools on behalf of the engine.
///
/// Implementations are expected to append the command line and its output to
/// the operation log.
pub trait Executor {
    fn execute(&mut self, command: &Command, capture_output: bool) -> Status;
}

impl<E: Executor + ?Sized> Executor for &mut E {
    fn execute(&mut self, command: &Command, capture_output: bool) -> Status {
        (**self).execute(command, capture_output)
    }
}
