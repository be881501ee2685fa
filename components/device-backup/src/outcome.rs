use thiserror::Error;

use crate::error::{Error, Result};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Step {
    Succeeded,
    Failed,
    Skipped(String),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Warning {
    /// Free space or partition capacity may not suffice.
    InsufficientSpace(String),
    UnknownMember(String),
    MissingImage(String),
}

impl Warning {
    /// Whether the operator has to agree before the operation goes on.
    pub fn needs_consent(&self) -> bool {
        !matches!(self, Warning::UnknownMember(_))
    }
}

/// Record of the steps an action went through.
#[derive(Clone, Debug, Default)]
pub struct Outcome {
    steps: Vec<(String, Step)>,
    warnings: Vec<Warning>,
}

impl Outcome {
    pub fn record(&mut self, name: impl Into<String>, step: Step) {
        self.steps.push((name.into(), step));
    }

    pub fn skip(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        self.record(name, Step::Skipped(reason.into()));
    }

    /// Records `result` as the step `name` and hands it back.
    pub fn track<T>(&mut self, name: impl Into<String>, result: Result<T>) -> Result<T> {
        let step = if result.is_ok() {
            Step::Succeeded
        } else {
            Step::Failed
        };
        self.record(name, step);
        result
    }

    pub fn warn(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }

    pub fn steps(&self) -> &[(String, Step)] {
        &self.steps
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps
            .iter()
            .find(|(step, _)| step == name)
            .map(|(_, step)| step)
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn failed(&self) -> bool {
        self.steps.iter().any(|(_, step)| *step == Step::Failed)
    }
}

/// What a failed action left behind on the device.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeviceState {
    Unmodified,
    /// Every write went through; only housekeeping failed.
    Written,
    PossiblyInconsistent,
}

impl DeviceState {
    pub fn note(self) -> &'static str {
        match self {
            DeviceState::Unmodified => {
                "No changes were made to your device and hence it should be immediately usable."
            }
            DeviceState::Written => "All changes to your device were completed.",
            DeviceState::PossiblyInconsistent => {
                "Your device may be unusable till you restore another backup or flash another firmware."
            }
        }
    }
}

#[derive(Debug, Error)]
#[error("{error}")]
pub struct Failure {
    pub error: Error,
    pub device: DeviceState,
}

impl Failure {
    pub fn unmodified(error: Error) -> Self {
        Self {
            error,
            device: DeviceState::Unmodified,
        }
    }

    pub fn inconsistent(error: Error) -> Self {
        Self {
            error,
            device: DeviceState::PossiblyInconsistent,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.error, Error::Cancelled)
    }
}
