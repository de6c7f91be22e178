use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one slicing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Launching,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Launching => "launching",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

pub fn validate_transition(from: JobState, to: JobState) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (JobState::Idle, JobState::Launching)
            | (JobState::Launching, JobState::Running | JobState::Failed)
            | (
                JobState::Running,
                JobState::Succeeded | JobState::Failed | JobState::Cancelled
            )
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        assert!(validate_transition(JobState::Idle, JobState::Launching).is_ok());
        assert!(validate_transition(JobState::Launching, JobState::Running).is_ok());
        assert!(validate_transition(JobState::Launching, JobState::Failed).is_ok());
        assert!(validate_transition(JobState::Running, JobState::Succeeded).is_ok());
        assert!(validate_transition(JobState::Running, JobState::Failed).is_ok());
        assert!(validate_transition(JobState::Running, JobState::Cancelled).is_ok());
    }

    #[test]
    fn invalid_transitions() {
        assert!(validate_transition(JobState::Idle, JobState::Running).is_err());
        assert!(validate_transition(JobState::Launching, JobState::Cancelled).is_err());
        assert!(validate_transition(JobState::Running, JobState::Launching).is_err());
        assert!(validate_transition(JobState::Running, JobState::Running).is_err());
    }

    #[test]
    fn terminal_states_accept_nothing() {
        let all = [
            JobState::Idle,
            JobState::Launching,
            JobState::Running,
            JobState::Succeeded,
            JobState::Failed,
            JobState::Cancelled,
        ];
        for from in all.into_iter().filter(|s| s.is_terminal()) {
            for to in all {
                assert!(validate_transition(from, to).is_err(), "{from} -> {to}");
            }
        }
    }
}
