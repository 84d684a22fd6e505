use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum JobState {
    Created,
    FolderReady,
    Submitted,
    Queued,
    Running,
    Finalizing,
    Done,
    Failed,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("job {name}: illegal transition {from} -> {to}")]
pub struct TransitionError {
    pub name: String,
    pub from: JobState,
    pub to: JobState,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown job state '{0}'")]
pub struct UnknownState(pub String);

/// Job lifecycle
///
/// CREATED -> FOLDER_READY -> SUBMITTED -> QUEUED -> RUNNING -> FINALIZING -> DONE, with FAILED
/// reachable from every state that isn't terminal. RUNNING is only seen when the queue reports it,
/// so QUEUED may go straight to FINALIZING.
impl JobState {
    /// db column values are all lower case
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::FolderReady => "folder_ready",
            JobState::Submitted => "submitted",
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Finalizing => "finalizing",
            JobState::Done => "done",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }

    /// Submitted to the queue and not yet known to have left it
    pub fn is_outstanding(&self) -> bool {
        matches!(self, JobState::Submitted | JobState::Queued | JobState::Running)
    }

    /// Counts against the admission limit: outstanding, or admitted and not yet submitted
    pub fn holds_slot(&self) -> bool {
        self.is_outstanding() || matches!(self, JobState::Created | JobState::FolderReady)
    }

    /// The job folder exists on disk in these states
    pub fn has_folder(&self) -> bool {
        self.is_outstanding() || matches!(self, JobState::FolderReady | JobState::Finalizing)
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (*self, next),
            (_, Failed)
                | (Created, FolderReady)
                | (FolderReady, Submitted)
                | (Submitted, Queued)
                | (Queued, Running)
                | (Queued, Finalizing)
                | (Running, Finalizing)
                | (Finalizing, Done)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

impl FromStr for JobState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(JobState::Created),
            "folder_ready" => Ok(JobState::FolderReady),
            "submitted" => Ok(JobState::Submitted),
            "queued" => Ok(JobState::Queued),
            "running" => Ok(JobState::Running),
            "finalizing" => Ok(JobState::Finalizing),
            "done" => Ok(JobState::Done),
            "failed" => Ok(JobState::Failed),
            other => Err(UnknownState(other.to_string())),
        }
    }
}
