use std::path::PathBuf;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::job::state::{JobState, TransitionError};

/// A job as produced by the hooks
///
/// `arguments` is handed back to the hooks untouched. Its scalar top level entries also become
/// submission script tags.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JobDefinition {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl JobDefinition {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        JobDefinition { name: name.into(), arguments }
    }
}

/// A job tracked by the scheduler
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub definition: JobDefinition,
    pub folder: PathBuf,
    pub state: JobState,
    /// Identifier handed out by the queue on submission
    pub external_id: Option<String>,
    pub submit_attempts: u32,
    pub last_error: Option<String>,
    /// The queue has listed this job as queued or running at least once
    pub seen_in_queue: bool,
    /// Consecutive polls that didn't find a job which was never seen in the queue
    pub missed_polls: u32,
    /// Consecutive failed status queries
    pub query_failures: u32,
    /// Polling is suspended until then after failed queries (not persisted)
    pub next_poll_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(definition: JobDefinition, folder: PathBuf) -> Self {
        let now = Utc::now();
        JobRecord {
            definition,
            folder,
            state: JobState::Created,
            external_id: None,
            submit_attempts: 0,
            last_error: None,
            seen_in_queue: false,
            missed_polls: 0,
            query_failures: 0,
            next_poll_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn arguments(&self) -> &Value {
        &self.definition.arguments
    }

    /// Move to `next`, refusing edges the lifecycle doesn't have
    pub fn advance(&mut self, next: JobState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError { name: self.name().to_string(), from: self.state, to: next });
        }
        info!("Job {}: {} -> {}", self.name(), self.state, next);
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record `error` and move to FAILED
    ///
    /// Terminal records are left as they are.
    pub fn fail(&mut self, error: impl Into<String>) {
        let error = error.into();
        if self.state.is_terminal() {
            warn!("Job {} already {}, ignoring failure: {}", self.name(), self.state, error);
            return;
        }
        warn!("Job {} failed in state {}: {}", self.name(), self.state, error);
        self.last_error = Some(error);
        self.state = JobState::Failed;
        self.updated_at = Utc::now();
    }

    /// Keep a transient error for inspection without changing state
    pub fn note_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.updated_at = Utc::now();
    }

    /// Whether the backoff gate allows a status query at `now`
    pub fn poll_due(&self, now: DateTime<Utc>) -> bool {
        self.next_poll_at.map_or(true, |at| now >= at)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;

    fn record() -> JobRecord {
        JobRecord::new(JobDefinition::new("relax", json!({"cores": 4})), PathBuf::from("/w/relax"))
    }

    #[test]
    fn new_record_is_created_without_id() {
        let job = record();
        assert_eq!(job.state, JobState::Created);
        assert_eq!(job.external_id, None);
        assert_eq!(job.submit_attempts, 0);
    }

    #[test]
    fn advance_rejects_illegal_edge() {
        let mut job = record();
        let err = job.advance(JobState::Queued).unwrap_err();
        assert_eq!(err.from, JobState::Created);
        assert_eq!(err.to, JobState::Queued);
        assert_eq!(job.state, JobState::Created);
        job.advance(JobState::FolderReady).unwrap();
        assert_eq!(job.state, JobState::FolderReady);
    }

    #[test]
    fn fail_keeps_the_error_and_is_final() {
        let mut job = record();
        job.fail("setup hook failed");
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.last_error.as_deref(), Some("setup hook failed"));

        job.fail("second failure");
        assert_eq!(job.last_error.as_deref(), Some("setup hook failed"));
    }

    #[test]
    fn poll_gate() {
        let mut job = record();
        let now = Utc::now();
        assert!(job.poll_due(now));
        job.next_poll_at = Some(now + Duration::seconds(30));
        assert!(!job.poll_due(now));
        assert!(job.poll_due(now + Duration::seconds(31)));
    }

    #[test]
    fn definition_arguments_default_to_null() {
        let def: JobDefinition = serde_json::from_str(r#"{"name": "a"}"#).unwrap();
        assert_eq!(def.arguments, Value::Null);
    }
}
