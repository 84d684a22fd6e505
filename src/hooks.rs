//! What a run computes is decided by the hooks
//!
//! The scheduler never looks inside a job. It asks [JobHooks::next_job] for work, lets
//! [JobHooks::setup_job] fill the job folder before submission and [JobHooks::finish_job] collect
//! results once the queue is done with it. Errors from `setup_job` and `finish_job` fail that job
//! only, errors from the run level callbacks end the run.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use crate::job::JobDefinition;

/// Answer of [JobHooks::next_job]
#[derive(Debug, Clone, PartialEq)]
pub enum NextJob {
    Job(JobDefinition),
    /// No more jobs for the rest of the run
    Exhausted,
}

#[async_trait]
pub trait JobHooks: Send {
    /// Called once when the run starts, before any job is generated
    async fn on_run_start(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn next_job(&mut self) -> anyhow::Result<NextJob>;

    /// Prepare the job folder, called before the script is rendered and submitted
    async fn setup_job(&mut self, name: &str, arguments: &Value, folder: &Path) -> anyhow::Result<()>;

    /// Collect results, called once the queue no longer runs the job
    ///
    /// The folder is removed afterwards whatever the outcome.
    async fn finish_job(&mut self, name: &str, arguments: &Value, folder: &Path) -> anyhow::Result<()>;

    /// Called once when every job has finished and no more will be generated
    async fn on_run_finish(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}
