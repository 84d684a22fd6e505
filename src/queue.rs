//! Talk to the external queueing system
//!
//! The scheduler only sees [QueueBackend]. Backends wrap the queue's own command line tools and
//! keep every bit of output parsing to themselves.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

/// Exponential backoff for failed status queries
pub mod backoff;
/// Generic backend driven by submit / list / cancel commands
pub mod command;
/// Command presets for the supported queueing systems
pub mod system;

pub use command::{CommandQueue, QueueCommands};
pub use system::QueueSystem;

/// Where a submitted job is, as far as the queue can tell
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum QueueStatus {
    Queued,
    Running,
    Done,
    NotFound,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The queue refused the job, retried a bounded number of times
    #[error("submission rejected: {0}")]
    Submission(String),
    /// Talking to the queue or reading its answer failed, always retried
    #[error("queue query failed: {0}")]
    Query(String),
}

#[async_trait]
pub trait QueueBackend: Send {
    /// Called once before the first cycle
    async fn connect(&mut self) -> Result<(), QueueError> {
        Ok(())
    }

    /// Called at the start of every polling pass
    async fn refresh(&mut self) -> Result<(), QueueError> {
        Ok(())
    }

    /// Hand `script` to the queue from within `folder`, returning the queue's job id
    async fn submit(&mut self, folder: &Path, script: &Path) -> Result<String, QueueError>;

    async fn status(&mut self, external_id: &str) -> Result<QueueStatus, QueueError>;

    /// Best effort, a job that is already gone is not an error
    async fn cancel(&mut self, external_id: &str) -> bool;

    /// Called once when the run is over
    async fn release(&mut self) {}
}

#[async_trait]
impl<Q: QueueBackend + ?Sized> QueueBackend for Box<Q> {
    async fn connect(&mut self) -> Result<(), QueueError> {
        (**self).connect().await
    }

    async fn refresh(&mut self) -> Result<(), QueueError> {
        (**self).refresh().await
    }

    async fn submit(&mut self, folder: &Path, script: &Path) -> Result<String, QueueError> {
        (**self).submit(folder, script).await
    }

    async fn status(&mut self, external_id: &str) -> Result<QueueStatus, QueueError> {
        (**self).status(external_id).await
    }

    async fn cancel(&mut self, external_id: &str) -> bool {
        (**self).cancel(external_id).await
    }

    async fn release(&mut self) {
        (**self).release().await
    }
}
