//! Drive batch work through an external cluster queue
//!
//! jobherd owns no compute. It asks a set of [hooks::JobHooks] for job definitions, prepares a
//! folder per job, renders a submission script, hands it to a [queue::QueueBackend] and polls
//! until the job leaves the queue, then lets the hooks collect the results.

use std::path::{Path, PathBuf};

/// Submission script tags and rendering
pub mod template;
/// External queue abstraction and the command line backend
pub mod queue;
/// Job records and their lifecycle
pub mod job;
/// User supplied callbacks driven by the scheduler
pub mod hooks;
/// Run state is checkpointed to a SQLite database
pub mod db;
/// Run configuration
pub mod config;
/// The control loop
pub mod scheduler;
/// Job manifests read from disk, the default set of hooks
pub mod request;

/// Root of the tree that holds one folder per active job
#[derive(Debug, Clone)]
pub struct WorkingDirectory {
    pub path: PathBuf,
}

impl WorkingDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        WorkingDirectory { path: path.into() }
    }

    /// Folder owned by the job called `name`
    pub fn job_folder(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    pub fn as_path(&self) -> &Path {
        self.path.as_path()
    }
}
