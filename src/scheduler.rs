//! The control loop
//!
//! A run goes through INIT, ACTIVE, DRAINING and DONE. Every ACTIVE cycle reclaims slots of jobs
//! the queue has finished with, finalizes them, admits new jobs up to `max_active`, prepares and
//! submits them, then checkpoints the run state. Between cycles the loop sleeps for `check_time`,
//! which is also the only moment a stop request or the run deadline is looked at.

use std::fs;

use log::{info, warn};
use rusqlite::Connection;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, RunConfig, StopPolicy};
use crate::db::checkpoint::checkpoint;
use crate::db::load::load_run;
use crate::db::open::{clear, open_db};
use crate::hooks::JobHooks;
use crate::queue::backoff::BackoffPolicy;
use crate::queue::{QueueBackend, QueueError};

/// Steps of a single cycle
mod cycle;
/// Persisted state of a run
pub mod run_state;

pub use run_state::{Phase, RunState};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("run start hook failed: {0:#}")]
    RunStart(anyhow::Error),
    #[error("run finish hook failed: {0:#}")]
    RunFinish(anyhow::Error),
    #[error("next job hook failed: {0:#}")]
    NextJob(anyhow::Error),
    #[error("can't initialise queue: {0}")]
    Queue(QueueError),
    #[error("run state database: {0}")]
    Store(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: u64,
    pub failed: u64,
    /// Ended by a stop request or the run deadline rather than by running out of jobs
    pub stopped: bool,
}

pub struct Scheduler<Q, H> {
    config: RunConfig,
    queue: Q,
    hooks: H,
    state: RunState,
    db: Option<Connection>,
    backoff: BackoffPolicy,
    stop: CancellationToken,
}

impl<Q: QueueBackend, H: JobHooks> Scheduler<Q, H> {
    pub fn new(config: RunConfig, queue: Q, hooks: H) -> Self {
        let backoff = BackoffPolicy::doubling(config.check_time, config.query_backoff_ceiling);
        Scheduler {
            config,
            queue,
            hooks,
            state: RunState::fresh(),
            db: None,
            backoff,
            stop: CancellationToken::new(),
        }
    }

    /// Cancelling the token stops the run at the next wait between cycles
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn into_parts(self) -> (Q, H) {
        (self.queue, self.hooks)
    }

    /// Drive the run until it is drained or stopped
    pub async fn run(&mut self) -> Result<RunSummary, RunError> {
        self.init().await?;
        let started = Instant::now();

        let stopped = loop {
            if self.state.phase == Phase::Active {
                self.cycle().await?;
            }
            if self.state.phase != Phase::Active {
                break false;
            }
            if self.wait(started).await {
                break true;
            }
        };

        if stopped {
            self.halt().await?;
        } else {
            self.drain().await?;
        }

        let summary = RunSummary { completed: self.state.completed, failed: self.state.failed, stopped };
        info!(
            "Run {}: {} jobs done, {} failed",
            if stopped { "stopped" } else { "finished" },
            summary.completed,
            summary.failed
        );
        Ok(summary)
    }

    async fn init(&mut self) -> Result<(), RunError> {
        self.config.validate()?;
        fs::create_dir_all(self.config.work_dir.as_path())?;

        let conn = open_db(&self.config.state_path)?;
        self.state = match load_run(&conn)? {
            Some(state) if state.phase == Phase::Done => {
                info!("Previous run in {} is complete, starting a new one", self.config.state_path.display());
                clear(&conn)?;
                RunState::fresh()
            }
            Some(state) => {
                info!(
                    "Resuming run from {}: {} jobs in the queue",
                    self.config.state_path.display(),
                    state.outstanding()
                );
                state
            }
            None => {
                info!("Starting a new run in {}", self.config.work_dir.path.display());
                RunState::fresh()
            }
        };
        self.db = Some(conn);

        self.hooks.on_run_start().await.map_err(RunError::RunStart)?;
        self.queue.connect().await.map_err(RunError::Queue)?;

        if self.state.phase == Phase::Init {
            self.state.phase = Phase::Active;
        }
        self.checkpoint()
    }

    /// Sleep until the next cycle, true when the run has to stop
    async fn wait(&self, started: Instant) -> bool {
        let mut pause = self.config.check_time;
        if let Some(max_time) = self.config.max_time {
            let elapsed = started.elapsed();
            if elapsed >= max_time {
                info!("Run reached its maximum time of {:?}", max_time);
                return true;
            }
            pause = pause.min(max_time - elapsed);
        }

        tokio::select! {
            biased;
            _ = self.stop.cancelled() => {
                info!("Stop requested");
                true
            }
            _ = sleep(pause) => {
                let over_time = self.config.max_time.map_or(false, |max_time| started.elapsed() >= max_time);
                if over_time {
                    info!("Run reached its maximum time");
                }
                over_time
            }
        }
    }

    /// Stop early, leaving or cancelling whatever is still in the queue
    async fn halt(&mut self) -> Result<(), RunError> {
        match self.config.stop_policy {
            StopPolicy::Detach => {
                info!(
                    "Leaving {} jobs in the queue, restart to pick them up again",
                    self.state.outstanding()
                );
            }
            StopPolicy::Cancel => {
                for job in self.state.jobs.iter_mut() {
                    if job.state.is_outstanding() {
                        if let Some(id) = job.external_id.as_deref() {
                            self.queue.cancel(id).await;
                        }
                    }
                    if job.state.has_folder() {
                        if let Err(err) = cycle::remove_folder(job) {
                            warn!("Can't remove folder of {}: {}", job.name(), err);
                        }
                    }
                    job.fail("cancelled by stop request");
                }
                self.state.retire_terminal();
            }
        }
        self.checkpoint()
    }

    async fn drain(&mut self) -> Result<(), RunError> {
        info!("No jobs left, finishing run");
        self.hooks.on_run_finish().await.map_err(RunError::RunFinish)?;
        self.state.phase = Phase::Done;
        self.checkpoint()?;
        self.queue.release().await;
        Ok(())
    }

    fn checkpoint(&mut self) -> Result<(), RunError> {
        if let Some(conn) = self.db.as_mut() {
            checkpoint(conn, &mut self.state)?;
        }
        Ok(())
    }
}
