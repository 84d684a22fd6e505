use std::fs;
use std::io;
use std::path::Component;

use chrono::{Duration as ChronoDuration, Utc};
use log::{info, warn};

use crate::config::RunConfig;
use crate::db;
use crate::hooks::{JobHooks, NextJob};
use crate::job::{JobDefinition, JobRecord, JobState};
use crate::queue::backoff::BackoffPolicy;
use crate::queue::{QueueBackend, QueueError, QueueStatus};
use crate::scheduler::{Phase, RunError, Scheduler};
use crate::template;

/// Move a job along, failing it if the lifecycle has no such edge
fn step(job: &mut JobRecord, next: JobState) {
    if let Err(err) = job.advance(next) {
        job.fail(err.to_string());
    }
}

/// Remove the folder of a job, a folder that is already gone is fine
pub(super) fn remove_folder(job: &JobRecord) -> io::Result<()> {
    match fs::remove_dir_all(&job.folder) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

/// Remove the folder and fail the job with `error`
fn discard(job: &mut JobRecord, error: String) {
    if let Err(err) = remove_folder(job) {
        warn!("Can't remove folder {}: {}", job.folder.display(), err);
    }
    job.fail(error);
}

/// Job names become folder names, so they must be a single plain path component
fn usable_as_folder(name: &str) -> bool {
    let mut components = std::path::Path::new(name).components();
    matches!((components.next(), components.next()), (Some(Component::Normal(_)), None))
}

/// The queue is done with the job, a job it accepted counts as queued on the way out
fn leave_queue(job: &mut JobRecord) {
    if job.state == JobState::Submitted {
        step(job, JobState::Queued);
    }
    step(job, JobState::Finalizing);
}

/// Apply the answer of a status query to a job
fn observe(
    job: &mut JobRecord,
    answer: Result<QueueStatus, QueueError>,
    not_found_grace: u32,
    backoff: &BackoffPolicy,
) {
    let status = match answer {
        Ok(status) => status,
        Err(err) => {
            job.query_failures += 1;
            let delay = backoff.next(job.query_failures - 1);
            job.next_poll_at = ChronoDuration::from_std(delay).ok().map(|delay| Utc::now() + delay);
            warn!(
                "Job {}: {} (failure {}, next poll in {:?})",
                job.name(),
                err,
                job.query_failures,
                delay
            );
            job.note_error(err.to_string());
            return;
        }
    };

    job.query_failures = 0;
    job.next_poll_at = None;
    match status {
        QueueStatus::Queued => {
            job.seen_in_queue = true;
            job.missed_polls = 0;
            if job.state == JobState::Submitted {
                step(job, JobState::Queued);
            }
        }
        QueueStatus::Running => {
            job.seen_in_queue = true;
            job.missed_polls = 0;
            if job.state == JobState::Submitted {
                step(job, JobState::Queued);
            }
            if job.state == JobState::Queued {
                step(job, JobState::Running);
            }
        }
        QueueStatus::Done => leave_queue(job),
        QueueStatus::NotFound if job.seen_in_queue => {
            info!("Job {} has left the queue", job.name());
            job.note_error("left the queue without a final status, assuming it finished");
            leave_queue(job);
        }
        QueueStatus::NotFound => {
            job.missed_polls += 1;
            if job.missed_polls >= not_found_grace {
                info!(
                    "Job {} never showed up in the queue after {} polls, finalizing",
                    job.name(),
                    job.missed_polls
                );
                leave_queue(job);
            }
        }
    }
}

impl<Q: QueueBackend, H: JobHooks> Scheduler<Q, H> {
    /// One ACTIVE cycle: reclaim, finalize, admit, submit, checkpoint
    pub(super) async fn cycle(&mut self) -> Result<(), RunError> {
        self.reclaim().await;
        self.finalize().await;
        let admitted = self.admit().await;
        self.prepare_and_submit().await;

        self.state.retire_terminal();
        if self.state.is_drained() {
            self.state.phase = Phase::Draining;
        }
        self.checkpoint()?;
        admitted
    }

    /// Poll every job the queue is looking after
    async fn reclaim(&mut self) {
        let Scheduler { config, queue, state, backoff, .. } = self;
        if state.outstanding() == 0 {
            return;
        }
        if let Err(err) = queue.refresh().await {
            warn!("Can't refresh queue state: {err}");
        }

        let now = Utc::now();
        for job in state.jobs.iter_mut() {
            if !job.state.is_outstanding() || !job.poll_due(now) {
                continue;
            }
            let id = match job.external_id.clone() {
                Some(id) => id,
                None => {
                    discard(job, "submitted without a queue id".to_string());
                    continue;
                }
            };
            let answer = queue.status(&id).await;
            observe(job, answer, config.not_found_grace, backoff);
        }
    }

    /// Hand jobs the queue is done with to the finish hook, then clean up
    async fn finalize(&mut self) {
        let Scheduler { hooks, state, .. } = self;
        for job in state.jobs.iter_mut() {
            if job.state != JobState::Finalizing {
                continue;
            }
            info!("Finalizing job {} in {}", job.name(), job.folder.display());
            let result = hooks.finish_job(job.name(), job.arguments(), &job.folder).await;
            let removed = remove_folder(job);

            match result {
                Ok(()) => match removed {
                    Ok(()) => step(job, JobState::Done),
                    Err(err) => job.fail(format!("can't remove folder {}: {}", job.folder.display(), err)),
                },
                Err(err) => {
                    if let Err(removal) = removed {
                        warn!("Can't remove folder {}: {}", job.folder.display(), removal);
                    }
                    job.fail(format!("finish hook: {err:#}"));
                }
            }
        }
    }

    /// Ask the hooks for jobs until every slot is taken or they run out
    async fn admit(&mut self) -> Result<(), RunError> {
        while !self.state.exhausted && self.state.in_flight() < self.config.max_active {
            match self.hooks.next_job().await {
                Ok(NextJob::Job(definition)) => self.admit_one(definition),
                Ok(NextJob::Exhausted) => {
                    info!("No more jobs to generate");
                    self.state.exhausted = true;
                }
                Err(err) => {
                    warn!("Next job hook failed: {err:#}");
                    return Err(RunError::NextJob(err));
                }
            }
        }
        Ok(())
    }

    fn admit_one(&mut self, definition: JobDefinition) {
        let name = self.state.claim_name(&definition.name);
        let folder = self.config.work_dir.job_folder(&name);
        let mut job = JobRecord::new(JobDefinition { name, arguments: definition.arguments }, folder);
        info!("Admitted job {}", job.name());

        if !usable_as_folder(job.name()) {
            job.fail(format!("job name '{}' can't be used as a folder name", job.name()));
        } else if let Err(err) = template::check_reserved(template::argument_tags(job.arguments()).keys()) {
            job.fail(err.to_string());
        }
        self.state.jobs.push(job);
    }

    /// Prepare newly admitted jobs and submit them, retrying earlier rejected submissions
    async fn prepare_and_submit(&mut self) {
        let Scheduler { config, queue, hooks, state, db, backoff, .. } = self;

        for job in state.jobs.iter_mut() {
            if job.state == JobState::Created {
                // the folder isn't ours, so it is left alone
                if job.folder.exists() {
                    job.fail(format!("folder {} already exists", job.folder.display()));
                    continue;
                }
                if let Err(err) = prepare(job, &mut *hooks, config).await {
                    if job.state.has_folder() {
                        discard(job, err);
                    } else {
                        job.fail(err);
                    }
                    continue;
                }
            }
            if job.state != JobState::FolderReady {
                continue;
            }

            let script = job.folder.join(&config.script_name);
            job.submit_attempts += 1;
            match queue.submit(&job.folder, &script).await {
                Ok(id) => {
                    info!("Job {} submitted as {}", job.name(), id);
                    job.external_id = Some(id.clone());
                    step(job, JobState::Submitted);
                    if let Some(conn) = db.as_ref() {
                        // the queue id has to survive a crash before the next checkpoint
                        if let Err(err) = db::job::save(conn, job) {
                            warn!("Can't record queue id of {}: {}", job.name(), err);
                        }
                    }
                    let answer = queue.status(&id).await;
                    observe(job, answer, config.not_found_grace, backoff);
                }
                Err(err) if job.submit_attempts >= config.max_submit_attempts => {
                    discard(job, format!("{} (after {} attempts)", err, job.submit_attempts));
                }
                Err(err) => {
                    warn!(
                        "Job {}: {} (attempt {} of {}, retrying next cycle)",
                        job.name(),
                        err,
                        job.submit_attempts,
                        config.max_submit_attempts
                    );
                    job.note_error(err.to_string());
                }
            }
        }
    }
}

/// Create the folder, run the setup hook and write the submission script
async fn prepare<H: JobHooks>(job: &mut JobRecord, hooks: &mut H, config: &RunConfig) -> Result<(), String> {
    fs::create_dir(&job.folder).map_err(|err| format!("can't create folder: {err}"))?;
    step(job, JobState::FolderReady);

    hooks
        .setup_job(job.name(), job.arguments(), &job.folder)
        .await
        .map_err(|err| format!("setup hook: {err:#}"))?;

    let values = template::tag_values(job.name(), &job.folder, &config.static_tags, job.arguments())
        .map_err(|err| err.to_string())?;
    let script = template::render(&config.template, &values).map_err(|err| err.to_string())?;

    let path = job.folder.join(&config.script_name);
    info!("Writing submission script {}", path.display());
    fs::write(&path, script).map_err(|err| format!("can't write {}: {}", path.display(), err))?;
    Ok(())
}
