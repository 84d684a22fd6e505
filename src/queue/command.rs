use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::Path;
use std::process::{Output, Stdio};

use async_trait::async_trait;
use log::{debug, info, warn};
use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::queue::{QueueBackend, QueueError, QueueStatus};

/// How to drive one queueing system from the command line
///
/// The script path is appended to `submit` (or written to its stdin when `script_on_stdin` is set)
/// and the job id is appended to `cancel`. `list` must print one line per job the queue knows
/// about, lines not matching `list_pattern` (headers, separators) are skipped.
#[derive(Debug, Clone)]
pub struct QueueCommands {
    pub submit: Vec<String>,
    pub script_on_stdin: bool,
    /// Must capture a `job_id` group
    pub submit_pattern: Regex,
    pub list: Vec<String>,
    /// Must capture `job_id` and `status` groups
    pub list_pattern: Regex,
    /// Output of a failing list command that actually means "no jobs"
    pub empty_pattern: Option<Regex>,
    pub cancel: Vec<String>,
    pub queued_codes: Vec<String>,
    pub running_codes: Vec<String>,
    pub done_codes: Vec<String>,
}

impl QueueCommands {
    pub fn classify(&self, code: &str) -> QueueStatus {
        let known = |codes: &[String]| codes.iter().any(|c| c == code);
        if known(&self.running_codes) {
            QueueStatus::Running
        } else if known(&self.done_codes) {
            QueueStatus::Done
        } else if known(&self.queued_codes) {
            QueueStatus::Queued
        } else {
            warn!("Unknown queue status code '{code}', treating job as queued");
            QueueStatus::Queued
        }
    }

    /// Pull the job id out of the submit command's output
    pub fn parse_submit_output(&self, stdout: &str) -> Result<String, QueueError> {
        self.submit_pattern
            .captures(stdout)
            .and_then(|caps| caps.name("job_id"))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| QueueError::Submission(format!("no job id in submit output: {}", stdout.trim())))
    }

    /// Job id to status code, one entry per job id
    ///
    /// A job listed on several lines (array tasks) is running as soon as one of its lines is.
    pub fn parse_listing(&self, stdout: &str) -> HashMap<String, String> {
        let mut table: HashMap<String, String> = HashMap::new();
        for line in stdout.lines() {
            match self.list_pattern.captures(line) {
                Some(caps) => {
                    if let (Some(id), Some(status)) = (caps.name("job_id"), caps.name("status")) {
                        let running = self.running_codes.iter().any(|c| c == status.as_str());
                        match table.entry(id.as_str().to_string()) {
                            Entry::Vacant(entry) => {
                                entry.insert(status.as_str().to_string());
                            }
                            Entry::Occupied(mut entry) if running => {
                                entry.insert(status.as_str().to_string());
                            }
                            Entry::Occupied(_) => {}
                        }
                    }
                }
                None => debug!("Skipping queue listing line: {line}"),
            }
        }
        table
    }
}

/// Queue backend that shells out to the queue's own tools
///
/// The queue is listed once per polling pass and every status answer comes from that listing.
pub struct CommandQueue {
    commands: QueueCommands,
    listing: Option<Result<HashMap<String, String>, String>>,
}

impl CommandQueue {
    pub fn new(commands: QueueCommands) -> Self {
        CommandQueue { commands, listing: None }
    }

    async fn list(&self) -> Result<HashMap<String, String>, String> {
        let output = run(&self.commands.list, Vec::new(), None, None)
            .await
            .map_err(|err| format!("can't run {:?}: {err}", self.commands.list))?;

        let stdout = String::from_utf8(output.stdout).map_err(|_| "queue listing is not UTF-8".to_string())?;
        if output.status.success() {
            return Ok(self.commands.parse_listing(&stdout));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let means_empty = self
            .commands
            .empty_pattern
            .as_ref()
            .map_or(false, |re| re.is_match(&stdout) || re.is_match(&stderr));
        if means_empty {
            Ok(HashMap::new())
        } else {
            Err(format!("{:?} exited with {}: {}", self.commands.list, output.status, stderr.trim()))
        }
    }
}

#[async_trait]
impl QueueBackend for CommandQueue {
    async fn connect(&mut self) -> Result<(), QueueError> {
        info!("Checking queue with {:?}", self.commands.list);
        self.refresh().await
    }

    async fn refresh(&mut self) -> Result<(), QueueError> {
        let listing = self.list().await;
        let result = match &listing {
            Ok(table) => {
                debug!("Queue lists {} jobs", table.len());
                Ok(())
            }
            Err(err) => Err(QueueError::Query(err.clone())),
        };
        self.listing = Some(listing);
        result
    }

    async fn submit(&mut self, folder: &Path, script: &Path) -> Result<String, QueueError> {
        let (args, stdin) = if self.commands.script_on_stdin {
            let content = tokio::fs::read(script)
                .await
                .map_err(|err| QueueError::Submission(format!("can't read {}: {err}", script.display())))?;
            (Vec::new(), Some(content))
        } else {
            (vec![script.as_os_str().to_owned()], None)
        };

        info!("Submitting {} with {:?}", script.display(), self.commands.submit);
        let output = run(&self.commands.submit, args, Some(folder), stdin)
            .await
            .map_err(|err| QueueError::Submission(format!("can't run {:?}: {err}", self.commands.submit)))?;

        // the next status query has to see the new job
        self.listing = None;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(QueueError::Submission(format!("exit {}: {}", output.status, stderr.trim())));
        }
        self.commands.parse_submit_output(&stdout)
    }

    async fn status(&mut self, external_id: &str) -> Result<QueueStatus, QueueError> {
        if self.listing.is_none() {
            self.listing = Some(self.list().await);
        }
        match &self.listing {
            Some(Ok(table)) => Ok(table
                .get(external_id)
                .map_or(QueueStatus::NotFound, |code| self.commands.classify(code))),
            Some(Err(err)) => Err(QueueError::Query(err.clone())),
            None => Err(QueueError::Query("queue listing unavailable".to_string())),
        }
    }

    async fn cancel(&mut self, external_id: &str) -> bool {
        info!("Cancelling queue job {external_id}");
        match run(&self.commands.cancel, vec![OsString::from(external_id)], None, None).await {
            Ok(output) if output.status.success() => {
                self.listing = None;
                true
            }
            Ok(output) => {
                warn!(
                    "Cancelling {external_id} exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                false
            }
            Err(err) => {
                warn!("Can't run {:?}: {err}", self.commands.cancel);
                false
            }
        }
    }
}

async fn run(
    argv: &[String],
    extra: Vec<OsString>,
    dir: Option<&Path>,
    stdin: Option<Vec<u8>>,
) -> std::io::Result<Output> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"))?;

    let mut cmd = Command::new(program);
    cmd.args(args).args(extra).stdout(Stdio::piped()).stderr(Stdio::piped());
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    debug!("{:?}", &cmd);

    match stdin {
        None => cmd.stdin(Stdio::null()).output().await,
        Some(content) => {
            cmd.stdin(Stdio::piped());
            let mut child = cmd.spawn()?;
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(&content).await?;
            }
            child.wait_with_output().await
        }
    }
}
