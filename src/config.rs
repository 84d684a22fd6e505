use std::path::PathBuf;
use std::time::Duration;

use log::info;
use thiserror::Error;

use crate::template::{self, TagValues, TemplateError};
use crate::WorkingDirectory;

/// What happens to jobs still in the queue when a run is stopped early
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum StopPolicy {
    /// Leave them queued, a restart picks them up again
    #[default]
    Detach,
    /// Cancel them and fail their records
    Cancel,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max_active must be at least 1")]
    NoSlots,
    #[error("max_submit_attempts must be at least 1")]
    NoSubmitAttempts,
    #[error("script name '{0}' must be a plain file name")]
    BadScriptName(String),
    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Settings fixed for the whole run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Jobs allowed in the queue at once
    pub max_active: usize,
    /// Pause between cycles
    pub check_time: Duration,
    pub work_dir: WorkingDirectory,
    /// Submission script with `<tag>` placeholders
    pub template: String,
    /// SQLite file holding the run state
    pub state_path: PathBuf,
    /// File name of the rendered script inside each job folder
    pub script_name: String,
    pub max_submit_attempts: u32,
    /// Upper bound on the delay between status queries after failures
    pub query_backoff_ceiling: Duration,
    /// Polls that may miss a never seen job before it counts as finished
    pub not_found_grace: u32,
    /// Stop the run after this long
    pub max_time: Option<Duration>,
    pub stop_policy: StopPolicy,
    /// Tags supplied by configuration, available to every job
    pub static_tags: TagValues,
}

impl RunConfig {
    pub fn new(work_dir: WorkingDirectory, template: String, state_path: PathBuf) -> Self {
        RunConfig {
            max_active: 1,
            check_time: Duration::from_secs(60),
            work_dir,
            template,
            state_path,
            script_name: "job.sh".to_string(),
            max_submit_attempts: 3,
            query_backoff_ceiling: Duration::from_secs(600),
            not_found_grace: 3,
            max_time: None,
            stop_policy: StopPolicy::Detach,
            static_tags: TagValues::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_active == 0 {
            return Err(ConfigError::NoSlots);
        }
        if self.max_submit_attempts == 0 {
            return Err(ConfigError::NoSubmitAttempts);
        }
        let plain = !self.script_name.is_empty()
            && !self.script_name.contains(std::path::MAIN_SEPARATOR)
            && !self.script_name.contains('/')
            && self.script_name != "."
            && self.script_name != "..";
        if !plain {
            return Err(ConfigError::BadScriptName(self.script_name.clone()));
        }
        template::check_reserved(self.static_tags.keys())?;

        let tags = template::tags(&self.template);
        info!("Submission template uses tags: {:?}", tags);
        Ok(())
    }
}
