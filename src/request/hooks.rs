use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use async_trait::async_trait;
use jsonschema::JSONSchema;
use log::{info, warn};
use serde_json::Value;

use crate::hooks::{JobHooks, NextJob};
use crate::request::message::Message;
use crate::request::read::{get_message_paths, mark_taken};
use crate::request::schema::load_schema;

/// Hooks that run one job per JSON manifest in a directory
///
/// Each job folder gets the job's arguments as `arguments.json`. When the queue is done with a
/// job, every file of its folder is copied to `results/<name>/`.
pub struct ManifestHooks {
    manifest_dir: PathBuf,
    results_dir: PathBuf,
    required_outputs: Vec<String>,
    compiled_schema: JSONSchema,
    pending: VecDeque<PathBuf>,
    skipped: usize,
}

impl ManifestHooks {
    pub fn new(manifest_dir: impl Into<PathBuf>, results_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        Ok(ManifestHooks {
            manifest_dir: manifest_dir.into(),
            results_dir: results_dir.into(),
            required_outputs: Vec::new(),
            compiled_schema: load_schema()?,
            pending: VecDeque::new(),
            skipped: 0,
        })
    }

    /// Fail jobs that finish without producing `file_name`
    pub fn require_output(mut self, file_name: impl Into<String>) -> Self {
        self.required_outputs.push(file_name.into());
        self
    }

    /// Manifests skipped because they couldn't be read
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

/// Write the job's arguments to the working directory
fn write_arguments(arguments: &Value, folder: &Path) -> anyhow::Result<()> {
    let out_path = folder.join("arguments.json");
    info!("Writing arguments to {}", out_path.display());
    let content = serde_json::to_string_pretty(arguments)?;
    fs::write(&out_path, content).with_context(|| format!("can't write {}", out_path.display()))
}

/// Copy the regular files of `folder` into `dest`
fn copy_outputs(folder: &Path, dest: &Path) -> anyhow::Result<usize> {
    fs::create_dir_all(dest).with_context(|| format!("can't create {}", dest.display()))?;
    let mut copied = 0;
    for entry in fs::read_dir(folder).with_context(|| format!("can't read {}", folder.display()))? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if let Some(file_name) = path.file_name() {
            fs::copy(&path, dest.join(file_name)).with_context(|| format!("can't copy {}", path.display()))?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[async_trait]
impl JobHooks for ManifestHooks {
    async fn on_run_start(&mut self) -> anyhow::Result<()> {
        let paths = get_message_paths(&self.manifest_dir)
            .with_context(|| format!("can't list manifests in {}", self.manifest_dir.display()))?;
        info!("Found {} job manifests in {}", paths.len(), self.manifest_dir.display());
        self.pending = paths.into();
        fs::create_dir_all(&self.results_dir)
            .with_context(|| format!("can't create results directory {}", self.results_dir.display()))?;
        Ok(())
    }

    async fn next_job(&mut self) -> anyhow::Result<NextJob> {
        while let Some(path) = self.pending.pop_front() {
            let message = Message { path: path.clone(), compiled_schema: &self.compiled_schema };
            match message.read() {
                Ok(job) => {
                    mark_taken(&path).with_context(|| format!("can't mark {} as taken", path.display()))?;
                    return Ok(NextJob::Job(job));
                }
                Err(err) => {
                    warn!("Skipping manifest: {err}");
                    self.skipped += 1;
                }
            }
        }
        Ok(NextJob::Exhausted)
    }

    async fn setup_job(&mut self, _name: &str, arguments: &Value, folder: &Path) -> anyhow::Result<()> {
        write_arguments(arguments, folder)
    }

    async fn finish_job(&mut self, name: &str, _arguments: &Value, folder: &Path) -> anyhow::Result<()> {
        for required in &self.required_outputs {
            if !folder.join(required).is_file() {
                bail!("job {name} finished without {required}");
            }
        }
        let dest = self.results_dir.join(name);
        let copied = copy_outputs(folder, &dest)?;
        info!("Copied {} files of job {} to {}", copied, name, dest.display());
        Ok(())
    }

    async fn on_run_finish(&mut self) -> anyhow::Result<()> {
        if self.skipped > 0 {
            warn!("{} manifests were skipped", self.skipped);
        }
        info!("Results are in {}", self.results_dir.display());
        Ok(())
    }
}
