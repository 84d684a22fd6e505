use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::{info, warn};

use jobherd::config::{RunConfig, StopPolicy};
use jobherd::queue::{CommandQueue, QueueSystem};
use jobherd::request::ManifestHooks;
use jobherd::scheduler::Scheduler;
use jobherd::template::TagValues;
use jobherd::WorkingDirectory;

/// Run a directory of job manifests through a cluster queue
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Root of the per-job working directories
    #[arg(short, long)]
    work_dir: PathBuf,

    /// Submission script template with <tag> placeholders
    #[arg(short, long)]
    template: PathBuf,

    /// Directory of JSON job manifests
    #[arg(short, long)]
    manifests: PathBuf,

    /// Finished jobs are copied here
    #[arg(short, long)]
    results: PathBuf,

    /// Queueing system to submit to
    #[arg(short, long, value_enum, default_value_t = QueueSystem::Slurm)]
    queue: QueueSystem,

    /// Jobs allowed in the queue at once
    #[arg(long, default_value_t = 10)]
    max_active: usize,

    /// Seconds between queue polls
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    check_time: u64,

    /// Submission attempts before a job is failed
    #[arg(long, default_value_t = 3)]
    max_submit_attempts: u32,

    /// Longest pause in seconds between status queries after queue errors
    #[arg(long, default_value_t = 600)]
    backoff_ceiling: u64,

    /// Stop the run after this many seconds
    #[arg(long)]
    max_time: Option<u64>,

    /// Run state database, defaults to jobherd.db in the working directory
    #[arg(long)]
    state_db: Option<PathBuf>,

    /// Extra template tag, KEY=VALUE, repeatable
    #[arg(long = "tag", value_parser = parse_tag)]
    tags: Vec<(String, String)>,

    /// File every finished job must produce
    #[arg(long)]
    require_output: Vec<String>,

    /// Cancel queued jobs when stopped instead of leaving them for a restart
    #[arg(long)]
    cancel_on_stop: bool,
}

fn parse_tag(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))
}

fn read_template(path: &Path) -> anyhow::Result<String> {
    info!("Reading submission template {}", path.display());
    fs::read_to_string(path).with_context(|| format!("can't read template {}", path.display()))
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("terve! starting up :)");

    let args = Args::parse();
    let work_dir = WorkingDirectory::new(&args.work_dir);
    let state_path = args.state_db.clone().unwrap_or_else(|| work_dir.path.join("jobherd.db"));

    let mut config = RunConfig::new(work_dir, read_template(&args.template)?, state_path);
    config.max_active = args.max_active;
    config.check_time = Duration::from_secs(args.check_time);
    config.max_submit_attempts = args.max_submit_attempts;
    config.query_backoff_ceiling = Duration::from_secs(args.backoff_ceiling);
    config.max_time = args.max_time.map(Duration::from_secs);
    config.static_tags = args.tags.iter().cloned().collect::<TagValues>();
    if args.cancel_on_stop {
        config.stop_policy = StopPolicy::Cancel;
    }

    let mut hooks = ManifestHooks::new(&args.manifests, &args.results)?;
    for file_name in &args.require_output {
        hooks = hooks.require_output(file_name);
    }

    info!("Submitting to {} with up to {} jobs in the queue", args.queue, config.max_active);
    let queue = CommandQueue::new(args.queue.commands());
    let mut scheduler = Scheduler::new(config, queue, hooks);

    let stop = scheduler.stop_token();
    tokio::spawn(async move {
        match wait_for_shutdown_signal().await {
            Ok(()) => {
                info!("Shutdown signal received, stopping after the current cycle");
                stop.cancel();
            }
            Err(err) => warn!("Can't listen for shutdown signals: {err}"),
        }
    });

    let summary = scheduler.run().await?;
    info!("{} jobs done, {} failed", summary.completed, summary.failed);
    if summary.stopped {
        info!("Run was stopped early, start again with the same state database to resume");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Args, clap::Error> {
        let base = ["jobherd", "-w", "work", "-t", "job.sh", "-m", "manifests", "-r", "results"];
        Args::try_parse_from(base.iter().chain(extra.iter()).copied())
    }

    #[test]
    fn check_time_must_be_positive() {
        assert_eq!(parse(&[]).unwrap().check_time, 60);
        assert_eq!(parse(&["--check-time", "5"]).unwrap().check_time, 5);
        assert!(parse(&["--check-time", "0"]).is_err());
    }

    #[test]
    fn tags_and_queue_system() {
        let args = parse(&["--tag", "account=proj1", "--tag", "cores=4", "-q", "grid-engine"]).unwrap();
        assert_eq!(args.tags, vec![("account".to_string(), "proj1".to_string()), ("cores".to_string(), "4".to_string())]);
        assert_eq!(args.queue, QueueSystem::GridEngine);
        assert!(parse(&["--tag", "=oops"]).is_err());
    }
}
