use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use log::warn;

use crate::job::state::UnknownState;
use crate::job::{JobRecord, JobState};

/// Phases of a run, in order
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Init,
    Active,
    Draining,
    Done,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::Active => "active",
            Phase::Draining => "draining",
            Phase::Done => "done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Phase {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(Phase::Init),
            "active" => Ok(Phase::Active),
            "draining" => Ok(Phase::Draining),
            "done" => Ok(Phase::Done),
            other => Err(UnknownState(other.to_string())),
        }
    }
}

/// Everything the scheduler has to remember between cycles and across restarts
#[derive(Debug, Clone, PartialEq)]
pub struct RunState {
    pub phase: Phase,
    /// Bumped on every admission, used to make job names unique
    pub name_counter: u64,
    /// The hooks have no more jobs
    pub exhausted: bool,
    pub completed: u64,
    pub failed: u64,
    /// Records that aren't terminal, in admission order
    pub jobs: Vec<JobRecord>,
    /// Records that became terminal since the last checkpoint
    pub retired: Vec<JobRecord>,
    /// Every name handed out during the run
    names: HashSet<String>,
}

impl RunState {
    pub fn fresh() -> Self {
        RunState {
            phase: Phase::Init,
            name_counter: 0,
            exhausted: false,
            completed: 0,
            failed: 0,
            jobs: Vec::new(),
            retired: Vec::new(),
            names: HashSet::new(),
        }
    }

    /// Rebuild a state from persisted parts
    pub fn restore(
        phase: Phase,
        name_counter: u64,
        exhausted: bool,
        (completed, failed): (u64, u64),
        jobs: Vec<JobRecord>,
        names: HashSet<String>,
    ) -> Self {
        let mut names = names;
        names.extend(jobs.iter().map(|job| job.name().to_string()));
        RunState { phase, name_counter, exhausted, completed, failed, jobs, retired: Vec::new(), names }
    }

    /// Records holding an admission slot
    pub fn in_flight(&self) -> usize {
        self.jobs.iter().filter(|job| job.state.holds_slot()).count()
    }

    /// Records the queue is looking after
    pub fn outstanding(&self) -> usize {
        self.jobs.iter().filter(|job| job.state.is_outstanding()).count()
    }

    /// Nothing left to generate and nothing left to track
    pub fn is_drained(&self) -> bool {
        self.exhausted && self.jobs.is_empty()
    }

    pub fn name_taken(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Claim a unique name for a newly admitted job
    ///
    /// An empty request becomes `job_<counter>`, a name already used in this run gets the counter
    /// appended.
    pub fn claim_name(&mut self, requested: &str) -> String {
        self.name_counter += 1;
        if !requested.is_empty() && !self.names.contains(requested) {
            self.names.insert(requested.to_string());
            return requested.to_string();
        }

        let base = if requested.is_empty() { "job" } else { requested };
        let mut name = format!("{}_{}", base, self.name_counter);
        while self.names.contains(&name) {
            self.name_counter += 1;
            name = format!("{}_{}", base, self.name_counter);
        }
        if !requested.is_empty() {
            warn!("Job name {requested} already used in this run, renaming to {name}");
        }
        self.names.insert(name.clone());
        name
    }

    /// Move terminal records out of `jobs`, counting them
    pub fn retire_terminal(&mut self) {
        let (done, live): (Vec<JobRecord>, Vec<JobRecord>) =
            self.jobs.drain(..).partition(|job| job.state.is_terminal());
        self.jobs = live;
        for job in done {
            match job.state {
                JobState::Done => self.completed += 1,
                _ => self.failed += 1,
            }
            self.retired.push(job);
        }
    }
}
