use std::fmt;

use clap::ValueEnum;
use regex::Regex;

use crate::queue::command::QueueCommands;

/// Queueing systems with a built in set of commands
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum QueueSystem {
    Slurm,
    Pbs,
    Lsf,
    GridEngine,
}

impl fmt::Display for QueueSystem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueueSystem::Slurm => write!(f, "slurm"),
            QueueSystem::Pbs => write!(f, "pbs"),
            QueueSystem::Lsf => write!(f, "lsf"),
            QueueSystem::GridEngine => write!(f, "grid-engine"),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// patterns are constants, a failure here is a bug
fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("valid queue output pattern")
}

impl QueueSystem {
    pub fn commands(&self) -> QueueCommands {
        match self {
            // sbatch --parsable prints "id" or "id;cluster"
            QueueSystem::Slurm => QueueCommands {
                submit: strings(&["sbatch", "--parsable"]),
                script_on_stdin: false,
                submit_pattern: pattern(r"^\s*(?P<job_id>\d+)"),
                list: strings(&["squeue", "--me", "--noheader", "--format=%i %t"]),
                // array tasks ("123_4", "123_[5-9]") and het job parts ("123+0") list under the parent id
                list_pattern: pattern(r"^\s*(?P<job_id>\d+)(?:[_+]\S*)?\s+(?P<status>[A-Z]+)\s*$"),
                empty_pattern: None,
                cancel: strings(&["scancel"]),
                queued_codes: strings(&["PD", "CF", "S", "ST", "RQ", "RH", "RF", "RS", "SE"]),
                running_codes: strings(&["R", "CG", "SO"]),
                done_codes: strings(&["CD", "F", "CA", "TO", "NF", "OOM", "BF", "DL", "PR"]),
            },
            // qsub prints "id.server", qstat truncates the server part
            QueueSystem::Pbs => QueueCommands {
                submit: strings(&["qsub"]),
                script_on_stdin: false,
                submit_pattern: pattern(r"^\s*(?P<job_id>\d+)"),
                list: strings(&["qstat"]),
                list_pattern: pattern(r"^\s*(?P<job_id>\d+)\S*\s+\S+\s+\S+\s+\S+\s+(?P<status>[A-Z])\s+\S+"),
                empty_pattern: None,
                cancel: strings(&["qdel"]),
                queued_codes: strings(&["Q", "H", "W", "T", "S"]),
                running_codes: strings(&["R", "E", "B"]),
                done_codes: strings(&["C", "F", "X"]),
            },
            // bsub reads the script from stdin
            QueueSystem::Lsf => QueueCommands {
                submit: strings(&["bsub"]),
                script_on_stdin: true,
                submit_pattern: pattern(r"Job <(?P<job_id>\d+)> is submitted"),
                list: strings(&["bjobs", "-noheader", "-o", "jobid stat"]),
                list_pattern: pattern(r"^\s*(?P<job_id>\d+)\s+(?P<status>[A-Z]+)\s*$"),
                empty_pattern: Some(pattern(r"No unfinished job found")),
                cancel: strings(&["bkill"]),
                queued_codes: strings(&["PEND", "PSUSP", "USUSP", "SSUSP", "WAIT"]),
                running_codes: strings(&["RUN", "PROV"]),
                done_codes: strings(&["DONE", "EXIT"]),
            },
            QueueSystem::GridEngine => QueueCommands {
                submit: strings(&["qsub", "-cwd"]),
                script_on_stdin: false,
                submit_pattern: pattern(r"Your job (?P<job_id>\d+)"),
                list: strings(&["qstat"]),
                list_pattern: pattern(r"^\s*(?P<job_id>\d+)\s+\S+\s+\S+\s+\S+\s+(?P<status>[a-zA-Z]+)\s"),
                empty_pattern: None,
                cancel: strings(&["qdel"]),
                queued_codes: strings(&["qw", "hqw", "hRwq", "Eqw", "s", "S", "T"]),
                running_codes: strings(&["r", "t", "Rr", "Rt", "dr", "dt"]),
                done_codes: Vec::new(),
            },
        }
    }
}
