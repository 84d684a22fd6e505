use chrono::Utc;
use log::debug;
use rusqlite::{params, Connection};

use crate::db::job;
use crate::scheduler::RunState;

/// Persist `state` in one transaction
///
/// Retired records are written once and then dropped from memory.
pub fn checkpoint(conn: &mut Connection, state: &mut RunState) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT OR REPLACE INTO run (id, phase, name_counter, exhausted, completed, failed, updated_at)
         VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            state.phase.as_str(),
            state.name_counter as i64,
            state.exhausted,
            state.completed as i64,
            state.failed as i64,
            Utc::now(),
        ],
    )?;
    for record in state.jobs.iter().chain(state.retired.iter()) {
        job::save(&tx, record)?;
    }

    tx.commit()?;
    debug!("Checkpointed {} live and {} retired jobs", state.jobs.len(), state.retired.len());
    state.retired.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::json;

    use super::*;
    use crate::db::load::load_run;
    use crate::db::open::{clear, open_db};
    use crate::job::{JobDefinition, JobRecord, JobState};
    use crate::scheduler::Phase;

    fn record(state: &mut RunState, name: &str, job_state: JobState, id: Option<&str>) {
        let name = state.claim_name(name);
        let mut job = JobRecord::new(JobDefinition::new(&name, json!({"cores": 2})), PathBuf::from("/w").join(&name));
        job.state = job_state;
        job.external_id = id.map(str::to_string);
        state.jobs.push(job);
    }

    #[test]
    fn restart_sees_live_jobs_and_keeps_retired_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.db");
        let mut conn = open_db(&path).unwrap();
        assert_eq!(load_run(&conn).unwrap(), None);

        let mut state = RunState::fresh();
        state.phase = Phase::Active;
        record(&mut state, "a", JobState::Queued, Some("101"));
        record(&mut state, "b", JobState::Running, Some("102"));
        record(&mut state, "c", JobState::Failed, Some("103"));
        state.jobs[2].last_error = Some("finish hook: missing output".to_string());
        state.retire_terminal();
        checkpoint(&mut conn, &mut state).unwrap();
        assert!(state.retired.is_empty());
        drop(conn);

        let conn = open_db(&path).unwrap();
        let mut loaded = load_run(&conn).unwrap().unwrap();
        assert_eq!(loaded.phase, Phase::Active);
        assert_eq!(loaded.name_counter, 3);
        assert_eq!(loaded.failed, 1);
        let live: Vec<(&str, JobState, Option<&str>)> = loaded
            .jobs
            .iter()
            .map(|j| (j.name(), j.state, j.external_id.as_deref()))
            .collect();
        assert_eq!(live, vec![("a", JobState::Queued, Some("101")), ("b", JobState::Running, Some("102"))]);
        assert_eq!(loaded.jobs[0].arguments(), &json!({"cores": 2}));
        assert!(loaded.name_taken("c"));
        assert_eq!(loaded.claim_name("c"), "c_4");

        let failed = job::load_one(&conn, "c").unwrap().unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.last_error.as_deref(), Some("finish hook: missing output"));
    }

    #[test]
    fn clear_forgets_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = open_db(&dir.path().join("run.db")).unwrap();
        let mut state = RunState::fresh();
        record(&mut state, "a", JobState::Queued, Some("1"));
        checkpoint(&mut conn, &mut state).unwrap();

        clear(&conn).unwrap();
        assert_eq!(load_run(&conn).unwrap(), None);
        assert_eq!(job::load_one(&conn, "a").unwrap(), None);
    }
}
