use std::path::PathBuf;

use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};

use crate::job::{JobDefinition, JobRecord, JobState};

static COLUMNS: &str = "name, arguments, folder, state, external_id, submit_attempts, seen_in_queue, \
     missed_polls, query_failures, last_error, created_at, updated_at";

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn from_row(row: &Row) -> rusqlite::Result<JobRecord> {
    let arguments: String = row.get(1)?;
    let folder: String = row.get(2)?;
    let state: String = row.get(3)?;

    Ok(JobRecord {
        definition: JobDefinition {
            name: row.get(0)?,
            arguments: serde_json::from_str(&arguments).map_err(|err| conversion_error(1, err))?,
        },
        folder: PathBuf::from(folder),
        state: state.parse::<JobState>().map_err(|err| conversion_error(3, err))?,
        external_id: row.get(4)?,
        submit_attempts: row.get(5)?,
        seen_in_queue: row.get(6)?,
        missed_polls: row.get(7)?,
        query_failures: row.get(8)?,
        last_error: row.get(9)?,
        next_poll_at: None,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

/// Insert or overwrite the row of `job`
pub fn save(conn: &Connection, job: &JobRecord) -> rusqlite::Result<()> {
    let arguments = serde_json::to_string(job.arguments()).map_err(|err| conversion_error(1, err))?;
    conn.execute(
        &format!("INSERT OR REPLACE INTO job ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"),
        params![
            job.name(),
            arguments,
            job.folder.display().to_string(),
            job.state.as_str(),
            job.external_id,
            job.submit_attempts,
            job.seen_in_queue,
            job.missed_polls,
            job.query_failures,
            job.last_error,
            job.created_at,
            job.updated_at,
        ],
    )?;
    Ok(())
}

/// Jobs that haven't reached a terminal state, in admission order
pub fn load_live(conn: &Connection) -> rusqlite::Result<Vec<JobRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM job WHERE state NOT IN ('done', 'failed') ORDER BY created_at, rowid"
    ))?;
    let jobs = stmt.query_map([], from_row)?.collect::<rusqlite::Result<Vec<JobRecord>>>()?;
    Ok(jobs)
}

/// Names of every job in the run, terminal ones included
pub fn load_names(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM job")?;
    let names = stmt.query_map([], |row| row.get(0))?.collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}

/// A single job by name, whatever its state
pub fn load_one(conn: &Connection, name: &str) -> rusqlite::Result<Option<JobRecord>> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM job WHERE name = ?1"))?;
    let job = stmt.query_map([name], from_row)?.next().transpose()?;
    Ok(job)
}
