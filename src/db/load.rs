use std::collections::HashSet;

use log::info;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension};

use crate::db::job;
use crate::scheduler::{Phase, RunState};

/// Load the persisted run, if the database holds one
///
/// Only jobs that aren't terminal come back as records. The names of terminal jobs are kept so
/// they can't be handed out again.
pub fn load_run(conn: &Connection) -> rusqlite::Result<Option<RunState>> {
    let row = conn
        .query_row(
            "SELECT phase, name_counter, exhausted, completed, failed FROM run WHERE id = 1",
            [],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, bool>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            },
        )
        .optional()?;

    let (phase, name_counter, exhausted, completed, failed) = match row {
        Some(row) => row,
        None => return Ok(None),
    };
    let phase = phase
        .parse::<Phase>()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(err)))?;

    let jobs = job::load_live(conn)?;
    let names: HashSet<String> = job::load_names(conn)?.into_iter().collect();
    info!(
        "Loaded run in phase {phase}: {} live jobs, {} jobs in total, generator exhausted: {exhausted}",
        jobs.len(),
        names.len()
    );

    Ok(Some(RunState::restore(
        phase,
        name_counter as u64,
        exhausted,
        (completed as u64, failed as u64),
        jobs,
        names,
    )))
}
