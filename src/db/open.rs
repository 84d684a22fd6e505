use std::fs;
use std::path::Path;

use log::{info, warn};
use rusqlite::Connection;

pub fn open_db(path: &Path) -> rusqlite::Result<Connection> {
    if !path.exists() {
        info!("Creating new database {}", path.display());
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                warn!("Can't create database directory {}: {}", parent.display(), err);
                rusqlite::Error::InvalidPath(parent.to_path_buf())
            })?;
        }
    }
    let conn = Connection::open(path)?;

    static SCHEMA: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/db/schema.sql"));
    conn.execute_batch(SCHEMA)?;

    Ok(conn)
}

/// Forget a previous run
pub fn clear(conn: &Connection) -> rusqlite::Result<()> {
    info!("Clearing previous run from database");
    conn.execute_batch("DELETE FROM job; DELETE FROM run;")
}
