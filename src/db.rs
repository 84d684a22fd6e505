//! All run state is stored in a SQLite database
//!
//! The database holds one `run` row and one `job` row per job ever admitted. Terminal jobs are
//! kept with their last error so a finished run can still be inspected.

/// Connect to a SQLite database
pub mod open;
/// Mapping between job rows and job records
pub mod job;
/// Rebuild the run state after a restart
pub mod load;
/// Write the run state at the end of every cycle
pub mod checkpoint;
