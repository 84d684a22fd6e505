//! Jobs and their lifecycle
//!
//! A job is born from a [record::JobDefinition] returned by the hooks and tracked as a
//! [record::JobRecord] until it reaches one of the terminal [state::JobState]s.

pub mod record;
pub mod state;

pub use record::{JobDefinition, JobRecord};
pub use state::{JobState, TransitionError};
