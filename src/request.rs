//! Job manifests: one JSON file per job, validated against a bundled schema

/// Find manifests on disk
pub mod read;
/// Validate and deserialise a manifest into a job definition
pub mod message;
/// The bundled manifest schema
pub mod schema;
/// Hooks driven by a manifest directory
pub mod hooks;

pub use hooks::ManifestHooks;
