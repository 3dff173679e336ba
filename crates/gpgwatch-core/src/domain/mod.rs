//! Domain entities
//!
//! - Watched entries and encrypted artifacts, with their naming rules
//! - Destination selection and remote folder references
//! - The per-file pipeline state machine and its report
//! - Domain-specific error types

pub mod artifact;
pub mod destination;
pub mod errors;
pub mod newtypes;
pub mod pipeline;

pub use artifact::{
    artifact_file_name, artifact_path_for, numbered_artifact_name, source_file_name,
    EncryptedArtifact, WatchedEntry, ARTIFACT_SUFFIX,
};
pub use destination::{CloudBackend, Destination, DEFAULT_MAX_COLLISION_ATTEMPTS};
pub use errors::DomainError;
pub use newtypes::*;
pub use pipeline::{PipelineOutcome, PipelineReport, PipelineState};
