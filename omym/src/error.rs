//! Error types for the organize pipeline
//!
//! Per-file failures are folded into a failed [`ProcessResult`] and never
//! show up here. What remains are the errors that end a batch or a command:
//! a state-store write that forced a rollback, a rollback that itself failed,
//! and invalid invocation.
//!
//! [`ProcessResult`]: crate::models::ProcessResult

use crate::services::metadata_extractor::MetadataError;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the organizer
pub type OrganizeResult<T> = Result<T, OrganizeError>;

/// Organizer error
#[derive(Debug, Error)]
pub enum OrganizeError {
    /// Error from the shared layer (database, I/O, configuration)
    #[error(transparent)]
    Common(#[from] omym_common::Error),

    /// Tag extraction failed
    #[error("Metadata extraction failed: {0}")]
    Metadata(#[from] MetadataError),

    /// Source path is neither a directory nor a supported file
    #[error("Not a directory or supported audio file: {0}")]
    NotADirectory(PathBuf),

    /// Target library lies inside the source tree
    #[error(
        "Refusing to organize {source_dir} into {target} (target is inside the source); use --force to override"
    )]
    UnsafeTarget { source_dir: PathBuf, target: PathBuf },

    /// A state write failed; the batch was rolled back cleanly
    #[error("Batch {process_id} for {directory} rolled back: {message}")]
    BatchAborted {
        process_id: String,
        directory: PathBuf,
        message: String,
    },

    /// Rolling back a failed batch failed too
    #[error("Rollback failed for batch {process_id} in {directory}: {source}")]
    DirectoryRollback {
        process_id: String,
        directory: PathBuf,
        #[source]
        source: omym_common::Error,
    },

    /// Restore stopped on a collision or move failure
    #[error("Restore aborted: {0}")]
    RestoreAborted(String),
}

impl From<sqlx::Error> for OrganizeError {
    fn from(err: sqlx::Error) -> Self {
        OrganizeError::Common(omym_common::Error::Database(err))
    }
}

impl From<std::io::Error> for OrganizeError {
    fn from(err: std::io::Error) -> Self {
        OrganizeError::Common(omym_common::Error::Io(err))
    }
}

impl From<serde_json::Error> for OrganizeError {
    fn from(err: serde_json::Error) -> Self {
        OrganizeError::Common(omym_common::Error::Serialization(err))
    }
}
