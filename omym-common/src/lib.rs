//! Shared building blocks for the omym music organizer
//!
//! Holds the pieces every omym binary needs before the pipeline starts:
//! the common error type, the TOML bootstrap configuration with its
//! platform default paths, and the embedded state-store bootstrap.

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
