//! omym: organize a music collection into a deterministic library layout
//!
//! Files are moved to `Artist/YYYY_Album/[D{n}_]{track}_{title}_{artistid}.ext`
//! under a library root. Every move is recorded in an embedded SQLite store
//! so repeated runs are idempotent and a library can be restored.
//!
//! The crate is used by the `omym` binary and by the integration tests.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{OrganizeError, OrganizeResult};
pub use crate::models::{DirectoryReport, ProcessResult, TrackMetadata};
pub use crate::services::{MusicProcessor, ProcessorOptions};
