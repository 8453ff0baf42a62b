//! Persistent state: before/after records, artist cache, preview cache
//!
//! Every store is a trait in [`ports`] implemented for
//! `sqlx::SqliteConnection`, so a batch passes `&mut *tx` and all writes
//! land in the batch transaction. [`dry_run::DryRunStore`] wraps any store
//! and keeps artist-cache writes in memory.

pub mod artist_cache;
pub mod dry_run;
pub mod maintenance;
pub mod ports;
pub mod preview;
pub mod processing;

pub use dry_run::DryRunStore;
pub use ports::{AfterStore, ArtistCacheStore, BeforeStore, CachedRomanization, PreviewStore, StateStore};

use std::path::{Path, PathBuf};

/// Paths are stored as (lossy) UTF-8 text
pub(crate) fn path_to_db(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub(crate) fn path_from_db(value: String) -> PathBuf {
    PathBuf::from(value)
}
