//! Moving organized files back where they came from
//!
//! The plan comes from the after-state: every record whose target lies
//! under the restore source root goes back to its recorded original path
//! (or, with a destination root, to the same relative layout under it).
//! Quarantined files go back to their relative location. Lyrics and
//! artwork follow their track under the same collision policy.

use crate::db::maintenance::{after_records_under, clear_processing_state};
use crate::error::{OrganizeError, OrganizeResult};
use crate::models::{AssetKind, AssetOutcome, AssetResult, AssetSkipReason, ProcessingEvent};
use crate::services::assets::{find_artwork, find_lyrics, owns_artwork_on_disk};
use crate::services::directory_runner::new_process_id;
use crate::utils::fs::{is_same_file, move_file, remove_empty_directories};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use walkdir::WalkDir;

pub const DEFAULT_BACKUP_SUFFIX: &str = ".bak";

/// What to do when a restore destination is occupied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CollisionPolicy {
    /// Treat the collision as an error
    #[default]
    Abort,
    /// Leave the file where it is
    Skip,
    /// Rename the occupant, then restore
    Backup,
}

impl FromStr for CollisionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(CollisionPolicy::Abort),
            "skip" => Ok(CollisionPolicy::Skip),
            "backup" => Ok(CollisionPolicy::Backup),
            other => Err(format!("unknown collision policy: {}", other)),
        }
    }
}

/// Restore invocation
#[derive(Debug, Clone)]
pub struct RestoreRequest {
    /// Organized library (or part of it) to restore from
    pub source_root: PathBuf,
    /// Restore under this root instead of the original paths
    pub destination_root: Option<PathBuf>,
    pub dry_run: bool,
    pub collision_policy: CollisionPolicy,
    pub backup_suffix: String,
    pub continue_on_error: bool,
    pub limit: Option<usize>,
    /// Clear processing state after a clean real restore
    pub purge_state: bool,
    pub unprocessed_dir_name: String,
}

impl RestoreRequest {
    pub fn new(source_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            destination_root: None,
            dry_run: false,
            collision_policy: CollisionPolicy::default(),
            backup_suffix: DEFAULT_BACKUP_SUFFIX.to_string(),
            continue_on_error: false,
            limit: None,
            purge_state: false,
            unprocessed_dir_name: crate::config::DEFAULT_UNPROCESSED_DIR_NAME.to_string(),
        }
    }
}

/// One planned move back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestorePlanItem {
    /// `None` for quarantined files (never recorded)
    pub file_hash: Option<String>,
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Moved,
    /// Dry run: would have moved
    Planned,
    AlreadyRestored,
    SourceMissing,
    /// Destination occupied and the policy said skip
    DestinationExists,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct RestoreResult {
    pub item: RestorePlanItem,
    pub outcome: RestoreOutcome,
    /// Where an occupying file was moved aside to
    pub backup_path: Option<PathBuf>,
    pub assets: Vec<AssetResult>,
}

#[derive(Debug, Clone, Default)]
pub struct RestoreReport {
    pub process_id: String,
    pub results: Vec<RestoreResult>,
    pub moved: usize,
    pub skipped: usize,
    pub failed: usize,
    pub purged: bool,
}

/// Build the restore plan for `request`
pub async fn build_plan(pool: &SqlitePool, request: &RestoreRequest) -> OrganizeResult<Vec<RestorePlanItem>> {
    let root = &request.source_root;
    let records = after_records_under(pool, root, request.limit).await?;

    let mut plan: Vec<RestorePlanItem> = records
        .into_iter()
        .map(|record| {
            let destination_path = match &request.destination_root {
                Some(destination_root) => {
                    let relative = record
                        .target_path
                        .strip_prefix(root)
                        .unwrap_or(&record.target_path);
                    destination_root.join(relative)
                }
                None => record.file_path,
            };
            RestorePlanItem {
                file_hash: Some(record.file_hash),
                source_path: record.target_path,
                destination_path,
            }
        })
        .collect();

    let unprocessed_dir = root.join(&request.unprocessed_dir_name);
    if unprocessed_dir.is_dir() {
        let base = request.destination_root.as_deref().unwrap_or(root);
        let files = WalkDir::new(&unprocessed_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path());
        for file in files {
            if let Ok(relative) = file.strip_prefix(&unprocessed_dir) {
                plan.push(RestorePlanItem {
                    file_hash: None,
                    destination_path: base.join(relative),
                    source_path: file,
                });
            }
        }
    }

    if let Some(limit) = request.limit {
        plan.truncate(limit);
    }
    Ok(plan)
}

/// Execute a restore
///
/// Stops at the first failed item unless `continue_on_error` is set.
pub async fn restore(pool: &SqlitePool, request: &RestoreRequest) -> OrganizeResult<RestoreReport> {
    let process_id = new_process_id();
    let plan = build_plan(pool, request).await?;
    tracing::info!(
        process_id = %process_id,
        source = %request.source_root.display(),
        items = plan.len(),
        dry_run = request.dry_run,
        "Starting restore"
    );

    let mut report = RestoreReport {
        process_id: process_id.clone(),
        ..RestoreReport::default()
    };

    for item in plan {
        let result = restore_item(item, request, &process_id).await;
        match &result.outcome {
            RestoreOutcome::Moved | RestoreOutcome::Planned => report.moved += 1,
            RestoreOutcome::Failed(message) => {
                report.failed += 1;
                if !request.continue_on_error {
                    let message = format!("{}: {}", result.item.source_path.display(), message);
                    return Err(OrganizeError::RestoreAborted(message));
                }
            }
            _ => report.skipped += 1,
        }
        report.results.push(result);
    }

    if !request.dry_run {
        remove_empty_directories(&request.source_root);

        if request.purge_state && report.failed == 0 {
            clear_processing_state(pool).await?;
            report.purged = true;
            tracing::info!(process_id = %process_id, "Cleared processing state after restore");
        }
    }

    tracing::info!(
        process_id = %process_id,
        moved = report.moved,
        skipped = report.skipped,
        failed = report.failed,
        "Restore complete"
    );
    Ok(report)
}

async fn restore_item(item: RestorePlanItem, request: &RestoreRequest, process_id: &str) -> RestoreResult {
    let source = item.source_path.clone();
    let destination = item.destination_path.clone();

    // Decide artwork ownership before the track leaves the directory
    let owns_artwork = owns_artwork_on_disk(&source);
    let (outcome, backup_path) = place(&source, &destination, request).await;
    log_outcome(process_id, &source, &destination, &outcome);

    let mut assets = Vec::new();
    if matches!(outcome, RestoreOutcome::Moved | RestoreOutcome::Planned) {
        if let Some(lyrics) = find_lyrics(&source).into_iter().next() {
            let target = destination.with_extension("lrc");
            assets.push(place_asset(AssetKind::Lyrics, &lyrics, &target, request).await);
        }
        if owns_artwork {
            if let Some(dir) = destination.parent() {
                for artwork in find_artwork(&source) {
                    let Some(name) = artwork.file_name() else {
                        continue;
                    };
                    let target = dir.join(name);
                    assets.push(place_asset(AssetKind::Artwork, &artwork, &target, request).await);
                }
            }
        }
    }

    RestoreResult {
        item,
        outcome,
        backup_path,
        assets,
    }
}

fn log_outcome(process_id: &str, source: &Path, destination: &Path, outcome: &RestoreOutcome) {
    let event = match outcome {
        RestoreOutcome::Moved => ProcessingEvent::RestoreMove,
        RestoreOutcome::Planned => ProcessingEvent::RestorePlan,
        RestoreOutcome::Failed(_) => ProcessingEvent::RestoreError,
        _ => ProcessingEvent::RestoreSkip,
    };
    match outcome {
        RestoreOutcome::Failed(message) => tracing::warn!(
            event = %event, process_id, source = %source.display(), destination = %destination.display(),
            error = %message, "Restore failed"
        ),
        _ => tracing::info!(
            event = %event, process_id, source = %source.display(), destination = %destination.display(),
            outcome = ?outcome, "Restore"
        ),
    }
}

/// `<stem><suffix><ext>`, then `<stem><suffix>-<n><ext>`, whichever is free
pub fn backup_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let first = path.with_file_name(format!("{}{}{}", stem, suffix, extension));
    if !first.exists() {
        return first;
    }
    let mut n = 1u32;
    loop {
        let candidate = path.with_file_name(format!("{}{}-{}{}", stem, suffix, n, extension));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Move `source` to `destination` under the request's collision policy
async fn place(source: &Path, destination: &Path, request: &RestoreRequest) -> (RestoreOutcome, Option<PathBuf>) {
    if !source.exists() {
        return (RestoreOutcome::SourceMissing, None);
    }
    if source == destination || is_same_file(source, destination) {
        return (RestoreOutcome::AlreadyRestored, None);
    }

    let mut backup = None;
    if destination.exists() {
        match request.collision_policy {
            CollisionPolicy::Abort => {
                return (
                    RestoreOutcome::Failed(format!("Destination already exists: {}", destination.display())),
                    None,
                );
            }
            CollisionPolicy::Skip => return (RestoreOutcome::DestinationExists, None),
            CollisionPolicy::Backup => {
                let aside = backup_path(destination, &request.backup_suffix);
                if !request.dry_run {
                    if let Err(e) = tokio::fs::rename(destination, &aside).await {
                        return (
                            RestoreOutcome::Failed(format!("Failed to back up {}: {}", destination.display(), e)),
                            None,
                        );
                    }
                }
                backup = Some(aside);
            }
        }
    }

    if request.dry_run {
        return (RestoreOutcome::Planned, backup);
    }

    match move_file(source, destination).await {
        Ok(()) => (RestoreOutcome::Moved, backup),
        Err(e) => (RestoreOutcome::Failed(e.to_string()), backup),
    }
}

async fn place_asset(kind: AssetKind, source: &Path, target: &Path, request: &RestoreRequest) -> AssetResult {
    let (outcome, _) = place(source, target, request).await;
    let outcome = match outcome {
        RestoreOutcome::Moved => AssetOutcome::Moved,
        RestoreOutcome::Planned => AssetOutcome::Planned,
        RestoreOutcome::AlreadyRestored => AssetOutcome::Skipped(AssetSkipReason::AlreadyAtTarget),
        RestoreOutcome::SourceMissing => AssetOutcome::Skipped(AssetSkipReason::SourceMissing),
        RestoreOutcome::DestinationExists => AssetOutcome::Skipped(AssetSkipReason::TargetExists),
        RestoreOutcome::Failed(message) => AssetOutcome::Failed(message),
    };

    AssetResult {
        kind,
        source_path: source.to_path_buf(),
        target_path: Some(target.to_path_buf()),
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ports::{AfterStore, BeforeStore};
    use crate::db::test_support::memory_pool;
    use crate::models::TrackMetadata;
    use tempfile::TempDir;

    fn touch(path: &Path, content: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    async fn record(pool: &SqlitePool, hash: &str, original: &Path, target: &Path) {
        let mut conn = pool.acquire().await.unwrap();
        conn.record_before(hash, original, &TrackMetadata::default()).await.unwrap();
        conn.record_after(hash, original, target).await.unwrap();
    }

    #[test]
    fn test_collision_policy_parsing_and_backup_names() {
        assert_eq!("Backup".parse::<CollisionPolicy>(), Ok(CollisionPolicy::Backup));
        assert!("replace".parse::<CollisionPolicy>().is_err());

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("song.mp3");
        assert_eq!(backup_path(&path, ".bak"), temp_dir.path().join("song.bak.mp3"));

        touch(&temp_dir.path().join("song.bak.mp3"), b"x");
        assert_eq!(backup_path(&path, ".bak"), temp_dir.path().join("song.bak-1.mp3"));
    }

    #[tokio::test]
    async fn test_plan_uses_destination_root() {
        let pool = memory_pool().await;
        record(&pool, "h1", Path::new("/in/a.mp3"), Path::new("/lib/A/01_a.mp3")).await;

        let mut request = RestoreRequest::new("/lib");
        assert_eq!(
            build_plan(&pool, &request).await.unwrap()[0].destination_path,
            PathBuf::from("/in/a.mp3")
        );

        request.destination_root = Some(PathBuf::from("/restored"));
        assert_eq!(
            build_plan(&pool, &request).await.unwrap()[0].destination_path,
            PathBuf::from("/restored/A/01_a.mp3")
        );
    }

    #[tokio::test]
    async fn test_skip_and_backup_policies() {
        let pool = memory_pool().await;
        let temp_dir = TempDir::new().unwrap();
        let lib = temp_dir.path().join("lib");
        let target = lib.join("A/01_a.mp3");
        let original = temp_dir.path().join("in/a.mp3");
        touch(&target, b"organized");
        touch(&original, b"occupant");
        record(&pool, "h1", &original, &target).await;

        let mut request = RestoreRequest::new(&lib);
        request.collision_policy = CollisionPolicy::Skip;
        let report = restore(&pool, &request).await.unwrap();
        assert_eq!((report.moved, report.skipped), (0, 1));
        assert!(target.exists());

        request.collision_policy = CollisionPolicy::Backup;
        let report = restore(&pool, &request).await.unwrap();
        assert_eq!(report.moved, 1);
        assert_eq!(std::fs::read(&original).unwrap(), b"organized");
        assert_eq!(
            std::fs::read(temp_dir.path().join("in/a.bak.mp3")).unwrap(),
            b"occupant"
        );
        // Emptied library directories are pruned
        assert!(!lib.join("A").exists());
    }

    #[tokio::test]
    async fn test_abort_policy_stops_restore() {
        let pool = memory_pool().await;
        let temp_dir = TempDir::new().unwrap();
        let lib = temp_dir.path().join("lib");
        let target = lib.join("A/01_a.mp3");
        let original = temp_dir.path().join("in/a.mp3");
        touch(&target, b"organized");
        touch(&original, b"occupant");
        record(&pool, "h1", &original, &target).await;

        let result = restore(&pool, &RestoreRequest::new(&lib)).await;

        assert!(matches!(result, Err(OrganizeError::RestoreAborted(_))));
        assert!(target.exists());
    }
}
