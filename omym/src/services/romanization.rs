//! Artist-name romanization scheduling
//!
//! Each distinct artist name (trimmed) is decided once per coordinator:
//!
//! 1. A non-blank user preference wins.
//! 2. A cached romanization is reused unless it still contains non-Latin
//!    letters (a bad historical entry).
//! 3. Latin names pass through unchanged.
//! 4. Everything else is queued to a single worker that asks the external
//!    lookup and falls back to local transliteration.
//!
//! `ensure_scheduled` is called during the pre-scan so lookups overlap with
//! tag extraction of later files; `await_result` is called when a file
//! actually needs the name.

use crate::config::ArtistNamePreferences;
use crate::db::ports::ArtistCacheStore;
use crate::models::RomanizationSource;
use crate::services::transliteration::{detect_script, is_latin_text, romanize_fallback};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Separator for multi-artist tags ("A, B")
const NAME_SEPARATOR: &str = ", ";

/// External source of romanized artist names
#[async_trait]
pub trait RomanizationLookup: Send + Sync {
    /// Romanized form of `name`, or `None` when the source has no answer
    async fn fetch(&self, name: &str) -> Option<String>;
}

/// Decided romanization for one artist name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Romanized {
    pub name: String,
    /// `None` when the name was kept as-is
    pub source: Option<RomanizationSource>,
}

impl Romanized {
    fn unchanged(name: &str) -> Self {
        Self {
            name: name.to_string(),
            source: None,
        }
    }
}

enum Entry {
    Ready { result: Romanized, persisted: bool },
    Pending(oneshot::Receiver<Romanized>),
}

struct Job {
    name: String,
    reply: oneshot::Sender<Romanized>,
}

/// Memoizing romanization scheduler backed by one worker task
pub struct RomanizationCoordinator {
    preferences: ArtistNamePreferences,
    entries: HashMap<String, Entry>,
    jobs: mpsc::UnboundedSender<Job>,
    worker: JoinHandle<()>,
}

impl RomanizationCoordinator {
    /// Create a coordinator; `lookup = None` transliterates locally only
    ///
    /// Must be called inside a Tokio runtime (spawns the worker).
    pub fn new(
        preferences: ArtistNamePreferences,
        lookup: Option<Arc<dyn RomanizationLookup>>,
    ) -> Self {
        let (jobs, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(receiver, lookup));

        Self {
            preferences,
            entries: HashMap::new(),
            jobs,
            worker,
        }
    }

    pub fn preferences(&self) -> &ArtistNamePreferences {
        &self.preferences
    }

    pub fn preferences_mut(&mut self) -> &mut ArtistNamePreferences {
        &mut self.preferences
    }

    /// Make sure a decision for `name` is resolved or in flight
    pub async fn ensure_scheduled<S>(&mut self, cache: &mut S, name: &str)
    where
        S: ArtistCacheStore + ?Sized,
    {
        let key = name.trim();
        if key.is_empty() || self.entries.contains_key(key) {
            return;
        }

        let entry = self.decide(cache, key).await;
        self.entries.insert(key.to_string(), entry);
    }

    async fn decide<S>(&mut self, cache: &mut S, key: &str) -> Entry
    where
        S: ArtistCacheStore + ?Sized,
    {
        if let Some(preferred) = self.preferences.resolve(key) {
            tracing::debug!(artist = key, romanized = preferred, "Using artist name preference");
            return ready(preferred, Some(RomanizationSource::UserPreference));
        }

        if !is_latin_text(key) && self.preferences.ensure_placeholder(key) {
            tracing::debug!(artist = key, "Added artist name preference placeholder");
        }

        match cache.romanized_name(key).await {
            Ok(Some(cached)) if is_usable_romanization(&cached.romanized_name) => {
                let mut entry = ready(&cached.romanized_name, Some(RomanizationSource::Cache));
                if let Entry::Ready { persisted, .. } = &mut entry {
                    *persisted = true;
                }
                return entry;
            }
            Ok(Some(cached)) => {
                tracing::debug!(
                    artist = key,
                    cached = %cached.romanized_name,
                    "Discarding cached romanization with non-Latin characters"
                );
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(artist = key, error = %e, "Romanization cache lookup failed");
            }
        }

        if !needs_romanization(key) {
            return ready(key, None);
        }

        let (reply, receiver) = oneshot::channel();
        let job = Job {
            name: key.to_string(),
            reply,
        };
        if self.jobs.send(job).is_err() {
            tracing::warn!(artist = key, "Romanization worker stopped; keeping original name");
            return ready(key, None);
        }
        Entry::Pending(receiver)
    }

    /// Wait for the decision for `name` and persist it when it changed the name
    ///
    /// Never fails: any problem yields the original name.
    pub async fn await_result<S>(&mut self, cache: &mut S, name: &str) -> Romanized
    where
        S: ArtistCacheStore + ?Sized,
    {
        let key = name.trim();
        if key.is_empty() {
            return Romanized::unchanged(name);
        }

        self.ensure_scheduled(cache, key).await;

        let (result, persisted) = self.settle(key).await;
        if !persisted {
            persist(cache, key, &result).await;
        }

        // Writes into a dry-run overlay do not count
        self.entries.insert(
            key.to_string(),
            Entry::Ready {
                result: result.clone(),
                persisted: persisted || cache.persists_writes(),
            },
        );
        result
    }

    /// Wait for an already scheduled decision without persisting it
    ///
    /// Returns `None` for names that were never scheduled. The decision is
    /// persisted by the next `await_result` for the same name.
    pub async fn peek_result(&mut self, name: &str) -> Option<Romanized> {
        let key = name.trim();
        if !self.entries.contains_key(key) {
            return None;
        }

        let (result, persisted) = self.settle(key).await;
        self.entries.insert(
            key.to_string(),
            Entry::Ready {
                result: result.clone(),
                persisted,
            },
        );
        Some(result)
    }

    async fn settle(&mut self, key: &str) -> (Romanized, bool) {
        match self.entries.remove(key) {
            Some(Entry::Ready { result, persisted }) => (result, persisted),
            Some(Entry::Pending(receiver)) => match receiver.await {
                Ok(result) => (result, false),
                Err(_) => {
                    tracing::warn!(artist = key, "Romanization task failed; keeping original name");
                    (Romanized::unchanged(key), true)
                }
            },
            None => (Romanized::unchanged(key), true),
        }
    }
}

impl Drop for RomanizationCoordinator {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

fn ready(name: &str, source: Option<RomanizationSource>) -> Entry {
    Entry::Ready {
        result: Romanized {
            name: name.to_string(),
            source,
        },
        persisted: false,
    }
}

fn is_usable_romanization(value: &str) -> bool {
    !value.trim().is_empty() && is_latin_text(value)
}

fn needs_romanization(name: &str) -> bool {
    name.split(NAME_SEPARATOR)
        .any(|part| detect_script(part).needs_romanization())
}

async fn persist<S>(cache: &mut S, key: &str, result: &Romanized)
where
    S: ArtistCacheStore + ?Sized,
{
    let Some(source) = result.source else {
        return;
    };
    if source == RomanizationSource::Cache || result.name == key {
        return;
    }

    if let Err(e) = cache.upsert_romanized_name(key, &result.name, source).await {
        tracing::warn!(
            artist = key,
            romanized = %result.name,
            error = %e,
            "Failed to cache romanized artist name"
        );
    }
}

async fn run_worker(
    mut jobs: mpsc::UnboundedReceiver<Job>,
    lookup: Option<Arc<dyn RomanizationLookup>>,
) {
    while let Some(job) = jobs.recv().await {
        let lookup = lookup.clone();
        let name = job.name.clone();

        // A panicking lookup only loses this job
        let task = tokio::spawn(async move { romanize(lookup.as_deref(), &name).await });
        match task.await {
            Ok(result) => {
                let _ = job.reply.send(result);
            }
            Err(e) => {
                tracing::error!(artist = %job.name, error = %e, "Romanization task panicked");
            }
        }
    }
}

async fn romanize(lookup: Option<&dyn RomanizationLookup>, name: &str) -> Romanized {
    let mut parts = Vec::new();
    let mut used_lookup = false;
    let mut used_fallback = false;

    for part in name.split(NAME_SEPARATOR) {
        if !detect_script(part).needs_romanization() {
            parts.push(part.to_string());
            continue;
        }

        let fetched = match lookup {
            Some(lookup) => lookup
                .fetch(part)
                .await
                .map(|v| v.trim().to_string())
                .filter(|v| is_usable_romanization(v)),
            None => None,
        };

        match fetched {
            Some(value) => {
                used_lookup = true;
                parts.push(value);
            }
            None => {
                let fallback = romanize_fallback(part);
                if fallback.trim().is_empty() {
                    parts.push(part.to_string());
                } else {
                    used_fallback = true;
                    parts.push(fallback);
                }
            }
        }
    }

    let source = if used_fallback {
        Some(RomanizationSource::FallbackTransliteration)
    } else if used_lookup {
        Some(RomanizationSource::ExternalLookup)
    } else {
        None
    };

    let romanized = Romanized {
        name: parts.join(NAME_SEPARATOR),
        source,
    };
    tracing::debug!(artist = name, romanized = %romanized.name, source = ?romanized.source, "Romanized artist name");
    romanized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::dry_run::DryRunStore;
    use crate::db::test_support::memory_pool;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLookup {
        answer: Option<String>,
        calls: AtomicUsize,
    }

    impl CountingLookup {
        fn new(answer: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                answer: answer.map(str::to_string),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RomanizationLookup for CountingLookup {
        async fn fetch(&self, _name: &str) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    struct PanickingLookup;

    #[async_trait]
    impl RomanizationLookup for PanickingLookup {
        async fn fetch(&self, name: &str) -> Option<String> {
            if name == "ひかる" {
                panic!("lookup exploded");
            }
            Some("Sakura".to_string())
        }
    }

    fn coordinator(lookup: Option<Arc<dyn RomanizationLookup>>) -> RomanizationCoordinator {
        RomanizationCoordinator::new(ArtistNamePreferences::default(), lookup)
    }

    #[tokio::test]
    async fn test_lookup_runs_once_per_name() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let lookup = CountingLookup::new(Some("Utada Hikaru"));
        let mut coordinator = coordinator(Some(lookup.clone()));

        coordinator.ensure_scheduled(&mut *conn, "宇多田ヒカル").await;
        coordinator.ensure_scheduled(&mut *conn, " 宇多田ヒカル ").await;
        let first = coordinator.await_result(&mut *conn, "宇多田ヒカル").await;
        let second = coordinator.await_result(&mut *conn, "宇多田ヒカル").await;

        assert_eq!(first.name, "Utada Hikaru");
        assert_eq!(first.source, Some(RomanizationSource::ExternalLookup));
        assert_eq!(first, second);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);

        let cached = conn.romanized_name("宇多田ヒカル").await.unwrap().unwrap();
        assert_eq!(cached.romanized_name, "Utada Hikaru");
        assert_eq!(cached.source, Some(RomanizationSource::ExternalLookup));
    }

    #[tokio::test]
    async fn test_latin_names_pass_through() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let lookup = CountingLookup::new(Some("Wrong"));
        let mut coordinator = coordinator(Some(lookup.clone()));

        let result = coordinator.await_result(&mut *conn, "Björk").await;

        assert_eq!(result, Romanized::unchanged("Björk"));
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
        assert!(coordinator.preferences().entries().is_empty());
    }

    #[tokio::test]
    async fn test_preference_wins_over_lookup() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let lookup = CountingLookup::new(Some("From Lookup"));
        let mut preferences = ArtistNamePreferences::default();
        preferences.set("ヨルシカ", "Yorushika").unwrap();
        let mut coordinator = RomanizationCoordinator::new(preferences, Some(lookup.clone()));

        let result = coordinator.await_result(&mut *conn, "ヨルシカ").await;

        assert_eq!(result.name, "Yorushika");
        assert_eq!(result.source, Some(RomanizationSource::UserPreference));
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_garbled_cache_entry_is_discarded() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        conn.upsert_romanized_name("ひかる", "ひかる?", RomanizationSource::ExternalLookup)
            .await
            .unwrap();
        let lookup = CountingLookup::new(None);
        let mut coordinator = coordinator(Some(lookup.clone()));

        let result = coordinator.await_result(&mut *conn, "ひかる").await;

        assert_eq!(result.name, "Hikaru");
        assert_eq!(result.source, Some(RomanizationSource::FallbackTransliteration));
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_valid_cache_entry_is_reused() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        conn.upsert_romanized_name("ひかる", "Hikaru Cached", RomanizationSource::ExternalLookup)
            .await
            .unwrap();
        let lookup = CountingLookup::new(Some("Other"));
        let mut coordinator = coordinator(Some(lookup.clone()));

        let result = coordinator.await_result(&mut *conn, "ひかる").await;

        assert_eq!(result.name, "Hikaru Cached");
        assert_eq!(result.source, Some(RomanizationSource::Cache));
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_multi_artist_tags_are_romanized_per_part() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut coordinator = coordinator(None);

        let result = coordinator.await_result(&mut *conn, "ひかる, Queen").await;

        assert_eq!(result.name, "Hikaru, Queen");
        assert_eq!(result.source, Some(RomanizationSource::FallbackTransliteration));
        assert!(coordinator.preferences().is_dirty());
    }

    #[tokio::test]
    async fn test_peek_does_not_persist() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let lookup = CountingLookup::new(Some("Yoasobi"));
        let mut coordinator = coordinator(Some(lookup.clone()));

        assert_eq!(coordinator.peek_result("ヨアソビ").await, None);
        coordinator.ensure_scheduled(&mut *conn, "ヨアソビ").await;
        let peeked = coordinator.peek_result("ヨアソビ").await.unwrap();
        assert_eq!(peeked.name, "Yoasobi");
        assert_eq!(conn.romanized_name("ヨアソビ").await.unwrap(), None);

        let awaited = coordinator.await_result(&mut *conn, "ヨアソビ").await;
        assert_eq!(awaited, peeked);
        assert!(conn.romanized_name("ヨアソビ").await.unwrap().is_some());
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dry_run_decision_is_persisted_by_real_run() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let lookup = CountingLookup::new(Some("Hikaru"));
        let mut coordinator = coordinator(Some(lookup.clone()));

        {
            let mut overlay = DryRunStore::new(&mut *conn);
            let planned = coordinator.await_result(&mut overlay, "ひかる").await;
            assert_eq!(planned.name, "Hikaru");
            assert!(overlay.romanized_name("ひかる").await.unwrap().is_some());
        }
        assert_eq!(conn.romanized_name("ひかる").await.unwrap(), None);

        let organized = coordinator.await_result(&mut *conn, "ひかる").await;
        assert_eq!(organized.name, "Hikaru");
        let cached = conn.romanized_name("ひかる").await.unwrap().unwrap();
        assert_eq!(cached.romanized_name, "Hikaru");
        assert_eq!(cached.source, Some(RomanizationSource::ExternalLookup));
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_lookup_keeps_original_name() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut coordinator = coordinator(Some(Arc::new(PanickingLookup)));

        let failed = coordinator.await_result(&mut *conn, "ひかる").await;
        assert_eq!(failed, Romanized::unchanged("ひかる"));
        assert_eq!(conn.romanized_name("ひかる").await.unwrap(), None);

        // The worker survives and serves the next name
        let next = coordinator.await_result(&mut *conn, "さくら").await;
        assert_eq!(next.name, "Sakura");
    }
}
