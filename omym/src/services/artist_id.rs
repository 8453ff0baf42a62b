//! Short artist identifiers
//!
//! Every generated file name ends in a code of at most five characters
//! derived from the artist name, so tracks by different artists with the
//! same title never share a name.
//!
//! **Algorithm:**
//! 1. Blank name -> `NOART`
//! 2. Transliterate (Hepburn for Japanese/Chinese, ASCII folding otherwise)
//! 3. Sanitize and uppercase; nothing alphanumeric left -> `XXXXX`
//! 4. Per hyphen-separated word keep the first character and drop the
//!    remaining vowels
//! 5. If that is shorter than five characters, use the full words instead
//! 6. Take the first five characters (no padding)

use crate::db::ports::ArtistCacheStore;
use crate::services::sanitizer::sanitize;
use crate::services::transliteration::{detect_script, fold_ascii, hepburn};
use std::time::Duration;

/// Identifier length
pub const ID_LENGTH: usize = 5;
/// Identifier for a missing artist
pub const NO_ARTIST_ID: &str = "NOART";
/// Identifier for a name with nothing usable in it
pub const UNREADABLE_ARTIST_ID: &str = "XXXXX";

const UPSERT_ATTEMPTS: u32 = 3;
const UPSERT_BACKOFF: Duration = Duration::from_millis(100);

fn is_vowel(c: char) -> bool {
    matches!(c, 'A' | 'E' | 'I' | 'O' | 'U')
}

/// Generate the identifier for `artist_name`
pub fn generate(artist_name: &str) -> String {
    let name = artist_name.trim();
    if name.is_empty() {
        return NO_ARTIST_ID.to_string();
    }

    let transliterated = if detect_script(name).needs_romanization() {
        hepburn(name)
    } else {
        fold_ascii(name)
    };

    let cleaned = sanitize(&transliterated, None, false).to_uppercase();
    if !cleaned.chars().any(|c| c.is_ascii_alphanumeric()) {
        return UNREADABLE_ARTIST_ID.to_string();
    }

    let words: Vec<&str> = cleaned.split('-').filter(|w| !w.is_empty()).collect();

    let stripped: String = words
        .iter()
        .flat_map(|word| {
            let mut chars = word.chars();
            chars
                .next()
                .into_iter()
                .chain(chars.filter(|c| !is_vowel(*c)))
        })
        .collect();

    let chosen = if stripped.chars().count() < ID_LENGTH {
        words.concat()
    } else {
        stripped
    };

    chosen.chars().take(ID_LENGTH).collect()
}

/// True for a well-formed identifier (1-5 of `[A-Z0-9-]`) or a sentinel
pub fn is_valid(id: &str) -> bool {
    if id == NO_ARTIST_ID || id == UNREADABLE_ARTIST_ID {
        return true;
    }
    let len = id.chars().count();
    (1..=ID_LENGTH).contains(&len)
        && id
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
}

fn is_sentinel(id: &str) -> bool {
    id == NO_ARTIST_ID || id == UNREADABLE_ARTIST_ID
}

/// Identifier for `artist_name`, served from and written back to the cache
///
/// Cache failures never fail the caller: a failed read regenerates, and a
/// write that still fails after three attempts is logged and skipped.
pub async fn cached_artist_id<S>(store: &mut S, artist_name: &str) -> String
where
    S: ArtistCacheStore + ?Sized,
{
    let name = artist_name.trim();
    if name.is_empty() {
        return NO_ARTIST_ID.to_string();
    }

    match store.artist_id(name).await {
        Ok(Some(cached)) if is_valid(&cached) && !is_sentinel(&cached) => return cached,
        Ok(Some(invalid)) => {
            tracing::debug!(artist = name, cached = %invalid, "Regenerating invalid cached artist ID");
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(artist = name, error = %e, "Artist cache lookup failed");
        }
    }

    let id = generate(name);
    if is_sentinel(&id) {
        return id;
    }

    for attempt in 1..=UPSERT_ATTEMPTS {
        match store.upsert_artist_id(name, &id).await {
            Ok(()) => break,
            Err(e) if attempt < UPSERT_ATTEMPTS => {
                tracing::debug!(artist = name, attempt, error = %e, "Retrying artist ID upsert");
                tokio::time::sleep(UPSERT_BACKOFF).await;
            }
            Err(e) => {
                tracing::warn!(
                    artist = name,
                    artist_id = %id,
                    error = %e,
                    "Failed to cache artist ID; continuing without cache"
                );
            }
        }
    }

    id
}
