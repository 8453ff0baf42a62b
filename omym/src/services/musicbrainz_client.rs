//! MusicBrainz artist search used for romanization
//!
//! One lookup per distinct artist name: search `/ws/2/artist`, take the
//! best-scoring artist and read its primary Japanese-Latin alias (falling
//! back to the sort name). Every failure ends in `None`; the caller then
//! transliterates locally.
//!
//! # Rate Limiting
//! MusicBrainz allows one request per second per client. The limiter is
//! process-wide, so any number of client instances share one budget.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use once_cell::sync::Lazy;
use reqwest::header::{HeaderMap, ACCEPT, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

use crate::services::romanization::RomanizationLookup;

const ARTIST_SEARCH_URL: &str = "https://musicbrainz.org/ws/2/artist/";
const MAX_ATTEMPTS: u32 = 2;
const MIN_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);
const ROMANIZED_ALIAS_LOCALE: &str = "ja-Latn";

static RATE_LIMITER: Lazy<DefaultDirectRateLimiter> =
    Lazy::new(|| RateLimiter::direct(Quota::per_second(NonZeroU32::MIN)));

/// MusicBrainz client errors
#[derive(Debug, Error)]
pub enum MBError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}")]
    ApiError(u16),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Identification sent with every request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MusicBrainzConfig {
    pub app_name: String,
    pub app_version: String,
    /// Mail address or URL; omitted from the User-Agent when empty
    pub contact: String,
}

impl MusicBrainzConfig {
    /// `App/Version (contact)` as MusicBrainz asks for
    pub fn user_agent(&self) -> String {
        let contact = self.contact.trim();
        if contact.is_empty() {
            format!("{}/{}", self.app_name, self.app_version)
        } else {
            format!("{}/{} ({})", self.app_name, self.app_version, contact)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ArtistSearchResponse {
    #[serde(default)]
    artists: Vec<MbArtist>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct MbArtist {
    #[serde(default)]
    score: Option<serde_json::Value>,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "sort-name", default)]
    sort_name: Option<String>,
    #[serde(default)]
    aliases: Vec<MbAlias>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct MbAlias {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "sort-name", default)]
    sort_name: Option<String>,
    #[serde(default)]
    locale: Option<String>,
    #[serde(default)]
    primary: Option<bool>,
}

impl MbArtist {
    /// Score as a number; older responses send it as a string
    fn score(&self) -> i64 {
        match &self.score {
            Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(0),
            Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }
}

/// Highest-scoring artist; the first one wins ties
fn pick_best_artist(artists: &[MbArtist]) -> Option<&MbArtist> {
    artists.iter().fold(None, |best: Option<&MbArtist>, artist| match best {
        Some(b) if b.score() >= artist.score() => Some(b),
        _ => Some(artist),
    })
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Romanized name for an artist: primary ja-Latn alias, else sort name, else name
fn choose_romanized_name(artist: &MbArtist) -> Option<String> {
    let alias = artist
        .aliases
        .iter()
        .filter(|a| a.locale.as_deref() == Some(ROMANIZED_ALIAS_LOCALE) && a.primary == Some(true))
        .find_map(|a| non_empty(&a.sort_name).or_else(|| non_empty(&a.name)));

    let chosen = alias
        .or_else(|| non_empty(&artist.sort_name))
        .or_else(|| non_empty(&artist.name))?;

    let cleaned = chosen.replace(", ", " ").trim().to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Delay requested by a `Retry-After` header (seconds or HTTP date), clamped
fn retry_delay(headers: &HeaderMap, now: DateTime<Utc>) -> Duration {
    let requested = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_retry_after(v, now));

    requested
        .unwrap_or(MIN_RETRY_DELAY)
        .clamp(MIN_RETRY_DELAY, MAX_RETRY_DELAY)
}

fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
        return value.parse::<u64>().ok().map(Duration::from_secs);
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    let seconds = (at - now).num_seconds().max(0) as u64;
    Some(Duration::from_secs(seconds))
}

/// MusicBrainz API client
pub struct MusicBrainzClient {
    client: Client,
    user_agent: String,
    base_url: String,
}

impl MusicBrainzClient {
    /// Create client with 5 s connect / 15 s total timeouts
    pub fn new(config: &MusicBrainzConfig) -> Result<Self, MBError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| MBError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            user_agent: config.user_agent(),
            base_url: ARTIST_SEARCH_URL.to_string(),
        })
    }

    /// Romanized artist name from MusicBrainz, `None` on any failure
    pub async fn fetch_romanized_name(&self, name: &str) -> Option<String> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        match self.search_artist(name).await {
            Ok(result) => {
                tracing::debug!(artist = name, romanized = ?result, "MusicBrainz lookup finished");
                result
            }
            Err(e) => {
                tracing::warn!(artist = name, error = %e, "MusicBrainz lookup failed");
                None
            }
        }
    }

    async fn search_artist(&self, name: &str) -> Result<Option<String>, MBError> {
        let query = format!("artist:{}", name);

        for attempt in 1..=MAX_ATTEMPTS {
            RATE_LIMITER.until_ready().await;

            let response = self
                .client
                .get(&self.base_url)
                .query(&[("query", query.as_str()), ("fmt", "json")])
                .header(USER_AGENT, &self.user_agent)
                .header(ACCEPT, "application/json")
                .send()
                .await
                .map_err(|e| MBError::NetworkError(e.to_string()))?;

            let status = response.status();
            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();

            if retryable && attempt < MAX_ATTEMPTS {
                let delay = retry_delay(response.headers(), Utc::now());
                tracing::info!(
                    artist = name,
                    status = status.as_u16(),
                    delay_ms = delay.as_millis() as u64,
                    "MusicBrainz asked to back off; retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            if !status.is_success() {
                return Err(MBError::ApiError(status.as_u16()));
            }

            let body: ArtistSearchResponse = response
                .json()
                .await
                .map_err(|e| MBError::ParseError(e.to_string()))?;

            return Ok(pick_best_artist(&body.artists).and_then(choose_romanized_name));
        }

        Ok(None)
    }
}

#[async_trait]
impl RomanizationLookup for MusicBrainzClient {
    async fn fetch(&self, name: &str) -> Option<String> {
        self.fetch_romanized_name(name).await
    }
}
