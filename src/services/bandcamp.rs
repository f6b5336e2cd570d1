//! Bandcamp link recognition and player resolution.
//!
//! Recognition is a pure pattern match on `<sub>.bandcamp.com/(album|track)/<slug>`.
//! The embedded player, however, is addressed by numeric album or track id,
//! which only appears on the release page. [`BandcampResolver`] downloads
//! the page and looks for the id in, in order:
//!
//! 1. the `bc-page-properties` meta tag
//! 2. the `data-tralbum` script attribute
//! 3. legacy `TralbumData` / `EmbedData` script blocks
//! 4. `data-item-id` attributes
//! 5. an `EmbeddedPlayer` iframe URL
//!
//! # Retry Strategy
//!
//! Page downloads go through [`RetryPageSource`]: up to 3 attempts,
//! exponential backoff from 2 seconds (capped at 30), plus 0-250ms of
//! jitter. A 404 stops immediately. A page that still fails is kept as a
//! plain link; resolution never fails the run.

use once_cell::sync::Lazy;
use rand::{Rng, rng};
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use super::LinkMatch;
use crate::models::{EmbedParams, EmbedRecord, Service};

static BANDCAMP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)https?://[a-z0-9-]+\.bandcamp\.com/(?:album|track)/[a-z0-9_-]+").unwrap()
});

static LEGACY_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)var\s+(?:TralbumData|EmbedData)\s*=\s*(\{.+?\});").unwrap()
});
static ALBUM_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""?album_id"?\s*:\s*(\d+)"#).unwrap());
static TRACK_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""?track_id"?\s*:\s*(\d+)"#).unwrap());
static PLAYER_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"EmbeddedPlayer/(?:v=2/)?(album|track)=(\d+)").unwrap());

/// Browsers get full pages; the default client UA sometimes does not.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const PAGE_TIMEOUT: Duration = Duration::from_secs(15);

/// First Bandcamp release linked in `text`.
///
/// The record id is the lowercased page URL until the player is resolved.
pub fn find_link(text: &str) -> Option<LinkMatch> {
    let url = BANDCAMP_RE.find(text)?.as_str().to_string();
    Some(LinkMatch {
        service: Service::Bandcamp,
        id: url.to_lowercase(),
        url,
        embed: EmbedParams::BandcampLink,
    })
}

/// Record id for a resolved player.
pub fn player_id(params: &EmbedParams) -> Option<String> {
    match params {
        EmbedParams::BandcampAlbum { album_id } => Some(format!("album_{album_id}")),
        EmbedParams::BandcampTrack { track_id } => Some(format!("track_{track_id}")),
        _ => None,
    }
}

#[derive(Deserialize)]
struct PageProperties {
    item_type: String,
    item_id: u64,
}

#[derive(Deserialize)]
struct Tralbum {
    id: u64,
    item_type: String,
}

fn params_for(kind: &str, id: u64) -> Option<EmbedParams> {
    match kind {
        "a" | "album" => Some(EmbedParams::BandcampAlbum { album_id: id }),
        "t" | "track" => Some(EmbedParams::BandcampTrack { track_id: id }),
        _ => None,
    }
}

fn first_u64(re: &Regex, text: &str) -> Option<u64> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Find the player id in a release page.
pub fn player_from_html(html: &str) -> Option<EmbedParams> {
    let document = Html::parse_document(html);

    let meta = Selector::parse(r#"meta[name="bc-page-properties"]"#).unwrap();
    if let Some(content) = document.select(&meta).find_map(|el| el.value().attr("content")) {
        if let Ok(props) = serde_json::from_str::<PageProperties>(content) {
            if let Some(params) = params_for(&props.item_type, props.item_id) {
                debug!("Player id from bc-page-properties");
                return Some(params);
            }
        }
    }

    let tralbum = Selector::parse("script[data-tralbum]").unwrap();
    if let Some(raw) = document.select(&tralbum).find_map(|el| el.value().attr("data-tralbum")) {
        if let Ok(data) = serde_json::from_str::<Tralbum>(raw) {
            if let Some(params) = params_for(&data.item_type, data.id) {
                debug!("Player id from data-tralbum");
                return Some(params);
            }
        }
    }

    if let Some(block) = LEGACY_BLOCK_RE.captures(html).and_then(|c| c.get(1)) {
        if let Some(album_id) = first_u64(&ALBUM_ID_RE, block.as_str()) {
            return Some(EmbedParams::BandcampAlbum { album_id });
        }
        if let Some(track_id) = first_u64(&TRACK_ID_RE, block.as_str()) {
            return Some(EmbedParams::BandcampTrack { track_id });
        }
    }

    let item = Selector::parse("[data-item-id][data-item-type]").unwrap();
    for el in document.select(&item) {
        let kind = el.value().attr("data-item-type").unwrap_or_default();
        let id = el.value().attr("data-item-id").and_then(|v| v.parse().ok());
        if let Some(params) = id.and_then(|id| params_for(kind, id)) {
            return Some(params);
        }
    }

    let caps = PLAYER_URL_RE.captures(html)?;
    let id = caps.get(2)?.as_str().parse().ok()?;
    params_for(caps.get(1)?.as_str(), id)
}

/// Failure to download a release page.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("page not found")]
    NotFound,
    #[error("HTTP {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Something that can fetch a page body.
pub trait PageSource {
    async fn get_page(&self, url: &str) -> Result<String, PageError>;
}

/// Plain HTTP page download.
#[derive(Debug, Clone)]
pub struct HttpPageSource {
    client: reqwest::Client,
}

impl HttpPageSource {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(PAGE_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

impl PageSource for HttpPageSource {
    #[instrument(level = "debug", skip(self))]
    async fn get_page(&self, url: &str) -> Result<String, PageError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(PageError::NotFound);
        }
        if !status.is_success() {
            return Err(PageError::Status(status.as_u16()));
        }
        Ok(resp.text().await?)
    }
}

/// Adds exponential backoff retries to any [`PageSource`].
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryPageSource<T> {
    inner: T,
    /// Total attempts, including the first.
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T: PageSource> RetryPageSource<T> {
    pub fn new(inner: T, max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Delay before retry number `attempt` (1-based), without jitter.
    fn backoff(&self, attempt: usize) -> Duration {
        let exponent = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay)
    }
}

impl<T> fmt::Debug for RetryPageSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPageSource")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T: PageSource> PageSource for RetryPageSource<T> {
    #[instrument(level = "debug", skip(self))]
    async fn get_page(&self, url: &str) -> Result<String, PageError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.get_page(url).await {
                Ok(body) => return Ok(body),
                Err(PageError::NotFound) => return Err(PageError::NotFound),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        warn!(
                            attempt,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "Page fetch exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self.backoff(attempt);
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + Duration::from_millis(jitter_ms);

                    warn!(attempt, ?delay, error = %e, "Page fetch failed; backing off");
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Looks up player ids for Bandcamp records.
#[derive(Debug)]
pub struct BandcampResolver<S> {
    source: S,
}

impl BandcampResolver<RetryPageSource<HttpPageSource>> {
    /// Resolver over HTTP with the default retry policy.
    pub fn http() -> Result<Self, reqwest::Error> {
        Ok(Self::new(RetryPageSource::new(
            HttpPageSource::new()?,
            3,
            Duration::from_secs(2),
        )))
    }
}

impl<S: PageSource> BandcampResolver<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Player parameters for one release page, if they can be found.
    pub async fn resolve(&self, url: &str) -> Option<EmbedParams> {
        match self.source.get_page(url).await {
            Ok(html) => {
                let params = player_from_html(&html);
                if params.is_none() {
                    warn!(%url, "No player id on Bandcamp page");
                }
                params
            }
            Err(e) => {
                warn!(%url, error = %e, "Could not fetch Bandcamp page");
                None
            }
        }
    }

    /// Resolve every unresolved Bandcamp record in place, one at a time.
    ///
    /// Returns how many records got a player.
    #[instrument(level = "info", skip_all)]
    pub async fn resolve_records(&self, records: &mut [EmbedRecord]) -> usize {
        let mut resolved = 0;
        for record in records
            .iter_mut()
            .filter(|r| r.embed == EmbedParams::BandcampLink)
        {
            if let Some(params) = self.resolve(&record.url).await {
                if let Some(id) = player_id(&params) {
                    record.id = id;
                }
                record.embed = params;
                resolved += 1;
            }
        }
        info!(resolved, "Resolved Bandcamp players");
        resolved
    }
}
