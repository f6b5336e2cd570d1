//! SoundCloud link recognition.

use once_cell::sync::Lazy;
use regex::Regex;

use super::LinkMatch;
use crate::models::{EmbedParams, Service};

static SOUNDCLOUD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)https?://(?:(?:www|m)\.)?soundcloud\.com/([a-z0-9_-]+)/((?:sets/)?[a-z0-9_-]+)")
        .unwrap()
});

/// First path segments that are site pages, not artists.
const RESERVED: &[&str] = &[
    "charts", "discover", "jobs", "pages", "search", "settings", "stream", "tags", "upload", "you",
];

/// First SoundCloud track or set linked in `text`.
pub fn find_link(text: &str) -> Option<LinkMatch> {
    SOUNDCLOUD_RE.captures_iter(text).find_map(|caps| {
        let artist = caps.get(1)?.as_str();
        let track = caps.get(2)?.as_str();
        if RESERVED.contains(&artist.to_ascii_lowercase().as_str()) {
            return None;
        }
        let url = format!("https://soundcloud.com/{artist}/{track}");
        Some(LinkMatch {
            service: Service::SoundCloud,
            id: url.to_lowercase(),
            embed: EmbedParams::SoundCloud {
                track_url: url.clone(),
            },
            url,
        })
    })
}
