//! YouTube link recognition.
//!
//! Watch, embed and short links all collapse to the same player URL,
//! `https://www.youtube.com/embed/<id>`, which doubles as the record id.

use once_cell::sync::Lazy;
use regex::Regex;

use super::LinkMatch;
use crate::models::{EmbedParams, Service};

// Query strings inside HTML attributes arrive as `&amp;`.
static YOUTUBE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)https?://(?:(?:www|m)\.)?youtube\.com/(?:watch\?(?:[^\s&#"'<>]*&(?:amp;)?)*v=|embed/)([a-z0-9_-]{11})|https?://youtu\.be/([a-z0-9_-]{11})"#,
    )
    .unwrap()
});

/// Player URL for a video id.
pub fn embed_url(video_id: &str) -> String {
    format!("https://www.youtube.com/embed/{video_id}")
}

/// First YouTube video linked in `text`.
pub fn find_link(text: &str) -> Option<LinkMatch> {
    let caps = YOUTUBE_RE.captures(text)?;
    let video_id = caps.get(1).or_else(|| caps.get(2))?.as_str().to_string();
    let url = embed_url(&video_id);
    Some(LinkMatch {
        service: Service::YouTube,
        id: url.clone(),
        url,
        embed: EmbedParams::YouTube { video_id },
    })
}
