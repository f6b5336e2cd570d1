//! Data models shared across the pipeline.
//!
//! - [`Article`]: one item from a Google Reader stream, as returned by the server
//! - [`Feed`] / [`Category`]: subscription and label listings
//! - [`Service`]: the three supported music hosts, in extraction priority order
//! - [`EmbedRecord`]: one playable embed derived from an article
//! - [`EmbedParams`]: the per-service player parameters the viewer turns into an iframe
//!
//! `EmbedRecord` is what ends up in the `<stem>_data.json` page maps, so its
//! field order is the serialized field order. Do not reorder fields without
//! accepting a diff in every generated file.

use serde::{Deserialize, Serialize};

/// An article fetched from the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    /// Server-side item id (`tag:google.com,2005:reader/item/...`).
    pub id: String,
    pub title: String,
    /// Body HTML (`summary.content` or `content.content`).
    pub content: String,
    /// Publication time in unix seconds.
    pub published: i64,
    pub author: Option<String>,
    /// Display name of the originating feed.
    pub feed_title: String,
    /// Stream id of the originating feed (`feed/123`).
    pub feed_id: String,
    /// Canonical URL of the article.
    pub link: String,
    pub unread: bool,
}

/// A subscription as listed by `subscription/list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub id: String,
    pub title: String,
    /// Labels of the categories this feed belongs to.
    pub categories: Vec<String>,
}

/// A user label as listed by `tag/list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    /// Full stream id, `user/-/label/<label>`.
    pub id: String,
    pub label: String,
}

/// Supported music hosts.
///
/// Declaration order is extraction priority: when an article links to more
/// than one service, the first one in this list wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Bandcamp,
    YouTube,
    SoundCloud,
}

impl Service {
    /// Services in the order they are tried.
    pub const PRIORITY: [Service; 3] = [Service::Bandcamp, Service::YouTube, Service::SoundCloud];

    /// Human-readable name.
    pub fn label(self) -> &'static str {
        match self {
            Service::Bandcamp => "Bandcamp",
            Service::YouTube => "YouTube",
            Service::SoundCloud => "SoundCloud",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Service::Bandcamp => "🎵",
            Service::YouTube => "📺",
            Service::SoundCloud => "🔊",
        }
    }
}

/// Player parameters for one embed.
///
/// The viewer builds the iframe from these at render time, which keeps the
/// JSON payload small compared to storing the markup itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmbedParams {
    BandcampAlbum { album_id: u64 },
    BandcampTrack { track_id: u64 },
    /// Bandcamp page whose player id could not be resolved; shown as a link.
    BandcampLink,
    #[serde(rename = "youtube")]
    YouTube { video_id: String },
    #[serde(rename = "soundcloud")]
    SoundCloud { track_url: String },
}

/// One embed extracted from one article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedRecord {
    #[serde(rename = "type")]
    pub service: Service,
    /// Normalized embeddable URL.
    pub url: String,
    pub embed: EmbedParams,
    /// Stable key used for de-duplication and listened tracking.
    pub id: String,
    pub title: String,
    /// `YYYY-MM-DD HH:MM` in UTC.
    pub date: String,
    /// Unix seconds, kept so the index can compute "last updated".
    pub published: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub feed: String,
    pub article_link: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_record() -> EmbedRecord {
        EmbedRecord {
            service: Service::YouTube,
            url: "https://www.youtube.com/embed/dQw4w9WgXcQ".to_string(),
            embed: EmbedParams::YouTube {
                video_id: "dQw4w9WgXcQ".to_string(),
            },
            id: "https://www.youtube.com/embed/dQw4w9WgXcQ".to_string(),
            title: "A video".to_string(),
            date: "2024-03-01 12:00".to_string(),
            published: 1_709_294_400,
            author: None,
            feed: "Some Blog".to_string(),
            article_link: "https://blog.example/post".to_string(),
        }
    }

    #[test]
    fn test_service_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Service::YouTube).unwrap(), r#""youtube""#);
        assert_eq!(serde_json::to_string(&Service::SoundCloud).unwrap(), r#""soundcloud""#);
        assert_eq!(serde_json::to_string(&Service::Bandcamp).unwrap(), r#""bandcamp""#);
    }

    #[test]
    fn test_priority_is_declaration_order() {
        let mut sorted = Service::PRIORITY;
        sorted.sort();
        assert_eq!(sorted, Service::PRIORITY);
        assert_eq!(Service::PRIORITY[0], Service::Bandcamp);
    }

    #[test]
    fn test_embed_params_tagging() {
        let json = serde_json::to_string(&EmbedParams::BandcampAlbum { album_id: 42 }).unwrap();
        assert_eq!(json, r#"{"kind":"bandcamp_album","album_id":42}"#);

        let json = serde_json::to_string(&EmbedParams::BandcampLink).unwrap();
        assert_eq!(json, r#"{"kind":"bandcamp_link"}"#);

        let parsed: EmbedParams =
            serde_json::from_str(r#"{"kind":"soundcloud","track_url":"https://soundcloud.com/a/b"}"#)
                .unwrap();
        assert_eq!(
            parsed,
            EmbedParams::SoundCloud {
                track_url: "https://soundcloud.com/a/b".to_string()
            }
        );
    }

    #[test]
    fn test_record_field_order_is_stable() {
        let json = serde_json::to_string(&sample_record()).unwrap();
        let type_pos = json.find(r#""type""#).unwrap();
        let url_pos = json.find(r#""url""#).unwrap();
        let feed_pos = json.find(r#""feed""#).unwrap();
        assert!(type_pos < url_pos && url_pos < feed_pos);
        assert!(!json.contains("author"));
    }

    #[test]
    fn test_record_roundtrip_with_author() {
        let mut record = sample_record();
        record.author = Some("DJ Example".to_string());
        let json = serde_json::to_string(&record).unwrap();
        let back: EmbedRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
