//! Link extraction for the supported music hosts.
//!
//! Each host lives in its own module and exposes a pure `find_link(text)`
//! that returns the first link it recognizes in a piece of text. Extraction
//! walks [`Service::PRIORITY`] and, for each service, looks at the article
//! title, then the body HTML, then the article URL; the first hit wins.
//!
//! | Service | Module | Recognized links |
//! |---------|--------|------------------|
//! | Bandcamp | [`bandcamp`] | `https://<sub>.bandcamp.com/(album\|track)/<slug>` |
//! | YouTube | [`youtube`] | `youtube.com/watch?v=<id>`, `youtube.com/embed/<id>`, `youtu.be/<id>` |
//! | SoundCloud | [`soundcloud`] | `soundcloud.com/<artist>/<track>`, `soundcloud.com/<artist>/sets/<set>` |
//!
//! Bandcamp additionally needs the numeric player id, which is only on the
//! release page; [`bandcamp::BandcampResolver`] fetches it after extraction.

pub mod bandcamp;
pub mod soundcloud;
pub mod youtube;

use itertools::Itertools;
use tracing::{debug, info, instrument};

use crate::models::{Article, EmbedParams, EmbedRecord, Service};
use crate::utils::{format_timestamp, truncate_for_log};

/// A recognized link, before it is tied to an article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMatch {
    pub service: Service,
    pub url: String,
    pub embed: EmbedParams,
    pub id: String,
}

impl LinkMatch {
    fn into_record(self, article: &Article) -> EmbedRecord {
        EmbedRecord {
            service: self.service,
            url: self.url,
            embed: self.embed,
            id: self.id,
            title: article.title.clone(),
            date: format_timestamp(article.published),
            published: article.published,
            author: article.author.clone().filter(|a| !a.trim().is_empty()),
            feed: article.feed_title.clone(),
            article_link: article.link.clone(),
        }
    }
}

impl Service {
    /// First link for this service in `text`.
    pub fn find_link(self, text: &str) -> Option<LinkMatch> {
        match self {
            Service::Bandcamp => bandcamp::find_link(text),
            Service::YouTube => youtube::find_link(text),
            Service::SoundCloud => soundcloud::find_link(text),
        }
    }
}

/// Extract the embed for one article, if any.
pub fn extract_embed(article: &Article) -> Option<EmbedRecord> {
    let fields = [&article.title, &article.content, &article.link];
    Service::PRIORITY
        .iter()
        .find_map(|service| fields.iter().find_map(|text| service.find_link(text)))
        .map(|found| found.into_record(article))
}

/// Outcome of running extraction over a batch of articles.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Records in article order, duplicates removed.
    pub records: Vec<EmbedRecord>,
    /// Articles without a recognizable link.
    pub misses: usize,
    /// Records dropped because an earlier article had the same embed.
    pub duplicates: usize,
}

/// Extract embeds from every article, keeping article order.
#[instrument(level = "info", skip_all, fields(articles = articles.len()))]
pub fn extract_all(articles: &[Article]) -> Extraction {
    let mut misses = 0;
    let mut found = Vec::with_capacity(articles.len());

    for article in articles {
        match extract_embed(article) {
            Some(record) => {
                debug!(service = record.service.label(), url = %record.url, "Found embed");
                found.push(record);
            }
            None => {
                misses += 1;
                debug!(
                    item = %article.id,
                    feed = %article.feed_id,
                    title = %truncate_for_log(&article.title, 60),
                    "No embeddable link"
                );
            }
        }
    }

    let (records, duplicates) = dedupe(found);
    info!(
        embeds = records.len(),
        misses, duplicates, "Extracted embeds"
    );
    Extraction {
        records,
        misses,
        duplicates,
    }
}

/// Drop records whose `id` was already seen, keeping the first occurrence.
pub fn dedupe(records: Vec<EmbedRecord>) -> (Vec<EmbedRecord>, usize) {
    let before = records.len();
    let unique = records
        .into_iter()
        .unique_by(|r| r.id.clone())
        .collect::<Vec<_>>();
    let dropped = before - unique.len();
    (unique, dropped)
}

/// Per-service counts, in priority order.
pub fn count_by_service(records: &[EmbedRecord]) -> [(Service, usize); 3] {
    Service::PRIORITY.map(|s| (s, records.iter().filter(|r| r.service == s).count()))
}
