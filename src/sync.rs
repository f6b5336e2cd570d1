//! Drop embeds the user already marked as listened.
//!
//! Input is a JSON dump of the browser's `localStorage` for the viewer's
//! origin. Keys named `embed_digest_listened_<stem>` hold the listened ids
//! of one viewer, either as a JSON array or as the string form of one (which
//! is what `localStorage` itself stores):
//!
//! ```json
//! {
//!   "embed_digest_listened_Indie_Blog": ["album_42", "https://www.youtube.com/embed/dQw4w9WgXcQ"],
//!   "embed_digest_listened_Tapes": "[\"track_7\"]"
//! }
//! ```
//!
//! For every viewer in the directory the listened ids are removed from its
//! page map, the rest is paginated again with the viewer's own page size
//! (size of its first page), and both files are rewritten.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::config::DEFAULT_ITEMS_PER_PAGE;
use crate::error::{Error, Result};
use crate::outputs::index::scan_directory;
use crate::outputs::pages::{Page, PageMap, flatten, paginate, read_page_map, render_artifact_as, write_rendered};
use crate::outputs::index::ArtifactRef;
use crate::outputs::viewer::{LISTENED_KEY_PREFIX, read_display_name};
use crate::utils::display_name;

/// Listened ids per viewer stem.
pub type ListenedIds = BTreeMap<String, BTreeSet<String>>;

/// Parse a `localStorage` export. Keys without the listened prefix are ignored.
pub fn parse_listened_export(raw: &str) -> Result<ListenedIds> {
    let data: BTreeMap<String, Value> = serde_json::from_str(raw)?;
    let mut listened = ListenedIds::new();

    for (key, value) in data {
        let Some(stem) = key.strip_prefix(LISTENED_KEY_PREFIX) else {
            continue;
        };
        let ids: Option<Vec<String>> = match value {
            Value::String(s) => serde_json::from_str(&s).ok(),
            other => serde_json::from_value(other).ok(),
        };
        match ids {
            Some(ids) => {
                debug!(stem, count = ids.len(), "Loaded listened ids");
                listened.entry(stem.to_string()).or_default().extend(ids);
            }
            None => warn!(%key, "Listened entry is not a list of ids, ignoring"),
        }
    }
    Ok(listened)
}

pub async fn load_listened(path: &Path) -> Result<ListenedIds> {
    let raw = fs::read_to_string(path)
        .await
        .map_err(|e| Error::io(path, e))?;
    parse_listened_export(&raw)
}

/// Counts for one viewer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub original: usize,
    pub kept: usize,
    pub removed: usize,
    pub pages_before: usize,
    pub pages_after: usize,
}

/// Page size a viewer was generated with.
pub fn page_size_of(map: &PageMap) -> usize {
    map.get(&1)
        .or_else(|| map.values().next())
        .map(Vec::len)
        .filter(|&n| n > 0)
        .unwrap_or(DEFAULT_ITEMS_PER_PAGE)
}

/// Remove listened records and paginate the rest again.
///
/// # Arguments
///
/// * `map` - Page map of one viewer as read from disk
/// * `listened` - Record ids to drop
///
/// # Returns
///
/// The remaining records in their original order, split with the viewer's
/// own page size (see [`page_size_of`]), plus before/after counts.
///
/// # Examples
///
/// ```ignore
/// // 10 records on pages of 4, three of them listened
/// let (pages, stats) = sync_pages(map, &listened)?;
/// assert_eq!(stats.removed, 3);
/// assert_eq!(pages.iter().map(|p| p.records.len()).collect::<Vec<_>>(), vec![4, 3]);
/// ```
pub fn sync_pages(map: PageMap, listened: &BTreeSet<String>) -> Result<(Vec<Page>, SyncStats)> {
    let page_size = page_size_of(&map);
    let pages_before = map.values().filter(|p| !p.is_empty()).count();
    let records = flatten(map);
    let original = records.len();

    let kept: Vec<_> = records
        .into_iter()
        .filter(|r| !listened.contains(&r.id))
        .collect();
    let kept_count = kept.len();

    let pages = paginate(kept, page_size)?;
    let stats = SyncStats {
        original,
        kept: kept_count,
        removed: original - kept_count,
        pages_before,
        pages_after: pages.len(),
    };
    Ok((pages, stats))
}

/// Title of an existing viewer, falling back to one derived from its stem.
async fn viewer_title(artifact: &ArtifactRef) -> String {
    let title = fs::read_to_string(&artifact.html_path)
        .await
        .ok()
        .and_then(|html| read_display_name(&html));
    title.unwrap_or_else(|| {
        debug!(stem = %artifact.stem, "No title in viewer config, deriving it from the stem");
        display_name(&artifact.stem)
    })
}

/// Outcome for one viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSync {
    pub stem: String,
    pub stats: SyncStats,
    pub written: bool,
}

/// What `sync` should do.
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions<'a> {
    pub feed_dir: &'a Path,
    /// Defaults to `feed_dir`.
    pub output_dir: Option<&'a Path>,
    pub stats_only: bool,
    pub max_page_buttons: usize,
}

/// Apply listened ids to every viewer in the directory.
///
/// Viewers with nothing to remove are left alone unless a separate output
/// directory was given, in which case every viewer is written there.
#[instrument(level = "info", skip_all, fields(feed_dir = %opts.feed_dir.display(), stats_only = opts.stats_only))]
pub async fn sync_directory(listened: &ListenedIds, opts: &SyncOptions<'_>) -> Result<Vec<FeedSync>> {
    let empty = BTreeSet::new();
    let output_dir = opts.output_dir.unwrap_or(opts.feed_dir);
    let separate_output = opts.output_dir.is_some_and(|o| o != opts.feed_dir);

    for stem in listened.keys() {
        if !fs::try_exists(opts.feed_dir.join(format!("{stem}.html")))
            .await
            .unwrap_or(false)
        {
            warn!(%stem, "Listened ids for a viewer that is not in the directory");
        }
    }

    let mut results = Vec::new();
    for artifact in scan_directory(opts.feed_dir).await? {
        let map = match read_page_map(&artifact.data_path).await {
            Ok(map) => map,
            Err(e) => {
                warn!(path = %artifact.data_path.display(), error = %e, "Skipping unreadable page map");
                continue;
            }
        };

        let ids = listened.get(&artifact.stem).unwrap_or(&empty);
        let (pages, stats) = sync_pages(map, ids)?;

        let written = !opts.stats_only && (stats.removed > 0 || separate_output);
        if written {
            let rendered = render_artifact_as(
                &artifact.stem,
                &viewer_title(&artifact).await,
                &pages,
                opts.max_page_buttons,
            )?;
            write_rendered(output_dir, &rendered).await?;
        }

        info!(
            stem = %artifact.stem,
            original = stats.original,
            kept = stats.kept,
            removed = stats.removed,
            written,
            "Synced viewer"
        );
        results.push(FeedSync {
            stem: artifact.stem,
            stats,
            written,
        });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outputs::pages::tests::record;
    use crate::outputs::pages::write_artifact;
    use pretty_assertions::assert_eq;

    fn map_of(count: usize, size: usize) -> PageMap {
        paginate((1..=count).map(record).collect(), size)
            .unwrap()
            .into_iter()
            .map(|p| (p.number, p.records))
            .collect()
    }

    fn ids(ns: &[usize]) -> BTreeSet<String> {
        ns.iter().map(|&n| record(n).id).collect()
    }

    #[test]
    fn test_parse_array_and_string_values() {
        let raw = r#"{
            "embed_digest_listened_Indie_Blog": ["a", "b"],
            "embed_digest_listened_Tapes": "[\"c\"]",
            "embed_digest_listened_Broken": "not json",
            "theme": "dark"
        }"#;
        let listened = parse_listened_export(raw).unwrap();
        assert_eq!(listened.len(), 2);
        assert_eq!(
            listened["Indie_Blog"],
            BTreeSet::from(["a".to_string(), "b".to_string()])
        );
        assert_eq!(listened["Tapes"], BTreeSet::from(["c".to_string()]));
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(matches!(parse_listened_export("[1, 2]"), Err(Error::Json(_))));
    }

    #[test]
    fn test_sync_repaginates_with_original_size() {
        let (pages, stats) = sync_pages(map_of(10, 4), &ids(&[1, 2, 5])).unwrap();
        assert_eq!(
            stats,
            SyncStats {
                original: 10,
                kept: 7,
                removed: 3,
                pages_before: 3,
                pages_after: 2,
            }
        );
        let sizes: Vec<usize> = pages.iter().map(|p| p.records.len()).collect();
        assert_eq!(sizes, vec![4, 3]);
        assert_eq!(pages[0].records[0].title, "Track 3");
    }

    #[test]
    fn test_sync_removes_everything() {
        let (pages, stats) = sync_pages(map_of(3, 8), &ids(&[1, 2, 3])).unwrap();
        assert!(pages.is_empty());
        assert_eq!(stats.kept, 0);
        assert_eq!(stats.pages_after, 0);
    }

    #[test]
    fn test_page_size_defaults_when_empty() {
        assert_eq!(page_size_of(&PageMap::new()), DEFAULT_ITEMS_PER_PAGE);
    }

    #[tokio::test]
    async fn test_sync_directory_rewrites_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let pages = paginate((1..=5).map(record).collect(), 2).unwrap();
        write_artifact(dir.path(), "Indie Blog", &pages, 15).await.unwrap();
        write_artifact(dir.path(), "Tapes", &pages, 15).await.unwrap();

        let mut listened = ListenedIds::new();
        listened.insert("Indie_Blog".to_string(), ids(&[2, 4]));

        let opts = SyncOptions {
            feed_dir: dir.path(),
            output_dir: None,
            stats_only: true,
            max_page_buttons: 15,
        };
        let dry = sync_directory(&listened, &opts).await.unwrap();
        assert_eq!(dry[0].stats.removed, 2);
        assert!(!dry[0].written);
        let untouched = read_page_map(&dir.path().join("Indie_Blog_data.json")).await.unwrap();
        assert_eq!(flatten(untouched).len(), 5);

        let opts = SyncOptions {
            stats_only: false,
            ..opts
        };
        let results = sync_directory(&listened, &opts).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].written);
        assert!(!results[1].written);

        let map = read_page_map(&dir.path().join("Indie_Blog_data.json")).await.unwrap();
        let titles: Vec<String> = flatten(map).into_iter().map(|r| r.title).collect();
        assert_eq!(titles, vec!["Track 1", "Track 3", "Track 5"]);
    }

    #[tokio::test]
    async fn test_sync_keeps_viewer_title() {
        let dir = tempfile::tempdir().unwrap();
        let pages = paginate((1..=3).map(record).collect(), 8).unwrap();
        write_artifact(dir.path(), "AC/DC: lo_fi", &pages, 15).await.unwrap();

        let mut listened = ListenedIds::new();
        listened.insert("ACDC_lo_fi".to_string(), ids(&[1]));
        let opts = SyncOptions {
            feed_dir: dir.path(),
            output_dir: None,
            stats_only: false,
            max_page_buttons: 15,
        };
        let results = sync_directory(&listened, &opts).await.unwrap();
        assert!(results[0].written);

        let html = std::fs::read_to_string(dir.path().join("ACDC_lo_fi.html")).unwrap();
        assert!(html.contains("<h1>AC/DC: lo_fi</h1>"));
        assert!(html.contains("2 embeds · 1 pages"));
    }

    #[tokio::test]
    async fn test_sync_to_separate_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let pages = paginate((1..=2).map(record).collect(), 8).unwrap();
        write_artifact(dir.path(), "Tapes", &pages, 15).await.unwrap();

        let opts = SyncOptions {
            feed_dir: dir.path(),
            output_dir: Some(out.path()),
            stats_only: false,
            max_page_buttons: 15,
        };
        let results = sync_directory(&ListenedIds::new(), &opts).await.unwrap();
        assert!(results[0].written);
        assert!(out.path().join("Tapes.html").exists());
        assert!(out.path().join("Tapes_data.json").exists());
    }
}
