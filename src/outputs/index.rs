//! `index.html` over a directory of generated viewers.
//!
//! Filesystem access happens only at the edges: [`scan_directory`] pairs
//! every viewer with its page map, [`aggregate`] reads the page maps, and
//! [`write_index`] writes the result. Everything between is a fold over
//! [`IndexEntry`] values.

use chrono::{DateTime, Utc};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument, warn};

use super::pages::{PageMap, read_page_map};
use super::viewer::{LISTENED_KEY_PREFIX, read_display_name};
use crate::error::{Error, Result};
use crate::models::Service;
use crate::utils::{data_file_name, display_name, format_timestamp};

pub const INDEX_FILE: &str = "index.html";
/// File name the index's export button downloads.
pub const LISTENED_EXPORT_FILE: &str = "embed_digest_listened.json";

/// A viewer shell and its page map, found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub stem: String,
    pub html_path: PathBuf,
    pub data_path: PathBuf,
}

/// Embed counts per service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceCounts {
    pub bandcamp: usize,
    pub youtube: usize,
    pub soundcloud: usize,
}

impl ServiceCounts {
    pub fn get(&self, service: Service) -> usize {
        match service {
            Service::Bandcamp => self.bandcamp,
            Service::YouTube => self.youtube,
            Service::SoundCloud => self.soundcloud,
        }
    }

    fn slot(&mut self, service: Service) -> &mut usize {
        match service {
            Service::Bandcamp => &mut self.bandcamp,
            Service::YouTube => &mut self.youtube,
            Service::SoundCloud => &mut self.soundcloud,
        }
    }

    pub fn add(&mut self, service: Service, n: usize) {
        *self.slot(service) += n;
    }

    pub fn total(&self) -> usize {
        self.bandcamp + self.youtube + self.soundcloud
    }

    fn merge(mut self, other: &ServiceCounts) -> Self {
        for service in Service::PRIORITY {
            self.add(service, other.get(service));
        }
        self
    }
}

/// Summary of one viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub name: String,
    pub html_file: String,
    pub counts: ServiceCounts,
    pub total: usize,
    pub pages: usize,
    /// Latest `published` over all records.
    pub last_updated: Option<i64>,
}

impl IndexEntry {
    /// Summarize a page map.
    pub fn from_page_map(stem: &str, map: &PageMap) -> Self {
        let mut counts = ServiceCounts::default();
        let mut last_updated = None;
        for record in map.values().flatten() {
            counts.add(record.service, 1);
            last_updated = last_updated.max(Some(record.published));
        }
        Self {
            name: display_name(stem),
            html_file: format!("{stem}.html"),
            total: counts.total(),
            counts,
            pages: map.values().filter(|records| !records.is_empty()).count(),
            last_updated,
        }
    }
}

/// Totals across every entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexTotals {
    pub feeds: usize,
    pub counts: ServiceCounts,
    pub total: usize,
}

pub fn totals(entries: &[IndexEntry]) -> IndexTotals {
    entries.iter().fold(IndexTotals::default(), |acc, entry| IndexTotals {
        feeds: acc.feeds + 1,
        counts: acc.counts.merge(&entry.counts),
        total: acc.total + entry.total,
    })
}

/// Find every viewer in `dir` that has its page map next to it.
///
/// `index.html` is skipped. A viewer without a page map is skipped with a
/// warning.
///
/// # Arguments
///
/// * `dir` - Output directory of a previous `generate` run
///
/// # Returns
///
/// One [`ArtifactRef`] per `<stem>.html` with a `<stem>_data.json`, sorted
/// by file name. A missing or unreadable `dir` is an [`Error::Io`].
///
/// # Examples
///
/// ```ignore
/// // Indie_Blog.html + Indie_Blog_data.json, Orphan.html, index.html
/// let found = scan_directory(Path::new("freshrss_embeds")).await?;
/// assert_eq!(found.len(), 1);
/// assert_eq!(found[0].stem, "Indie_Blog");
/// ```
#[instrument(level = "info", skip_all, fields(dir = %dir.display()))]
pub async fn scan_directory(dir: &Path) -> Result<Vec<ArtifactRef>> {
    let mut reader = fs::read_dir(dir).await.map_err(|e| Error::io(dir, e))?;
    let mut found = Vec::new();

    while let Some(entry) = reader.next_entry().await.map_err(|e| Error::io(dir, e))? {
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let Some(stem) = file_name.strip_suffix(".html") else {
            continue;
        };
        if file_name == INDEX_FILE || stem.is_empty() {
            continue;
        }
        let data_path = dir.join(data_file_name(stem));
        if !fs::try_exists(&data_path).await.unwrap_or(false) {
            warn!(html = %file_name, "No page map next to viewer, skipping");
            continue;
        }
        found.push(ArtifactRef {
            stem: stem.to_string(),
            html_path: entry.path(),
            data_path,
        });
    }

    found.sort_by(|a, b| a.html_path.file_name().cmp(&b.html_path.file_name()));
    info!(count = found.len(), "Scanned viewers");
    Ok(found)
}

/// Read each page map and summarize it.
///
/// # Arguments
///
/// * `artifacts` - Output of [`scan_directory`]
///
/// # Returns
///
/// One [`IndexEntry`] per readable page map, in input order. The entry is
/// named by the title stored in its viewer, or by the stem when the viewer
/// has none. Page maps that cannot be read or parsed are left out with a
/// warning; they never fail the whole index.
#[instrument(level = "info", skip_all, fields(artifacts = artifacts.len()))]
pub async fn aggregate(artifacts: &[ArtifactRef]) -> Vec<IndexEntry> {
    let mut entries = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        match read_page_map(&artifact.data_path).await {
            Ok(map) => {
                let mut entry = IndexEntry::from_page_map(&artifact.stem, &map);
                if let Some(title) = fs::read_to_string(&artifact.html_path)
                    .await
                    .ok()
                    .and_then(|html| read_display_name(&html))
                {
                    entry.name = title;
                }
                entries.push(entry);
            }
            Err(e) => warn!(
                path = %artifact.data_path.display(),
                error = %e,
                "Skipping unreadable page map"
            ),
        }
    }
    entries
}

/// Render the index page, stamped with the current time.
pub fn render_index(entries: &[IndexEntry], title: &str, description: &str) -> String {
    render_index_at(entries, title, description, Utc::now())
}

pub fn render_index_at(
    entries: &[IndexEntry],
    title: &str,
    description: &str,
    generated_at: DateTime<Utc>,
) -> String {
    let totals = totals(entries);
    let title = html_escape::encode_text(title);
    let description = html_escape::encode_text(description);

    let mut html = String::with_capacity(STYLE.len() + SCRIPT.len() + 1024 * (entries.len() + 2));
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n");
    let _ = writeln!(html, "<title>{title}</title>");
    let _ = writeln!(html, "<style>{STYLE}</style>");
    html.push_str("</head>\n<body>\n<div class=\"container\">\n<header>\n");
    let _ = writeln!(html, "<h1>{title}</h1>");
    let _ = writeln!(html, "<p class=\"description\">{description}</p>");

    html.push_str("<div class=\"global-stats\">\n");
    stat(&mut html, &totals.feeds.to_string(), "Feeds");
    stat(&mut html, &totals.total.to_string(), "Total embeds");
    for service in Service::PRIORITY {
        let value = format!("{} {}", service.icon(), totals.counts.get(service));
        stat(&mut html, &value, service.label());
    }
    html.push_str("</div>\n</header>\n");

    html.push_str(
        "<input id=\"search\" type=\"search\" placeholder=\"Filter feeds…\" autocomplete=\"off\">\n",
    );
    html.push_str("<div class=\"feeds-grid\" id=\"feeds\">\n");
    if entries.is_empty() {
        html.push_str("<p class=\"empty\">No feeds generated yet.</p>\n");
    }
    for entry in entries {
        card(&mut html, entry);
    }
    html.push_str("</div>\n<p class=\"empty\" id=\"no-match\" hidden>No feeds match.</p>\n");

    let _ = writeln!(
        html,
        "<section class=\"sync-tools\">\n<button id=\"export-listened\" data-prefix=\"{LISTENED_KEY_PREFIX}\" \
         data-file=\"{LISTENED_EXPORT_FILE}\">Export listened</button>\n\
         <p>Saves what you marked as listened for <code>embed_digest sync --listened-file</code>.</p>\n</section>"
    );
    let _ = writeln!(
        html,
        "<footer>Generated {}</footer>\n</div>",
        generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(html, "<script>{SCRIPT}</script>");
    html.push_str("</body>\n</html>\n");
    html
}

fn stat(html: &mut String, value: &str, label: &str) {
    let _ = writeln!(
        html,
        "<div class=\"global-stat\"><span class=\"global-stat-number\">{value}</span>\
         <span class=\"global-stat-label\">{label}</span></div>"
    );
}

fn card(html: &mut String, entry: &IndexEntry) {
    let name = html_escape::encode_text(&entry.name);
    let filter_key = html_escape::encode_double_quoted_attribute(&entry.name.to_lowercase()).into_owned();
    let href = urlencoding::encode(&entry.html_file);
    let updated = entry
        .last_updated
        .map(format_timestamp)
        .unwrap_or_else(|| "never".to_string());

    let _ = writeln!(html, "<a class=\"feed-card\" href=\"{href}\" data-name=\"{filter_key}\">");
    let _ = writeln!(html, "<h2>{name}</h2>");
    let _ = writeln!(
        html,
        "<p class=\"feed-total\"><strong>{}</strong> embeds · {} pages</p>",
        entry.total, entry.pages
    );
    html.push_str("<p class=\"feed-services\">");
    for service in Service::PRIORITY {
        let n = entry.counts.get(service);
        if n > 0 {
            let _ = write!(html, "<span>{} {n}</span>", service.icon());
        }
    }
    html.push_str("</p>\n");
    let _ = writeln!(html, "<p class=\"feed-updated\">Last updated {updated}</p>\n</a>");
}

/// Write `index.html` into `dir`, replacing any previous one.
pub async fn write_index(dir: &Path, html: &str) -> Result<PathBuf> {
    let path = dir.join(INDEX_FILE);
    fs::write(&path, html)
        .await
        .map_err(|e| Error::io(&path, e))?;
    info!(path = %path.display(), "Wrote index");
    Ok(path)
}

/// Scan, summarize and write the index for `dir`.
#[instrument(level = "info", skip_all, fields(dir = %dir.display()))]
pub async fn build_index(dir: &Path, title: &str, description: &str) -> Result<IndexTotals> {
    let artifacts = scan_directory(dir).await?;
    let entries = aggregate(&artifacts).await;
    let html = render_index(&entries, title, description);
    write_index(dir, &html).await?;
    Ok(totals(&entries))
}

const STYLE: &str = r#"
* { margin: 0; padding: 0; box-sizing: border-box; }
body {
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Ubuntu, sans-serif;
    background: #1f1f28; color: #dcd7ba; line-height: 1.5; padding: 20px;
}
.container { max-width: 1100px; margin: 0 auto; }
header { text-align: center; margin-bottom: 24px; }
header h1 { font-size: 2.2em; }
.description { color: #938aa9; margin-bottom: 18px; }
.global-stats { display: flex; flex-wrap: wrap; justify-content: center; gap: 14px; }
.global-stat { background: #2a2a37; border-radius: 10px; padding: 12px 18px; min-width: 110px; }
.global-stat-number { display: block; font-size: 1.6em; font-weight: bold; color: #9a64ff; }
.global-stat-label { font-size: 0.85em; color: #938aa9; }
#search {
    display: block; width: 100%; max-width: 480px; margin: 0 auto 20px;
    padding: 10px 14px; border-radius: 8px; border: 1px solid #363646;
    background: #2a2a37; color: #dcd7ba; font-size: 1em;
}
.feeds-grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(260px, 1fr)); gap: 16px; }
.feed-card {
    display: block; background: #2a2a37; border: 1px solid #363646; border-radius: 10px;
    padding: 16px; color: inherit; text-decoration: none;
}
.feed-card:hover { border-color: #9a64ff; }
.feed-card h2 { font-size: 1.15em; margin-bottom: 6px; }
.feed-total, .feed-updated { color: #938aa9; font-size: 0.9em; }
.feed-services span { margin-right: 10px; }
.empty { text-align: center; color: #938aa9; padding: 30px; }
.sync-tools { text-align: center; margin-top: 28px; color: #938aa9; font-size: 0.9em; }
.sync-tools button {
    background: #363646; color: #dcd7ba; border: 0; border-radius: 6px;
    padding: 8px 16px; cursor: pointer; margin-bottom: 6px;
}
.sync-tools button:hover { background: #9a64ff; color: #fff; }
footer { text-align: center; color: #727169; font-size: 0.85em; margin-top: 24px; }
"#;

const SCRIPT: &str = r#"
(function () {
    const input = document.getElementById('search');
    const cards = Array.from(document.querySelectorAll('.feed-card'));
    const noMatch = document.getElementById('no-match');
    input.addEventListener('input', function () {
        const q = input.value.trim().toLowerCase();
        let shown = 0;
        for (const card of cards) {
            const match = card.dataset.name.includes(q);
            card.style.display = match ? '' : 'none';
            if (match) shown++;
        }
        noMatch.hidden = shown > 0 || cards.length === 0;
    });

    const exportBtn = document.getElementById('export-listened');
    exportBtn.addEventListener('click', function () {
        const prefix = exportBtn.dataset.prefix;
        const dump = {};
        for (let i = 0; i < localStorage.length; i++) {
            const key = localStorage.key(i);
            if (!key || !key.startsWith(prefix)) continue;
            try {
                dump[key] = JSON.parse(localStorage.getItem(key));
            } catch (err) {
                console.warn('Skipping unreadable entry', key, err);
            }
        }
        const blob = new Blob([JSON.stringify(dump, null, 2)], { type: 'application/json' });
        const link = document.createElement('a');
        link.href = URL.createObjectURL(blob);
        link.download = exportBtn.dataset.file;
        document.body.appendChild(link);
        link.click();
        link.remove();
        URL.revokeObjectURL(link.href);
    });
})();
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmbedParams, EmbedRecord};
    use crate::outputs::pages::{paginate, tests::record, write_artifact};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn with_service(n: usize, service: Service) -> EmbedRecord {
        let mut r = record(n);
        r.service = service;
        r.embed = match service {
            Service::Bandcamp => EmbedParams::BandcampAlbum { album_id: n as u64 },
            Service::YouTube => r.embed,
            Service::SoundCloud => EmbedParams::SoundCloud {
                track_url: format!("https://soundcloud.com/a/{n}"),
            },
        };
        r
    }

    fn map_of(records: Vec<EmbedRecord>, size: usize) -> PageMap {
        paginate(records, size)
            .unwrap()
            .into_iter()
            .map(|p| (p.number, p.records))
            .collect()
    }

    #[test]
    fn test_entry_from_page_map() {
        let map = map_of(
            vec![
                with_service(1, Service::Bandcamp),
                with_service(2, Service::Bandcamp),
                with_service(3, Service::YouTube),
            ],
            2,
        );
        let entry = IndexEntry::from_page_map("Indie_Blog", &map);
        assert_eq!(entry.name, "Indie Blog");
        assert_eq!(entry.html_file, "Indie_Blog.html");
        assert_eq!(entry.counts.bandcamp, 2);
        assert_eq!(entry.counts.youtube, 1);
        assert_eq!(entry.total, 3);
        assert_eq!(entry.pages, 2);
        assert_eq!(entry.last_updated, Some(1_709_294_403));
    }

    #[test]
    fn test_empty_map_has_no_last_updated() {
        let entry = IndexEntry::from_page_map("x", &PageMap::new());
        assert_eq!(entry.total, 0);
        assert_eq!(entry.pages, 0);
        assert_eq!(entry.last_updated, None);
    }

    #[test]
    fn test_totals_fold() {
        let a = IndexEntry::from_page_map(
            "a",
            &map_of(
                vec![
                    with_service(1, Service::Bandcamp),
                    with_service(2, Service::Bandcamp),
                    with_service(3, Service::Bandcamp),
                    with_service(4, Service::YouTube),
                ],
                8,
            ),
        );
        let b = IndexEntry::from_page_map(
            "b",
            &map_of(
                vec![
                    with_service(5, Service::SoundCloud),
                    with_service(6, Service::SoundCloud),
                ],
                8,
            ),
        );
        let totals = totals(&[a, b]);
        assert_eq!(
            totals.counts,
            ServiceCounts {
                bandcamp: 3,
                youtube: 1,
                soundcloud: 2
            }
        );
        assert_eq!(totals.total, 6);
        assert_eq!(totals.feeds, 2);
    }

    #[test]
    fn test_render_index() {
        let entry = IndexEntry::from_page_map(
            "Rock_&_Roll",
            &map_of(vec![with_service(1, Service::YouTube)], 8),
        );
        let generated = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let html = render_index_at(&[entry], "My <Music>", "From feeds", generated);

        assert!(html.contains("<h1>My &lt;Music&gt;</h1>"));
        assert!(html.contains("href=\"Rock_%26_Roll.html\""));
        assert!(html.contains("data-name=\"rock &amp; roll\""));
        assert!(html.contains("<h2>Rock &amp; Roll</h2>"));
        assert!(html.contains("Generated 2024-03-01 12:00 UTC"));
        assert!(html.contains("id=\"search\""));
    }

    #[test]
    fn test_index_offers_listened_export() {
        let html = render_index(&[], "Music", "desc");
        assert!(html.contains("id=\"export-listened\""));
        assert!(html.contains("data-prefix=\"embed_digest_listened_\""));
        assert!(html.contains("data-file=\"embed_digest_listened.json\""));
        assert!(html.contains("localStorage.key(i)"));
    }

    #[tokio::test]
    async fn test_scan_and_aggregate() {
        let dir = tempfile::tempdir().unwrap();
        let pages = paginate(
            vec![
                with_service(1, Service::Bandcamp),
                with_service(2, Service::YouTube),
            ],
            8,
        )
        .unwrap();
        write_artifact(dir.path(), "Zed Feed", &pages, 15).await.unwrap();
        write_artifact(dir.path(), "Alpha", &pages, 15).await.unwrap();
        // Orphan shell, stale index and a broken page map.
        std::fs::write(dir.path().join("Orphan.html"), "<html></html>").unwrap();
        std::fs::write(dir.path().join("index.html"), "old").unwrap();
        std::fs::write(dir.path().join("Broken.html"), "<html></html>").unwrap();
        std::fs::write(dir.path().join("Broken_data.json"), "{not json").unwrap();

        let refs = scan_directory(dir.path()).await.unwrap();
        let stems: Vec<&str> = refs.iter().map(|r| r.stem.as_str()).collect();
        assert_eq!(stems, vec!["Alpha", "Broken", "Zed_Feed"]);

        let entries = aggregate(&refs).await;
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Zed Feed"]);
    }

    #[tokio::test]
    async fn test_aggregate_uses_viewer_title() {
        let dir = tempfile::tempdir().unwrap();
        let pages = paginate(vec![with_service(1, Service::YouTube)], 8).unwrap();
        write_artifact(dir.path(), "AC/DC: lo_fi", &pages, 15).await.unwrap();
        // Shell without a config block falls back to the stem.
        std::fs::write(dir.path().join("Old_Shell.html"), "<html></html>").unwrap();
        std::fs::write(dir.path().join("Old_Shell_data.json"), "{}").unwrap();

        let entries = aggregate(&scan_directory(dir.path()).await.unwrap()).await;
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["AC/DC: lo_fi", "Old Shell"]);
    }

    #[tokio::test]
    async fn test_build_index_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let pages = paginate(vec![with_service(1, Service::SoundCloud)], 8).unwrap();
        write_artifact(dir.path(), "Tapes", &pages, 15).await.unwrap();

        let totals = build_index(dir.path(), "Music", "desc").await.unwrap();
        assert_eq!(totals.counts.soundcloud, 1);
        let html = std::fs::read_to_string(dir.path().join(INDEX_FILE)).unwrap();
        assert!(html.contains("Tapes.html"));
    }

    #[tokio::test]
    async fn test_scan_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan_directory(&dir.path().join("missing")).await.unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
