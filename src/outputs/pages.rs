//! Pagination and per-feed artifact files.
//!
//! Each feed or category becomes two files in the output directory:
//!
//! ```text
//! output_dir/
//! ├── Indie_Blog.html         # viewer shell, see [`super::viewer`]
//! └── Indie_Blog_data.json    # {"1": [record, ...], "2": [...]}
//! ```
//!
//! Page keys are written in numeric order and records keep their struct
//! field order, so rendering the same pages twice gives identical bytes.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

use super::viewer;
use crate::error::{Error, Result};
use crate::models::EmbedRecord;
use crate::utils::{artifact_stem, data_file_name};

/// Page number to records, as stored in `<stem>_data.json`.
pub type PageMap = BTreeMap<u32, Vec<EmbedRecord>>;

/// One page of a viewer. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based.
    pub number: u32,
    pub records: Vec<EmbedRecord>,
}

/// Split records into contiguous pages of `page_size`; the last page may be
/// shorter.
///
/// # Arguments
///
/// * `records` - Records in display order
/// * `page_size` - Records per page, at least 1
///
/// # Returns
///
/// Pages numbered from 1 that together hold every record in the original
/// order. No records gives no pages. A `page_size` of 0 is an
/// [`Error::Config`].
///
/// # Examples
///
/// ```ignore
/// let pages = paginate(records_17, 8)?;
/// assert_eq!(pages.iter().map(|p| p.records.len()).collect::<Vec<_>>(), vec![8, 8, 1]);
/// ```
pub fn paginate(records: Vec<EmbedRecord>, page_size: usize) -> Result<Vec<Page>> {
    if page_size < 1 {
        return Err(Error::Config("page size must be at least 1".to_string()));
    }
    let mut pages = Vec::with_capacity(records.len().div_ceil(page_size));
    let mut rest = records.into_iter().peekable();
    let mut number = 1;
    while rest.peek().is_some() {
        let records: Vec<EmbedRecord> = rest.by_ref().take(page_size).collect();
        pages.push(Page { number, records });
        number += 1;
    }
    Ok(pages)
}

/// Records of every page, in page order.
pub fn flatten(map: PageMap) -> Vec<EmbedRecord> {
    map.into_values().flatten().collect()
}

/// Both files of an artifact, ready to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    pub stem: String,
    pub html: String,
    pub json: String,
}

impl RenderedArtifact {
    pub fn html_file_name(&self) -> String {
        format!("{}.html", self.stem)
    }

    pub fn data_file_name(&self) -> String {
        data_file_name(&self.stem)
    }
}

/// Render the viewer shell and page map for one feed or category.
///
/// # Arguments
///
/// * `name` - Display name; the file stem is derived from it
/// * `pages` - Output of [`paginate`]
/// * `max_page_buttons` - Numbered page buttons the viewer shows at once
///
/// # Returns
///
/// The stem with both documents in memory: the HTML shell and the
/// pretty-printed page map keyed by page number. Nothing is written.
pub fn render_artifact(
    name: &str,
    pages: &[Page],
    max_page_buttons: usize,
) -> Result<RenderedArtifact> {
    render_artifact_as(&artifact_stem(name), name, pages, max_page_buttons)
}

/// Like [`render_artifact`], for an artifact whose stem is already known.
pub fn render_artifact_as(
    stem: &str,
    name: &str,
    pages: &[Page],
    max_page_buttons: usize,
) -> Result<RenderedArtifact> {
    #[derive(Serialize)]
    struct Borrowed<'a>(BTreeMap<u32, &'a [EmbedRecord]>);

    let map = Borrowed(pages.iter().map(|p| (p.number, p.records.as_slice())).collect());
    let json = serde_json::to_string_pretty(&map)?;

    let total_items = pages.iter().map(|p| p.records.len()).sum();
    let html = viewer::render_shell(&viewer::ShellOptions {
        display_name: name,
        stem,
        total_pages: pages.len(),
        total_items,
        max_page_buttons,
    })?;

    Ok(RenderedArtifact {
        stem: stem.to_string(),
        html,
        json,
    })
}

/// Paths of a written artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub html: PathBuf,
    pub data: PathBuf,
}

/// Render and write both files, replacing any previous version.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display(), %name, pages = pages.len()))]
pub async fn write_artifact(
    output_dir: &Path,
    name: &str,
    pages: &[Page],
    max_page_buttons: usize,
) -> Result<ArtifactPaths> {
    let rendered = render_artifact(name, pages, max_page_buttons)?;
    write_rendered(output_dir, &rendered).await
}

/// Write an already rendered artifact.
pub async fn write_rendered(output_dir: &Path, rendered: &RenderedArtifact) -> Result<ArtifactPaths> {
    fs::create_dir_all(output_dir)
        .await
        .map_err(|e| Error::io(output_dir, e))?;

    let data = output_dir.join(rendered.data_file_name());
    fs::write(&data, &rendered.json)
        .await
        .map_err(|e| Error::io(&data, e))?;

    let html = output_dir.join(rendered.html_file_name());
    fs::write(&html, &rendered.html)
        .await
        .map_err(|e| Error::io(&html, e))?;

    info!(html = %html.display(), data = %data.display(), "Wrote artifact");
    Ok(ArtifactPaths { html, data })
}

/// Load a `<stem>_data.json` page map.
pub async fn read_page_map(path: &Path) -> Result<PageMap> {
    let raw = fs::read_to_string(path)
        .await
        .map_err(|e| Error::io(path, e))?;
    Ok(serde_json::from_str(&raw)?)
}
