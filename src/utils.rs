//! Utility functions for naming, timestamps, log formatting, and file system checks.
//!
//! - Artifact stem derivation (display name → file name)
//! - Timestamp formatting for embed records
//! - String truncation for log fields
//! - Output directory validation

use chrono::DateTime;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

use crate::error::{Error, Result};

/// Suffix appended to an artifact stem to name its page-map file.
pub const DATA_SUFFIX: &str = "_data.json";

/// Derive the file stem for a feed or category display name.
///
/// Whitespace runs become a single `_`. Path separators and characters that
/// are invalid in file names on common platforms are dropped. Everything
/// else, including non-ASCII letters and punctuation, is kept as given.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(artifact_stem("Indie Blog"), "Indie_Blog");
/// assert_eq!(artifact_stem("AC/DC: Live!"), "ACDC_Live!");
/// ```
pub fn artifact_stem(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| {
            c.is_whitespace()
                || !(c.is_control() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        })
        .collect();
    let stem = cleaned.split_whitespace().collect::<Vec<_>>().join("_");
    if stem.is_empty() { "feed".to_string() } else { stem }
}

/// Display name recovered from an artifact stem.
pub fn display_name(stem: &str) -> String {
    stem.replace('_', " ")
}

/// Page-map file name for a stem.
pub fn data_file_name(stem: &str) -> String {
    format!("{stem}{DATA_SUFFIX}")
}

/// Format unix seconds as `YYYY-MM-DD HH:MM` (UTC).
///
/// Out-of-range timestamps fall back to the epoch rather than failing the
/// record.
pub fn format_timestamp(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .unwrap_or_default()
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` characters with an ellipsis and a byte
/// count indicator appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then creates and removes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).await.map_err(|e| Error::io(path, e))?;
    let probe_path = path.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Error::io(path, e)),
    }
}
