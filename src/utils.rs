//! Small text, time and filesystem helpers.
//!
//! - Link canonicalization (session suffix removal)
//! - Whitespace normalization and character-safe truncation
//! - Listing timestamp parsing
//! - Parent directory creation for persisted files

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tokio::fs;

/// Matches a servlet session id path parameter and everything after it.
static SESSION_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i);jsessionid=.*$").expect("valid session suffix regex"));

/// Strip the `;jsessionid=…` suffix the listing appends to detail links.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(
///     canonical_url("https://www.gcs.gov.mo/detail/zh-hant/N1;jsessionid=AB12"),
///     "https://www.gcs.gov.mo/detail/zh-hant/N1"
/// );
/// ```
pub fn canonical_url(url: &str) -> String {
    SESSION_SUFFIX.replace(url, "").into_owned()
}

/// Collapse every run of whitespace into a single space and trim the ends.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep at most `max` characters, appending `marker` when anything was cut.
pub fn truncate_chars(s: &str, max: usize, marker: &str) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}{}", &s[..idx], marker),
        None => s.to_string(),
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` characters and annotated with the number of
/// bytes dropped.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…(+{} bytes)", &s[..idx], s.len() - idx),
        None => s.to_string(),
    }
}

/// Parse the `datetime` attribute of a listing `<time>` element.
///
/// The listing emits offsets without a colon (`2025-05-06T10:30:00+0800`);
/// RFC 3339 is accepted as well.
pub fn parse_listing_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%d %H:%M:%S%z"]
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Create the parent directory of `path` if it has one and it is missing.
pub async fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent).await,
        _ => Ok(()),
    }
}
