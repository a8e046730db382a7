// dumpvault/src/backup/naming.rs
use chrono::{DateTime, Datelike, Utc};
use std::path::Path;

use crate::config::DEFAULT_KEY_PREFIX;

/// Ensures the prefix ends with a single `/`; blank prefixes become `dump/`.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim();
    if trimmed.is_empty() {
        return DEFAULT_KEY_PREFIX.to_string();
    }
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}

/// Remote key for an archive uploaded right now.
pub fn remote_key(prefix: &str, archive: &Path) -> String {
    remote_key_at(prefix, archive, Utc::now())
}

/// `<prefix>week-<ISO week of uploaded_at>/<archive file name>`.
///
/// The week comes from the upload moment, not from the archive's own
/// timestamp, so an archive made late on a Sunday can land in the next week.
pub fn remote_key_at(prefix: &str, archive: &Path, uploaded_at: DateTime<Utc>) -> String {
    let file_name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| archive.to_string_lossy().into_owned());
    format!(
        "{}week-{}/{}",
        normalize_prefix(prefix),
        uploaded_at.iso_week().week(),
        file_name
    )
}
