// dumpvault/src/backup/archive.rs
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::path::{Path, PathBuf};
use tar::Builder;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::errors::{BackupError, Result};
use crate::utils::validate_directory;

pub const ARCHIVE_EXTENSION: &str = ".tar.gz";
/// Top-level directory name every archive unpacks to.
pub const ARCHIVE_ROOT: &str = "dump";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// A compressed dump sitting next to the directory it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArchive {
    /// `dump-<timestamp>`, without extension.
    pub base_name: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

pub fn archive_base_name(at: DateTime<Utc>) -> String {
    format!("dump-{}", at.format(TIMESTAMP_FORMAT))
}

/// Creates a GZipped TAR archive from a dump directory.
///
/// The archive is written next to `source_dir` (in its parent directory)
/// as `dump-<UTC timestamp>.tar.gz`, and every entry lives under a single
/// `dump/` root. The source directory is left in place.
///
/// The data goes to a hidden temp file first and is renamed into place only
/// once the gzip stream is finished, so a failure never leaves a truncated
/// archive under the final name.
pub fn compress_dump_dir(source_dir: &Path) -> Result<BackupArchive> {
    validate_directory(source_dir)?;
    let dest_dir = match source_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let created_at = Utc::now();
    let base_name = archive_base_name(created_at);
    let archive_path = dest_dir.join(format!("{}{}", base_name, ARCHIVE_EXTENSION));

    info!(
        source = %source_dir.display(),
        archive = %archive_path.display(),
        "Creating tar.gz archive"
    );

    let staging = tempfile::Builder::new()
        .prefix(".dump-")
        .suffix(".partial")
        .tempfile_in(&dest_dir)?;
    let enc = GzEncoder::new(staging, Compression::default());
    let mut tar_builder = Builder::new(enc);

    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            BackupError::Io(std::io::Error::other(format!(
                "Failed to walk directory {}: {}",
                source_dir.display(),
                e
            )))
        })?;
        let path = entry.path();
        let relative = path
            .strip_prefix(source_dir)
            .map_err(|e| BackupError::Io(std::io::Error::other(e)))?;
        let name = Path::new(ARCHIVE_ROOT).join(relative);

        if entry.file_type().is_dir() {
            tar_builder.append_dir(&name, path)?;
        } else if entry.file_type().is_file() {
            debug!(file = %name.display(), "Adding file to archive");
            tar_builder.append_path_with_name(path, &name)?;
        }
    }

    let encoder = tar_builder.into_inner()?;
    let staging = encoder.finish()?;
    staging
        .persist(&archive_path)
        .map_err(|e| BackupError::Io(e.error))?;

    info!(archive = %archive_path.display(), "✓ Tar.gz archive created");
    Ok(BackupArchive {
        base_name,
        path: archive_path,
        created_at,
    })
}
