use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Can't load config: no readable configuration found (searched: {searched:?})")]
    ConfigLoad { searched: Vec<PathBuf> },

    #[error("Config file {path} is not valid: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Missing required argument: {what}")]
    MissingArgument { what: &'static str },

    #[error("Invalid path {path}: expected an existing {expected}")]
    InvalidPath { path: PathBuf, expected: PathKind },

    #[error("{tool} failed ({status}): {stderr}")]
    ExternalTool {
        tool: &'static str,
        status: String,
        stderr: String,
    },

    #[error("Remote storage {operation} failed: {detail}")]
    RemoteStorage {
        operation: &'static str,
        detail: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Directory,
    File,
}

impl std::fmt::Display for PathKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathKind::Directory => f.write_str("directory"),
            PathKind::File => f.write_str("file"),
        }
    }
}

impl BackupError {
    pub fn missing(what: &'static str) -> Self {
        BackupError::MissingArgument { what }
    }

    pub fn not_a_dir(path: impl Into<PathBuf>) -> Self {
        BackupError::InvalidPath {
            path: path.into(),
            expected: PathKind::Directory,
        }
    }

    pub fn not_a_file(path: impl Into<PathBuf>) -> Self {
        BackupError::InvalidPath {
            path: path.into(),
            expected: PathKind::File,
        }
    }

    /// Builds an `ExternalTool` error from a finished subprocess.
    pub fn tool_failed(tool: &'static str, status: ExitStatus, stderr: &[u8]) -> Self {
        BackupError::ExternalTool {
            tool,
            status: status.to_string(),
            stderr: String::from_utf8_lossy(stderr).trim().to_string(),
        }
    }

    pub fn remote(operation: &'static str, detail: impl std::fmt::Display) -> Self {
        BackupError::RemoteStorage {
            operation,
            detail: detail.to_string(),
        }
    }

    /// Short label used in the terminating message printed by `main`.
    pub fn kind(&self) -> &'static str {
        match self {
            BackupError::ConfigLoad { .. } | BackupError::ConfigParse { .. } => "config",
            BackupError::MissingArgument { .. } => "missing argument",
            BackupError::InvalidPath { .. } => "invalid path",
            BackupError::ExternalTool { .. } => "external tool",
            BackupError::RemoteStorage { .. } => "remote storage",
            BackupError::Io(_) => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
