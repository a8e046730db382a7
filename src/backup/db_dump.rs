// dumpvault/src/backup/db_dump.rs
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::Command;
use tracing::info;

use crate::errors::{BackupError, Result};
use crate::utils::find_executable;

const MONGODUMP: &str = "mongodump";

/// What the dump tool should export.
#[derive(Clone, PartialEq, Eq)]
pub enum DumpTarget {
    Database {
        name: String,
        username: Option<String>,
        password: Option<String>,
        host: String,
    },
    /// Every database, using administrator credentials.
    All { username: String, password: String },
}

impl std::fmt::Debug for DumpTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DumpTarget::Database {
                name,
                username,
                host,
                ..
            } => f
                .debug_struct("Database")
                .field("name", name)
                .field("username", username)
                .field("host", host)
                .finish_non_exhaustive(),
            DumpTarget::All { username, .. } => f
                .debug_struct("All")
                .field("username", username)
                .finish_non_exhaustive(),
        }
    }
}

/// Produces a dump directory tree at `output_dir`.
pub trait DumpTool {
    fn dump(&self, target: &DumpTarget, output_dir: &Path) -> Result<()>;
}

/// `mongodump` found on the PATH.
#[derive(Debug, Default, Clone, Copy)]
pub struct MongoDump;

impl DumpTool for MongoDump {
    fn dump(&self, target: &DumpTarget, output_dir: &Path) -> Result<()> {
        let mongodump_path = find_executable(MONGODUMP)?;
        info!(
            executable = %mongodump_path.display(),
            output = %output_dir.display(),
            target = ?target,
            "Running database dump"
        );

        let output = Command::new(&mongodump_path)
            .args(dump_args(target, output_dir))
            .output()?;

        if !output.status.success() {
            return Err(BackupError::tool_failed(
                MONGODUMP,
                output.status,
                &output.stderr,
            ));
        }

        info!(output = %output_dir.display(), "✓ Database dump finished");
        Ok(())
    }
}

/// Argument vector for one `mongodump` invocation.
pub fn dump_args(target: &DumpTarget, output_dir: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    let mut flag = |name: &str, value: &OsStr| {
        args.push(name.into());
        args.push(value.to_owned());
    };
    match target {
        DumpTarget::Database {
            name,
            username,
            password,
            host,
        } => {
            flag("-d", name.as_ref());
            flag("--host", host.as_ref());
            if let Some(user) = username {
                flag("-u", user.as_ref());
            }
            if let Some(pass) = password {
                flag("-p", pass.as_ref());
            }
        }
        DumpTarget::All { username, password } => {
            flag("-u", username.as_ref());
            flag("-p", password.as_ref());
        }
    }
    flag("-o", output_dir.as_os_str());
    args
}
