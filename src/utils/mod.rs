use std::path::{Path, PathBuf};
use which::which;

use crate::errors::{BackupError, Result};

/// Confirms `path` is an existing directory and hands it back.
pub fn validate_directory(path: &Path) -> Result<&Path> {
    if path.as_os_str().is_empty() || !path.is_dir() {
        return Err(BackupError::not_a_dir(path));
    }
    Ok(path)
}

/// Confirms `path` is an existing regular file and hands it back.
pub fn validate_file(path: &Path) -> Result<&Path> {
    if path.as_os_str().is_empty() || !path.is_file() {
        return Err(BackupError::not_a_file(path));
    }
    Ok(path)
}

/// Finds an executable in the system PATH.
pub fn find_executable(tool: &'static str) -> Result<PathBuf> {
    which(tool).map_err(|e| BackupError::ExternalTool {
        tool,
        status: "not found".to_string(),
        stderr: format!("{} executable not found in PATH: {}", tool, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PathKind;

    #[test]
    fn test_existing_directory_is_accepted() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        assert_eq!(validate_directory(dir.path())?, dir.path());
        Ok(())
    }

    #[test]
    fn test_empty_path_is_rejected() {
        assert!(matches!(
            validate_directory(Path::new("")),
            Err(BackupError::InvalidPath {
                expected: PathKind::Directory,
                ..
            })
        ));
    }

    #[test]
    fn test_file_is_not_a_directory() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, b"x")?;

        assert!(validate_directory(&file).is_err());
        assert_eq!(validate_file(&file)?, file.as_path());
        assert!(matches!(
            validate_file(dir.path()),
            Err(BackupError::InvalidPath {
                expected: PathKind::File,
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn test_missing_executable_is_tool_error() {
        let result = find_executable("dumpvault-no-such-tool");
        assert!(matches!(result, Err(BackupError::ExternalTool { .. })));
    }
}
