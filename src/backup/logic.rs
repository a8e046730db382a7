// dumpvault/src/backup/logic.rs
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use super::archive::{ARCHIVE_ROOT, compress_dump_dir};
use super::db_dump::{DumpTarget, DumpTool};
use super::encrypt::{Cipher, Encryptor};
use super::s3_upload::{ObjectStore, upload_backup};
use crate::config::Settings;
use crate::errors::{BackupError, Result};
use crate::utils::validate_directory;

pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Which databases a run exports, as requested on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupMode {
    Single {
        database: Option<String>,
        username: Option<String>,
        password: Option<String>,
        host: Option<String>,
    },
    /// Missing credentials fall back to the configured admin account.
    All {
        username: Option<String>,
        password: Option<String>,
    },
}

/// One backup invocation. Built once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRequest {
    pub mode: BackupMode,
    pub path: PathBuf,
    pub encrypt: bool,
    pub upload: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Start,
    Validated,
    Dumped,
    Compressed,
    Encrypted,
    Uploaded,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::Validated => "validated",
            Stage::Dumped => "dumped",
            Stage::Compressed => "compressed",
            Stage::Encrypted => "encrypted",
            Stage::Uploaded => "uploaded",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOutcome {
    /// The one dump-derived file left on disk.
    pub artifact: PathBuf,
    pub remote_key: Option<String>,
    pub last_stage: Stage,
}

/// Runs validate → dump → compress → encrypt? → upload? for one request.
pub struct BackupPipeline<'a, D, C, S> {
    settings: &'a Settings,
    dump_tool: D,
    encryptor: Encryptor<C>,
    store: Option<S>,
}

impl<'a, D, C, S> BackupPipeline<'a, D, C, S>
where
    D: DumpTool,
    C: Cipher,
    S: ObjectStore,
{
    /// `store` may be `None` for runs that never upload.
    pub fn new(settings: &'a Settings, dump_tool: D, cipher: C, store: Option<S>) -> Self {
        BackupPipeline {
            settings,
            dump_tool,
            encryptor: Encryptor::new(cipher, settings.default_passphrase.clone()),
            store,
        }
    }

    pub async fn run(&self, request: &BackupRequest) -> Result<BackupOutcome> {
        let mut stage = Stage::Start;
        let result = self.run_stages(request, &mut stage).await;
        if let Err(e) = &result {
            error!(last_stage = %stage, kind = e.kind(), "Backup pipeline failed: {e}");
        }
        result
    }

    async fn run_stages(&self, request: &BackupRequest, stage: &mut Stage) -> Result<BackupOutcome> {
        let target = self.resolve_target(&request.mode)?;
        let base_dir = validate_directory(&request.path)?;
        self.advance(stage, Stage::Validated);

        let dump_dir = dump_dir_for(base_dir);
        self.dump_tool.dump(&target, &dump_dir)?;
        self.advance(stage, Stage::Dumped);

        let archive = compress_dump_dir(&dump_dir)?;
        fs::remove_dir_all(&dump_dir)?;
        info!(
            archive = %archive.path.display(),
            created_at = %archive.created_at,
            "Dump directory archived and removed"
        );
        self.advance(stage, Stage::Compressed);

        let mut artifact = archive.path.clone();
        if request.encrypt {
            let sealed = base_dir.join(&archive.base_name);
            self.encryptor.encrypt(&archive.path, &sealed, None)?;
            artifact = sealed;
            self.advance(stage, Stage::Encrypted);
        }

        let mut remote_key = None;
        if request.upload {
            let store = self
                .store
                .as_ref()
                .ok_or(BackupError::missing("object store credentials"))?;
            let storage = &self.settings.storage;
            let key = upload_backup(
                store,
                Some(&artifact),
                storage.bucket_name.as_deref(),
                &storage.key_prefix,
                &self.settings.retention,
            )
            .await?;
            remote_key = Some(key);
            self.advance(stage, Stage::Uploaded);
        }

        info!(artifact = %artifact.display(), "🎉 Backup completed");
        Ok(BackupOutcome {
            artifact,
            remote_key,
            last_stage: *stage,
        })
    }

    fn advance(&self, stage: &mut Stage, next: Stage) {
        info!(from = %stage, to = %next, "Pipeline stage reached");
        *stage = next;
    }

    fn resolve_target(&self, mode: &BackupMode) -> Result<DumpTarget> {
        match mode {
            BackupMode::Single {
                database,
                username,
                password,
                host,
            } => {
                let name = present(database).ok_or(BackupError::missing("database"))?;
                Ok(DumpTarget::Database {
                    name,
                    username: present(username),
                    password: present(password),
                    host: present(host).unwrap_or_else(|| DEFAULT_HOST.to_string()),
                })
            }
            BackupMode::All { username, password } => {
                // Credentials are taken as a pair, never mixed across sources.
                if let (Some(username), Some(password)) = (present(username), present(password)) {
                    return Ok(DumpTarget::All { username, password });
                }
                let username = self
                    .settings
                    .admin_user
                    .clone()
                    .ok_or(BackupError::missing("admin user"))?;
                let password = self
                    .settings
                    .admin_password
                    .clone()
                    .ok_or(BackupError::missing("admin password"))?;
                Ok(DumpTarget::All { username, password })
            }
        }
    }
}

fn present(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

/// Path of the dump directory the pipeline uses under `base`.
pub fn dump_dir_for(base: &Path) -> PathBuf {
    base.join(ARCHIVE_ROOT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::encrypt::tests::{FailingCipher, XorCipher};
    use crate::backup::s3_upload::tests::MemoryStore;
    use crate::config::RetentionPolicy;
    use std::cell::{Cell, RefCell};

    /// Writes a small dump tree, like the real tool would.
    #[derive(Default)]
    struct FakeDump {
        calls: Cell<usize>,
        targets: RefCell<Vec<DumpTarget>>,
        fail: bool,
    }

    impl DumpTool for FakeDump {
        fn dump(&self, target: &DumpTarget, output_dir: &Path) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            self.targets.borrow_mut().push(target.clone());
            if self.fail {
                return Err(BackupError::ExternalTool {
                    tool: "mongodump",
                    status: "exit status: 1".to_string(),
                    stderr: "connection refused".to_string(),
                });
            }
            fs::create_dir_all(output_dir.join("mydb"))?;
            fs::write(output_dir.join("mydb").join("things.bson"), b"bson-bytes")?;
            Ok(())
        }
    }

    fn settings() -> Settings {
        let mut settings = Settings {
            default_passphrase: Some("configured".to_string()),
            ..Default::default()
        };
        settings.storage.bucket_name = Some("backups".to_string());
        settings
    }

    fn single(path: &Path, encrypt: bool, upload: bool) -> BackupRequest {
        BackupRequest {
            mode: BackupMode::Single {
                database: Some("mydb".to_string()),
                username: None,
                password: None,
                host: None,
            },
            path: path.to_path_buf(),
            encrypt,
            upload,
        }
    }

    fn entries(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }

    #[tokio::test]
    async fn test_encrypted_run_leaves_exactly_one_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let settings = settings();
        let pipeline = BackupPipeline::new(&settings, FakeDump::default(), XorCipher, None::<MemoryStore>);

        let outcome = pipeline.run(&single(dir.path(), true, false)).await?;

        let left = entries(dir.path());
        assert_eq!(left, vec![outcome.artifact.clone()]);
        assert!(!dump_dir_for(dir.path()).exists());
        assert_eq!(outcome.last_stage, Stage::Encrypted);
        let name = outcome.artifact.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("dump-") && !name.ends_with(".tar.gz"));
        assert_eq!(
            pipeline.dump_tool.targets.borrow()[0],
            DumpTarget::Database {
                name: "mydb".to_string(),
                username: None,
                password: None,
                host: DEFAULT_HOST.to_string(),
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_unencrypted_run_keeps_compressed_archive() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let settings = settings();
        let pipeline = BackupPipeline::new(&settings, FakeDump::default(), XorCipher, None::<MemoryStore>);

        let outcome = pipeline.run(&single(dir.path(), false, false)).await?;

        assert_eq!(entries(dir.path()), vec![outcome.artifact.clone()]);
        assert!(outcome.artifact.to_string_lossy().ends_with(".tar.gz"));
        assert_eq!(outcome.last_stage, Stage::Compressed);
        Ok(())
    }

    #[tokio::test]
    async fn test_upload_stores_encrypted_artifact() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut settings = settings();
        settings.storage.key_prefix = "mongo".to_string();
        settings.retention = RetentionPolicy {
            enabled: true,
            max_age_weeks: 4,
        };
        let store = MemoryStore::with_bucket("backups");
        let pipeline = BackupPipeline::new(&settings, FakeDump::default(), XorCipher, Some(store));

        let outcome = pipeline.run(&single(dir.path(), true, true)).await?;

        let key = outcome.remote_key.clone().unwrap();
        let file_name = outcome.artifact.file_name().unwrap().to_string_lossy().into_owned();
        assert!(key.starts_with("mongo/week-"));
        assert!(key.ends_with(&format!("/{}", file_name)));
        assert_eq!(outcome.last_stage, Stage::Uploaded);
        assert!(outcome.artifact.exists(), "upload keeps the local copy");

        let store = pipeline.store.as_ref().unwrap();
        let uploads = store.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].1, fs::read(&outcome.artifact)?);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_database_fails_before_dump() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let settings = settings();
        let pipeline = BackupPipeline::new(&settings, FakeDump::default(), XorCipher, None::<MemoryStore>);
        let mut request = single(dir.path(), true, false);
        request.mode = BackupMode::Single {
            database: Some("  ".to_string()),
            username: None,
            password: None,
            host: None,
        };

        let result = pipeline.run(&request).await;
        assert!(matches!(
            result,
            Err(BackupError::MissingArgument { what: "database" })
        ));
        assert_eq!(pipeline.dump_tool.calls.get(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_backup_all_without_admin_password_fails_before_dump() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut settings = settings();
        settings.admin_user = Some("root".to_string());
        let pipeline = BackupPipeline::new(&settings, FakeDump::default(), XorCipher, None::<MemoryStore>);
        let request = BackupRequest {
            mode: BackupMode::All {
                username: Some("admin".to_string()),
                password: None,
            },
            path: dir.path().to_path_buf(),
            encrypt: true,
            upload: false,
        };

        let result = pipeline.run(&request).await;
        assert!(matches!(
            result,
            Err(BackupError::MissingArgument {
                what: "admin password"
            })
        ));
        assert_eq!(pipeline.dump_tool.calls.get(), 0);
        assert!(entries(dir.path()).is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_backup_all_falls_back_to_configured_admin() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut settings = settings();
        settings.admin_user = Some("root".to_string());
        settings.admin_password = Some("rootpw".to_string());
        let pipeline = BackupPipeline::new(&settings, FakeDump::default(), XorCipher, None::<MemoryStore>);
        let request = BackupRequest {
            mode: BackupMode::All {
                username: None,
                password: None,
            },
            path: dir.path().to_path_buf(),
            encrypt: false,
            upload: false,
        };

        pipeline.run(&request).await?;
        assert_eq!(
            pipeline.dump_tool.targets.borrow()[0],
            DumpTarget::All {
                username: "root".to_string(),
                password: "rootpw".to_string()
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_backup_all_partial_cli_credentials_use_configured_pair() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut settings = settings();
        settings.admin_user = Some("root".to_string());
        settings.admin_password = Some("rootpw".to_string());
        let pipeline = BackupPipeline::new(&settings, FakeDump::default(), XorCipher, None::<MemoryStore>);
        let request = BackupRequest {
            mode: BackupMode::All {
                username: Some("admin".to_string()),
                password: None,
            },
            path: dir.path().to_path_buf(),
            encrypt: false,
            upload: false,
        };

        pipeline.run(&request).await?;
        assert_eq!(
            pipeline.dump_tool.targets.borrow()[0],
            DumpTarget::All {
                username: "root".to_string(),
                password: "rootpw".to_string()
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_backup_all_prefers_complete_cli_credentials() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut settings = settings();
        settings.admin_user = Some("root".to_string());
        settings.admin_password = Some("rootpw".to_string());
        let pipeline = BackupPipeline::new(&settings, FakeDump::default(), XorCipher, None::<MemoryStore>);
        let request = BackupRequest {
            mode: BackupMode::All {
                username: Some("admin".to_string()),
                password: Some("adminpw".to_string()),
            },
            path: dir.path().to_path_buf(),
            encrypt: false,
            upload: false,
        };

        pipeline.run(&request).await?;
        assert_eq!(
            pipeline.dump_tool.targets.borrow()[0],
            DumpTarget::All {
                username: "admin".to_string(),
                password: "adminpw".to_string()
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_target_path_fails_before_dump() {
        let settings = settings();
        let pipeline = BackupPipeline::new(&settings, FakeDump::default(), XorCipher, None::<MemoryStore>);

        let result = pipeline
            .run(&single(Path::new("/nonexistent/dumpvault"), true, false))
            .await;
        assert!(matches!(result, Err(BackupError::InvalidPath { .. })));
        assert_eq!(pipeline.dump_tool.calls.get(), 0);
    }

    #[tokio::test]
    async fn test_dump_failure_aborts_without_artifacts() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let settings = settings();
        let dump = FakeDump {
            fail: true,
            ..Default::default()
        };
        let pipeline = BackupPipeline::new(&settings, dump, XorCipher, None::<MemoryStore>);

        let result = pipeline.run(&single(dir.path(), true, false)).await;
        assert!(matches!(result, Err(BackupError::ExternalTool { .. })));
        assert!(entries(dir.path()).is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_encrypt_failure_keeps_compressed_archive() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let settings = settings();
        let cipher = FailingCipher {
            calls: Cell::new(0),
        };
        let pipeline = BackupPipeline::new(&settings, FakeDump::default(), cipher, None::<MemoryStore>);

        let result = pipeline.run(&single(dir.path(), true, false)).await;

        assert!(matches!(result, Err(BackupError::ExternalTool { .. })));
        let left = entries(dir.path());
        assert_eq!(left.len(), 1);
        assert!(left[0].to_string_lossy().ends_with(".tar.gz"));
        Ok(())
    }

    #[tokio::test]
    async fn test_upload_without_store_is_missing_argument() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let settings = settings();
        let pipeline = BackupPipeline::new(&settings, FakeDump::default(), XorCipher, None::<MemoryStore>);

        let result = pipeline.run(&single(dir.path(), false, true)).await;
        assert!(matches!(result, Err(BackupError::MissingArgument { .. })));
        assert_eq!(entries(dir.path()).len(), 1);
        Ok(())
    }
}
