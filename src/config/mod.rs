// dumpvault/src/config/mod.rs
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::{BackupError, Result};

pub const SYSTEM_CONFIG_PATH: &str = "/etc/dumpvault/config.json";
pub const USER_CONFIG_RELATIVE: &str = ".dumpvault/config.json";
pub const DEFAULT_KEY_PREFIX: &str = "dump/";
pub const DEFAULT_REGION: &str = "us-east-1";

// Structs for deserializing config.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonAwsConfig {
    pub aws_access_key: Option<String>,
    pub aws_secret_key: Option<String>,
    pub aws_bucket_name: Option<String>,
    pub aws_key_name: Option<String>,
    pub aws_region: Option<String>,
    pub aws_endpoint_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub admin_user: Option<String>,
    pub admin_password: Option<String>,
    pub password_file: Option<String>,
    pub aws: Option<JsonAwsConfig>,
    pub delete_backup: Option<bool>,
    pub delete_weeks: Option<u32>,
}

// Application's internal configuration structs
#[derive(Clone, PartialEq, Eq)]
pub struct StorageSettings {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub bucket_name: Option<String>,
    pub key_prefix: String,
    pub region: String,
    pub endpoint_url: Option<String>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            access_key: None,
            secret_key: None,
            bucket_name: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            region: DEFAULT_REGION.to_string(),
            endpoint_url: None,
        }
    }
}

/// Age-based expiry of remote archives. Read once per run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub enabled: bool,
    pub max_age_weeks: u32,
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub admin_user: Option<String>,
    pub admin_password: Option<String>,
    pub default_passphrase: Option<String>,
    pub storage: StorageSettings,
    pub retention: RetentionPolicy,
}

impl fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageSettings")
            .field("access_key", &self.access_key)
            .field("secret_key", &redact(&self.secret_key))
            .field("bucket_name", &self.bucket_name)
            .field("key_prefix", &self.key_prefix)
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .finish()
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("admin_user", &self.admin_user)
            .field("admin_password", &redact(&self.admin_password))
            .field("default_passphrase", &redact(&self.default_passphrase))
            .field("storage", &self.storage)
            .field("retention", &self.retention)
            .finish()
    }
}

fn redact(value: &Option<String>) -> Option<&'static str> {
    value.as_ref().map(|_| "<redacted>")
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.trim().is_empty()).cloned()
}

impl Settings {
    /// Loads settings from the first readable location.
    ///
    /// An explicit path is the only candidate when given. Otherwise the
    /// system-wide file is tried first, then the one under `$HOME`.
    pub fn discover(explicit: Option<&Path>) -> Result<(PathBuf, Settings)> {
        let candidates = match explicit {
            Some(path) => vec![path.to_path_buf()],
            None => default_config_locations(),
        };

        for candidate in &candidates {
            match fs::read_to_string(candidate) {
                Ok(content) => {
                    debug!(path = %candidate.display(), "Loaded configuration file");
                    let settings = Settings::from_json_str(&content, candidate)?;
                    return Ok((candidate.clone(), settings));
                }
                Err(e) => {
                    debug!(path = %candidate.display(), error = %e, "Configuration candidate not readable");
                }
            }
        }

        Err(BackupError::ConfigLoad {
            searched: candidates,
        })
    }

    pub fn from_json_str(content: &str, origin: &Path) -> Result<Settings> {
        let raw: RawJsonConfig =
            serde_json::from_str(content).map_err(|source| BackupError::ConfigParse {
                path: origin.to_path_buf(),
                source,
            })?;
        Settings::from_raw(&raw)
    }

    pub fn from_raw(raw: &RawJsonConfig) -> Result<Settings> {
        let aws = raw.aws.clone().unwrap_or_default();

        let enabled = raw.delete_backup.unwrap_or(false);
        let max_age_weeks = match (enabled, raw.delete_weeks) {
            (true, None | Some(0)) => return Err(BackupError::missing("delete_weeks")),
            (_, weeks) => weeks.unwrap_or(0),
        };

        Ok(Settings {
            admin_user: non_empty(&raw.admin_user),
            admin_password: non_empty(&raw.admin_password),
            default_passphrase: non_empty(&raw.password_file),
            storage: StorageSettings {
                access_key: non_empty(&aws.aws_access_key),
                secret_key: non_empty(&aws.aws_secret_key),
                bucket_name: non_empty(&aws.aws_bucket_name),
                key_prefix: non_empty(&aws.aws_key_name)
                    .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string()),
                region: non_empty(&aws.aws_region).unwrap_or_else(|| DEFAULT_REGION.to_string()),
                endpoint_url: non_empty(&aws.aws_endpoint_url),
            },
            retention: RetentionPolicy {
                enabled,
                max_age_weeks,
            },
        })
    }
}

fn default_config_locations() -> Vec<PathBuf> {
    let mut locations = vec![PathBuf::from(SYSTEM_CONFIG_PATH)];
    if let Some(home) = std::env::var_os("HOME").filter(|h| !h.is_empty()) {
        locations.push(PathBuf::from(home).join(USER_CONFIG_RELATIVE));
    }
    locations
}
