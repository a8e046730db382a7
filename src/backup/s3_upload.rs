// dumpvault/src/backup/s3_upload.rs
use aws_sdk_s3 as s3;
use chrono::{DateTime, Utc};
use s3::config::Region;
use s3::error::DisplayErrorContext;
use s3::primitives::ByteStream;
use std::path::Path;
use tracing::{info, warn};

use super::naming::remote_key;
use super::retention::purge_expired;
use crate::config::{RetentionPolicy, StorageSettings};
use crate::errors::{BackupError, Result};
use crate::utils::validate_file;

/// An object as seen in a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    pub created_at: DateTime<Utc>,
}

/// The slice of an object store the pipeline needs.
#[allow(async_fn_in_trait)]
pub trait ObjectStore {
    /// Fails when the bucket does not exist or is not accessible.
    async fn resolve_bucket(&self, bucket: &str) -> Result<()>;
    async fn list_objects(&self, bucket: &str) -> Result<Vec<RemoteObject>>;
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;
    async fn put_object_from_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()>;
}

/// S3, or any S3-compatible service when an endpoint is configured.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: s3::Client,
}

impl S3Store {
    pub async fn connect(settings: &StorageSettings) -> Result<Self> {
        let access_key = settings
            .access_key
            .as_deref()
            .ok_or(BackupError::missing("aws.aws_access_key"))?;
        let secret_key = settings
            .secret_key
            .as_deref()
            .ok_or(BackupError::missing("aws.aws_secret_key"))?;

        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(s3::config::Credentials::new(
                access_key,
                secret_key,
                None,     // session_token
                None,     // expiry
                "Static", // provider_name
            ));
        if let Some(endpoint) = &settings.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        Ok(S3Store {
            client: s3::Client::new(&sdk_config),
        })
    }
}

impl ObjectStore for S3Store {
    async fn resolve_bucket(&self, bucket: &str) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| BackupError::remote("resolve bucket", DisplayErrorContext(e)))?;
        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> Result<Vec<RemoteObject>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .into_paginator()
            .send();

        let mut objects = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| BackupError::remote("list", DisplayErrorContext(e)))?;
            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                let created_at = object
                    .last_modified()
                    .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()));
                match created_at {
                    Some(created_at) => objects.push(RemoteObject {
                        key: key.to_string(),
                        created_at,
                    }),
                    None => warn!(key, "Object listed without a usable timestamp, skipping"),
                }
            }
        }
        Ok(objects)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| BackupError::remote("delete", DisplayErrorContext(e)))?;
        Ok(())
    }

    async fn put_object_from_file(&self, bucket: &str, key: &str, path: &Path) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| BackupError::remote("read upload body", e))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| BackupError::remote("upload", DisplayErrorContext(e)))?;
        Ok(())
    }
}

/// Uploads a local archive, purging expired objects from the bucket first.
///
/// Returns the key the archive was stored under.
pub async fn upload_backup<S: ObjectStore>(
    store: &S,
    local_path: Option<&Path>,
    bucket_name: Option<&str>,
    key_prefix: &str,
    retention: &RetentionPolicy,
) -> Result<String> {
    let local_path = local_path
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or(BackupError::missing("backup file"))?;
    let bucket_name = bucket_name
        .filter(|b| !b.is_empty())
        .ok_or(BackupError::missing("aws.aws_bucket_name"))?;
    validate_file(local_path)?;

    store.resolve_bucket(bucket_name).await?;

    let report = purge_expired(store, bucket_name, retention, Utc::now()).await?;
    if !report.deleted.is_empty() {
        info!(deleted = report.deleted.len(), "Expired backups removed");
    }
    if !report.failed.is_empty() {
        warn!(
            failed = report.failed.len(),
            "Some expired backups could not be deleted"
        );
    }

    let s3_key = remote_key(key_prefix, local_path);
    info!(
        file = %local_path.display(),
        bucket = bucket_name,
        key = %s3_key,
        "Uploading backup"
    );
    store
        .put_object_from_file(bucket_name, &s3_key, local_path)
        .await?;

    info!(bucket = bucket_name, key = %s3_key, "✅ Upload finished");
    Ok(s3_key)
}
