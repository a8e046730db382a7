// dumpvault/src/backup/retention.rs
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::s3_upload::{ObjectStore, RemoteObject};
use crate::config::RetentionPolicy;
use crate::errors::Result;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PurgeReport {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

/// Maximum age an object may reach before it is purged.
pub fn max_age(policy: &RetentionPolicy) -> Duration {
    Duration::weeks(i64::from(policy.max_age_weeks))
}

/// True when the object is strictly older than the policy allows.
pub fn is_expired(object: &RemoteObject, policy: &RetentionPolicy, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(object.created_at) > max_age(policy)
}

/// Deletes every object in `bucket` older than the policy threshold.
///
/// Listing failures are returned. A failed delete is logged and recorded in
/// the report, and the remaining expired objects are still attempted.
pub async fn purge_expired<S: ObjectStore>(
    store: &S,
    bucket: &str,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<PurgeReport> {
    let mut report = PurgeReport::default();
    if !policy.enabled {
        debug!("Backup retention disabled");
        return Ok(report);
    }

    let objects = store.list_objects(bucket).await?;
    let expired: Vec<&RemoteObject> = objects
        .iter()
        .filter(|o| is_expired(o, policy, now))
        .collect();

    info!(
        bucket,
        max_age_weeks = policy.max_age_weeks,
        listed = objects.len(),
        expired = expired.len(),
        "Applying backup retention policy"
    );

    for object in expired {
        match store.delete_object(bucket, &object.key).await {
            Ok(()) => {
                debug!(key = %object.key, "Deleted expired backup");
                report.deleted.push(object.key.clone());
            }
            Err(e) => {
                warn!(key = %object.key, "Failed to delete expired backup: {e}");
                report.failed.push(object.key.clone());
            }
        }
    }

    Ok(report)
}
