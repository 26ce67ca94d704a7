//! Periodic SalvageRecord cleanup.

use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::api::{DeleteParams, ListParams};
use kube::{Api, Client, ResourceExt};
use tracing::{debug, info, warn};

use crate::record::SalvageRecord;

/// Deletes SalvageRecords whose completion timestamp is older than the TTL.
pub struct Reaper {
    api: Api<SalvageRecord>,
    ttl: Duration,
    interval: Duration,
}

impl Reaper {
    pub fn new(client: Client, namespace: &str, ttl: Duration, interval: Duration) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            ttl,
            interval,
        }
    }

    /// Run the periodic cleanup loop until the process exits.
    pub async fn run(self) {
        info!(ttl_secs = self.ttl.as_secs(), interval_secs = self.interval.as_secs(), "Starting record reaper");
        let mut tick = tokio::time::interval(self.interval);
        tick.tick().await; // immediate first tick is a no-op
        loop {
            tick.tick().await;
            self.sweep().await;
        }
    }

    async fn sweep(&self) {
        let list = match self.api.list(&ListParams::default()).await {
            Ok(list) => list,
            Err(error) => {
                warn!(error = %error, "Record sweep list failed");
                return;
            }
        };

        let cutoff =
            Utc::now() - chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::zero());
        for record in &list.items {
            if !is_expired(record, cutoff) {
                continue;
            }
            let name = record.name_any();
            match self.api.delete(&name, &DeleteParams::default()).await {
                Ok(_) => info!(name = %name, "Deleted expired SalvageRecord"),
                Err(error) => debug!(name = %name, error = %error, "Record delete failed"),
            }
        }
    }
}

/// A record is expired when it completed before the cutoff. Records without
/// a parseable completion timestamp are kept.
pub fn is_expired(record: &SalvageRecord, cutoff: DateTime<Utc>) -> bool {
    let Some(completed_at) = record.status.as_ref().map(|s| s.completed_at.as_str()) else {
        return false;
    };
    if completed_at.is_empty() {
        return false;
    }
    match DateTime::parse_from_rfc3339(completed_at) {
        Ok(ts) => ts.with_timezone(&Utc) < cutoff,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{RecordPhase, SalvageRecordSpec, SalvageRecordStatus};

    fn record(completed_at: &str) -> SalvageRecord {
        let mut record = SalvageRecord::new(
            "app-1-b50153e8",
            SalvageRecordSpec {
                pod_name: "app-1".into(),
                digest: "sha256:b50153e8".into(),
                image_ref: "app:v1".into(),
                source_node: "node-1".into(),
                target_node: "node-2".into(),
            },
        );
        record.status = Some(SalvageRecordStatus {
            phase: RecordPhase::Completed,
            completed_at: completed_at.into(),
            error: String::new(),
        });
        record
    }

    #[test]
    fn test_expired_old_record() {
        let cutoff = Utc::now();
        assert!(is_expired(&record("2020-01-01T00:00:00Z"), cutoff));
    }

    #[test]
    fn test_not_expired_recent_record() {
        let cutoff = Utc::now() - chrono::Duration::hours(24);
        let recent = Utc::now().to_rfc3339();
        assert!(!is_expired(&record(&recent), cutoff));
    }

    #[test]
    fn test_missing_timestamp_kept() {
        let cutoff = Utc::now();
        assert!(!is_expired(&record(""), cutoff));

        let mut no_status = record("2020-01-01T00:00:00Z");
        no_status.status = None;
        assert!(!is_expired(&no_status, cutoff));
    }

    #[test]
    fn test_unparseable_timestamp_kept() {
        let cutoff = Utc::now();
        assert!(!is_expired(&record("yesterday"), cutoff));
    }
}
