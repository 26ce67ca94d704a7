//! SalvageRecord resource and store.
//!
//! Records are the idempotency source of truth: one record per
//! `(pod, digest)` attempt, named `<podName>-<first 8 digest hex>`, never
//! mutated after creation. An external sweep deletes old completed records
//! (see [`crate::cleanup`]).
//!
//! The cluster cannot index custom resources by field, so `exists(digest)`
//! is answered from an in-memory digest set hydrated with one initial list.
//! The store is the only writer in the namespace, which keeps the set
//! coherent.

use std::collections::HashSet;

use chrono::{SecondsFormat, Utc};
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, CustomResource};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Describes one salvage operation.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "salvor.io",
    version = "v1alpha1",
    kind = "SalvageRecord",
    namespaced,
    status = "SalvageRecordStatus",
    printcolumn = r#"{"name":"Digest","type":"string","jsonPath":".spec.digest"}"#,
    printcolumn = r#"{"name":"Source","type":"string","jsonPath":".spec.sourceNode"}"#,
    printcolumn = r#"{"name":"Target","type":"string","jsonPath":".spec.targetNode"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SalvageRecordSpec {
    /// Name of the pod that triggered the salvage.
    pub pod_name: String,

    /// Image content digest (`sha256:...`).
    pub digest: String,

    /// Original image reference from the pod spec.
    pub image_ref: String,

    /// Node the image was exported from.
    pub source_node: String,

    /// Node the image was imported to.
    pub target_node: String,
}

/// Outcome of a salvage operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SalvageRecordStatus {
    /// Completed or Failed.
    pub phase: RecordPhase,

    /// When the salvage finished (RFC3339 UTC).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub completed_at: String,

    /// Failure reason; empty on success.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// Terminal phase of a salvage attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum RecordPhase {
    #[default]
    Completed,
    Failed,
}

/// Compound record name: `<podName>-<first 8 digest hex>`.
pub fn record_name(pod_name: &str, digest: &str) -> String {
    format!("{pod_name}-{}", salvor_imageref::short_digest(digest))
}

/// Persistent, digest-indexed salvage history.
pub struct RecordStore {
    api: Api<SalvageRecord>,
    namespace: String,
    digests: RwLock<Option<HashSet<String>>>,
}

impl RecordStore {
    /// Store records in the given namespace (the operator's own).
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
            digests: RwLock::new(None),
        }
    }

    /// True when any record for this digest exists: already done or in
    /// progress, so a new salvage must be skipped.
    pub async fn exists(&self, digest: &str) -> Result<bool, kube::Error> {
        self.ensure_index().await?;
        let guard = self.digests.read().await;
        Ok(guard.as_ref().is_some_and(|set| set.contains(digest)))
    }

    /// Write a record for a terminal salvage outcome. Records are
    /// create-once; a concurrent duplicate is not an error.
    pub async fn persist(
        &self,
        pod_name: &str,
        digest: &str,
        image_ref: &str,
        source_node: &str,
        target_node: &str,
        error: Option<&str>,
    ) -> Result<(), kube::Error> {
        let name = record_name(pod_name, digest);

        let mut record = SalvageRecord::new(
            &name,
            SalvageRecordSpec {
                pod_name: pod_name.to_string(),
                digest: digest.to_string(),
                image_ref: image_ref.to_string(),
                source_node: source_node.to_string(),
                target_node: target_node.to_string(),
            },
        );
        record.metadata.namespace = Some(self.namespace.clone());

        match self.api.create(&PostParams::default(), &record).await {
            Ok(_) => {}
            Err(kube::Error::Api(ref response)) if response.code == 409 => {
                debug!(name = %name, "SalvageRecord already exists");
            }
            Err(other) => return Err(other),
        }

        let status = SalvageRecordStatus {
            phase: match error {
                None => RecordPhase::Completed,
                Some(_) => RecordPhase::Failed,
            },
            completed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            error: error.unwrap_or_default().to_string(),
        };
        self.api
            .patch_status(
                &name,
                &PatchParams::default(),
                &Patch::Merge(serde_json::json!({ "status": status })),
            )
            .await?;

        info!(name = %name, digest = %digest, failed = error.is_some(), "Persisted SalvageRecord");

        self.ensure_index().await?;
        if let Some(set) = self.digests.write().await.as_mut() {
            set.insert(digest.to_string());
        }
        Ok(())
    }

    async fn ensure_index(&self) -> Result<(), kube::Error> {
        if self.digests.read().await.is_some() {
            return Ok(());
        }
        let mut guard = self.digests.write().await;
        if guard.is_some() {
            return Ok(());
        }
        let list = self.api.list(&ListParams::default()).await?;
        let set: HashSet<String> = list.items.iter().map(|r| r.spec.digest.clone()).collect();
        debug!(records = set.len(), "Hydrated SalvageRecord digest index");
        *guard = Some(set);
        Ok(())
    }
}
