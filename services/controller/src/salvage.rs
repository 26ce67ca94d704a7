//! Salvage orchestration.
//!
//! One `salvage` call moves one image: admit under the global concurrency
//! budget, resolve both agent endpoints, mint a session, size-check via
//! `PrepareExport`, stream via `ImportFrom`, persist the record, optionally
//! push to the backup registry, then recycle the pod so its owner restarts
//! it against the now-cached image.
//!
//! Ordering invariants: `PrepareExport` strictly precedes `ImportFrom`, and
//! the record write strictly precedes the backup push, so a push failure can
//! never orphan an unrecorded success.

use std::sync::Arc;
use std::time::{Duration, Instant};

use k8s_openapi::api::core::v1::{Pod, Secret};
use kube::api::DeleteParams;
use kube::{Api, Client, ResourceExt};
use salvor_proto::agent::v1::{
    ImportFromRequest, PrepareExportRequest, PushImageRequest, SalvorAgentClient,
};
use salvor_session::Store as SessionStore;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::endpoints::AgentLocator;
use crate::events::EventSink;
use crate::metrics::Metrics;
use crate::notify::{Notification, Notifier, EVENT_PUSHED, EVENT_PUSH_FAILED, EVENT_SALVAGED};
use crate::record::RecordStore;

/// Errors from a salvage attempt.
///
/// Transient errors requeue the reconcile; permanent errors do not.
/// [`records_failure`](SalvageError::records_failure) marks the permanent
/// failures that happened after the size-check stage was reached and
/// therefore get a phase=Failed record.
#[derive(Debug, Error)]
pub enum SalvageError {
    #[error("rate limited: max concurrent salvages reached")]
    RateLimited,

    #[error("resolving source agent: {0}")]
    SourceAgent(String),

    #[error("resolving target agent: {0}")]
    TargetAgent(String),

    #[error("prepare export: {0}")]
    Prepare(String),

    #[error("image size exceeded: {digest} is {size} bytes, exceeds limit {limit} bytes")]
    ImageTooLarge { digest: String, size: i64, limit: i64 },

    #[error("import transport: {0}")]
    Transport(String),

    #[error("import: {0}")]
    Import(String),

    #[error("{0}")]
    Internal(String),
}

impl SalvageError {
    /// True for failures worth a 30-second requeue: the rate limit clearing,
    /// a dial or stream hiccup.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SalvageError::RateLimited | SalvageError::Prepare(_) | SalvageError::Transport(_)
        )
    }

    /// True for terminal failures past the size-check stage; these get a
    /// SalvageRecord with phase=Failed.
    pub fn records_failure(&self) -> bool {
        matches!(
            self,
            SalvageError::ImageTooLarge { .. } | SalvageError::Import(_)
        )
    }
}

/// Optional backup registry push configuration.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    /// Registry host, e.g. `backup.example.com:5000`.
    pub registry: String,

    /// dockerconfigjson Secret name; empty pushes anonymously.
    pub secret_name: String,

    /// Namespace holding the Secret.
    pub secret_namespace: String,

    /// Allow plain HTTP to the registry.
    pub insecure: bool,
}

/// Coordinates image salvage between agent nodes.
pub struct Orchestrator {
    client: Client,
    sessions: SessionStore,
    locator: Arc<AgentLocator>,
    events: Arc<EventSink>,
    metrics: Arc<Metrics>,
    records: Arc<RecordStore>,
    notifier: Option<Arc<Notifier>>,
    semaphore: Semaphore,
    session_ttl: Duration,
    max_image_size: i64,
    backup: Option<BackupConfig>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Client,
        locator: Arc<AgentLocator>,
        events: Arc<EventSink>,
        metrics: Arc<Metrics>,
        records: Arc<RecordStore>,
        notifier: Option<Arc<Notifier>>,
        max_concurrent: usize,
        session_ttl: Duration,
        max_image_size: i64,
        backup: Option<BackupConfig>,
    ) -> Self {
        Self {
            client,
            sessions: SessionStore::new(),
            locator,
            events,
            metrics,
            records,
            notifier,
            semaphore: Semaphore::new(max_concurrent),
            session_ttl,
            max_image_size,
            backup,
        }
    }

    /// Transfer an image from `source_node` to the pod's node. One-shot: the
    /// caller decides whether a failure is retried (by requeue) or dropped.
    ///
    /// The caller must have filtered `source_node != target node`.
    pub async fn salvage(
        &self,
        pod: &Pod,
        digest: &str,
        image_ref: &str,
        source_node: &str,
    ) -> Result<(), SalvageError> {
        self.metrics.salvage_attempts_total.inc();

        let target_node = pod
            .spec
            .as_ref()
            .and_then(|s| s.node_name.clone())
            .ok_or_else(|| SalvageError::Internal("pod has no assigned node".to_string()))?;

        // Admission: non-blocking. A full budget is not an error worth an
        // event, only a metric; the reconcile requeues.
        let Ok(_permit) = self.semaphore.try_acquire() else {
            self.metrics.salvage_failures_total.inc();
            info!(digest = %digest, "Salvage rate limited");
            return Err(SalvageError::RateLimited);
        };

        let started = Instant::now();

        let outcome = self
            .transfer(digest, source_node, &target_node)
            .await;

        if let Err(err) = outcome {
            self.metrics.salvage_failures_total.inc();
            self.events.salvage_failed(pod, digest, &err.to_string()).await;
            if err.records_failure() {
                let message = err.to_string();
                if let Err(persist_err) = self
                    .records
                    .persist(
                        &pod.name_any(),
                        digest,
                        image_ref,
                        source_node,
                        &target_node,
                        Some(&message),
                    )
                    .await
                {
                    error!(error = %persist_err, digest = %digest, "Failed to persist failure record");
                }
            }
            return Err(err);
        }

        self.metrics.salvage_successes_total.inc();
        self.metrics
            .salvage_duration_seconds
            .observe(started.elapsed().as_secs_f64());
        self.events
            .salvaged(pod, digest, source_node, &target_node)
            .await;
        info!(
            digest = %digest,
            source = %source_node,
            target = %target_node,
            "Salvage complete"
        );
        self.send_notification(pod, digest, image_ref, source_node, &target_node);

        // Record before push: the record is the idempotency source of truth
        // and must exist even if the push leg dies.
        if let Err(persist_err) = self
            .records
            .persist(
                &pod.name_any(),
                digest,
                image_ref,
                source_node,
                &target_node,
                None,
            )
            .await
        {
            error!(error = %persist_err, digest = %digest, "Failed to persist SalvageRecord");
        }

        if self.backup.is_some() {
            // Push failures are non-fatal: the workload already has its image.
            self.push_to_backup(pod, digest, image_ref, source_node).await;
        }

        self.recover_pod(pod).await;
        Ok(())
    }

    /// The wire legs: endpoints, session, prepare, size guard, import.
    async fn transfer(
        &self,
        digest: &str,
        source_node: &str,
        target_node: &str,
    ) -> Result<(), SalvageError> {
        let source_endpoint = self
            .locator
            .endpoint_for_node(source_node)
            .await
            .map_err(|e| SalvageError::SourceAgent(e.to_string()))?;
        let target_endpoint = self
            .locator
            .endpoint_for_node(target_node)
            .await
            .map_err(|e| SalvageError::TargetAgent(e.to_string()))?;

        let session = self
            .sessions
            .create(digest, source_node, target_node, self.session_ttl);
        let token = session.token.clone();

        let result = self
            .transfer_with_session(&token, digest, &source_endpoint, &target_endpoint)
            .await;

        self.sessions.delete(&token);
        result
    }

    async fn transfer_with_session(
        &self,
        token: &str,
        digest: &str,
        source_endpoint: &str,
        target_endpoint: &str,
    ) -> Result<(), SalvageError> {
        let size_bytes = self
            .prepare_export(source_endpoint, token, digest)
            .await
            .map_err(SalvageError::Prepare)?;

        if self.max_image_size > 0 && size_bytes > self.max_image_size {
            return Err(SalvageError::ImageTooLarge {
                digest: digest.to_string(),
                size: size_bytes,
                limit: self.max_image_size,
            });
        }

        self.import_from(target_endpoint, token, digest, source_endpoint)
            .await
    }

    async fn prepare_export(
        &self,
        endpoint: &str,
        token: &str,
        digest: &str,
    ) -> Result<i64, String> {
        let channel = salvor_tls::dial(endpoint, self.locator.tls())
            .await
            .map_err(|e| format!("connecting to source: {e}"))?;
        let resp = SalvorAgentClient::new(channel)
            .prepare_export(PrepareExportRequest {
                session_token: token.to_string(),
                digest: digest.to_string(),
            })
            .await
            .map_err(|e| e.to_string())?;
        Ok(resp.into_inner().size_bytes)
    }

    async fn import_from(
        &self,
        endpoint: &str,
        token: &str,
        digest: &str,
        source_endpoint: &str,
    ) -> Result<(), SalvageError> {
        let channel = salvor_tls::dial(endpoint, self.locator.tls())
            .await
            .map_err(|e| SalvageError::Transport(format!("connecting to target: {e}")))?;
        let resp = SalvorAgentClient::new(channel)
            .import_from(ImportFromRequest {
                session_token: token.to_string(),
                digest: digest.to_string(),
                source_endpoint: source_endpoint.to_string(),
            })
            .await
            .map_err(|e| SalvageError::Transport(e.to_string()))?
            .into_inner();
        if !resp.success {
            return Err(SalvageError::Import(resp.error));
        }
        Ok(())
    }

    /// Delete the pod so its owning controller recreates it against the
    /// cached image. Standalone pods are left alone: the kubelet retries
    /// with backoff and finds the image, and the SalvageRecord index stops
    /// duplicate salvages.
    async fn recover_pod(&self, pod: &Pod) {
        if pod.owner_references().is_empty() {
            info!(pod = %pod.name_any(), "Standalone pod left in place after salvage");
            return;
        }
        let namespace = pod.namespace().unwrap_or_default();
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &namespace);
        match pods.delete(&pod.name_any(), &DeleteParams::default()).await {
            Ok(_) => {
                info!(pod = %pod.name_any(), namespace = %namespace, "Deleted pod for fast recovery");
            }
            Err(kube::Error::Api(ref response)) if response.code == 404 => {}
            Err(error) => {
                error!(pod = %pod.name_any(), error = %error, "Failed to delete pod after salvage");
            }
        }
    }

    fn send_notification(
        &self,
        pod: &Pod,
        digest: &str,
        image_ref: &str,
        source_node: &str,
        target_node: &str,
    ) {
        let Some(notifier) = self.notifier.clone() else {
            return;
        };
        let mut notification = Notification::new(
            EVENT_SALVAGED,
            &pod.name_any(),
            &pod.namespace().unwrap_or_default(),
        );
        notification.digest = digest.to_string();
        notification.image_ref = image_ref.to_string();
        notification.source_node = source_node.to_string();
        notification.target_node = target_node.to_string();
        tokio::spawn(async move {
            if let Err(error) = notifier.notify(notification).await {
                warn!(error = %error, "Webhook notification failed");
            }
        });
    }

    async fn push_to_backup(&self, pod: &Pod, digest: &str, image_ref: &str, source_node: &str) {
        let Some(backup) = &self.backup else { return };

        let target_ref = match salvor_imageref::backup_ref(image_ref, &backup.registry) {
            Ok(target_ref) => target_ref,
            Err(error) => {
                error!(image = %image_ref, error = %error, "Failed to construct backup ref");
                return;
            }
        };

        self.metrics.push_attempts_total.inc();

        let credentials = match self.load_registry_credentials(backup).await {
            Ok(credentials) => credentials,
            Err(error) => {
                error!(error = %error, "Failed to load registry credentials");
                self.metrics.push_failures_total.inc();
                self.events.push_failed(pod, digest, &target_ref, &error).await;
                self.push_notification(pod, digest, &target_ref, Some(&error));
                return;
            }
        };

        // The push runs on the source agent: it already has the image and
        // the controller never touches image bytes itself.
        let source_endpoint = match self.locator.endpoint_for_node(source_node).await {
            Ok(endpoint) => endpoint,
            Err(error) => {
                error!(node = %source_node, error = %error, "Failed to resolve source agent for push");
                self.metrics.push_failures_total.inc();
                self.events
                    .push_failed(pod, digest, &target_ref, &error.to_string())
                    .await;
                return;
            }
        };

        match self
            .push_image(&source_endpoint, digest, &target_ref, credentials, backup.insecure)
            .await
        {
            Ok(()) => {
                self.metrics.push_successes_total.inc();
                self.events.pushed(pod, digest, &target_ref, source_node).await;
                self.push_notification(pod, digest, &target_ref, None);
                info!(digest = %digest, target = %target_ref, source = %source_node, "Pushed to backup registry");
            }
            Err(error) => {
                error!(digest = %digest, target = %target_ref, error = %error, "Registry push failed (non-fatal)");
                self.metrics.push_failures_total.inc();
                self.events.push_failed(pod, digest, &target_ref, &error).await;
                self.push_notification(pod, digest, &target_ref, Some(&error));
            }
        }
    }

    async fn load_registry_credentials(
        &self,
        backup: &BackupConfig,
    ) -> Result<(String, String), String> {
        if backup.secret_name.is_empty() {
            return Ok((String::new(), String::new())); // anonymous push
        }
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &backup.secret_namespace);
        let secret = secrets.get(&backup.secret_name).await.map_err(|e| {
            format!(
                "reading secret {}/{}: {e}",
                backup.secret_namespace, backup.secret_name
            )
        })?;
        let data = secret
            .data
            .as_ref()
            .and_then(|d| d.get(".dockerconfigjson"))
            .ok_or_else(|| {
                format!(
                    "secret {}/{} missing .dockerconfigjson key",
                    backup.secret_namespace, backup.secret_name
                )
            })?;
        salvor_imageref::extract_credentials(&data.0, &backup.registry).map_err(|e| e.to_string())
    }

    async fn push_image(
        &self,
        endpoint: &str,
        digest: &str,
        target_ref: &str,
        credentials: (String, String),
        insecure: bool,
    ) -> Result<(), String> {
        let channel = salvor_tls::dial(endpoint, self.locator.tls())
            .await
            .map_err(|e| format!("connecting to source for push: {e}"))?;
        let resp = SalvorAgentClient::new(channel)
            .push_image(PushImageRequest {
                digest: digest.to_string(),
                target_ref: target_ref.to_string(),
                registry_username: credentials.0,
                registry_password: credentials.1,
                insecure,
            })
            .await
            .map_err(|e| e.to_string())?
            .into_inner();
        if !resp.success {
            return Err(resp.error);
        }
        Ok(())
    }

    fn push_notification(&self, pod: &Pod, digest: &str, target_ref: &str, error: Option<&str>) {
        let Some(notifier) = self.notifier.clone() else {
            return;
        };
        let event_type = if error.is_some() {
            EVENT_PUSH_FAILED
        } else {
            EVENT_PUSHED
        };
        let mut notification = Notification::new(
            event_type,
            &pod.name_any(),
            &pod.namespace().unwrap_or_default(),
        );
        notification.digest = digest.to_string();
        notification.image_ref = target_ref.to_string();
        notification.error = error.unwrap_or_default().to_string();
        tokio::spawn(async move {
            if let Err(error) = notifier.notify(notification).await {
                warn!(error = %error, "Webhook notification failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_transience() {
        assert!(SalvageError::RateLimited.is_transient());
        assert!(SalvageError::Prepare("dial tcp refused".into()).is_transient());
        assert!(SalvageError::Transport("stream reset".into()).is_transient());

        assert!(!SalvageError::SourceAgent("no agent pod".into()).is_transient());
        assert!(!SalvageError::Import("digest mismatch".into()).is_transient());
        assert!(!SalvageError::ImageTooLarge {
            digest: "sha256:abc".into(),
            size: 14,
            limit: 10,
        }
        .is_transient());
    }

    #[test]
    fn test_error_record_policy() {
        // Only failures past the size-check stage get a Failed record.
        assert!(SalvageError::ImageTooLarge {
            digest: "sha256:abc".into(),
            size: 14,
            limit: 10,
        }
        .records_failure());
        assert!(SalvageError::Import("mismatch".into()).records_failure());

        assert!(!SalvageError::RateLimited.records_failure());
        assert!(!SalvageError::SourceAgent("gone".into()).records_failure());
        assert!(!SalvageError::Prepare("refused".into()).records_failure());
        assert!(!SalvageError::Transport("reset".into()).records_failure());
    }

    #[test]
    fn test_size_exceeded_message() {
        let err = SalvageError::ImageTooLarge {
            digest: "sha256:abc".into(),
            size: 14,
            limit: 10,
        };
        let message = err.to_string();
        assert!(message.contains("size exceeded"));
        assert!(message.contains("14"));
        assert!(message.contains("10"));
    }
}
