//! Webhook notifications for salvage outcomes.
//!
//! Fire-and-forget: a failing webhook must never slow down or fail a
//! salvage, so callers spawn [`Notifier::notify`] and drop the result after
//! logging.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

/// A salvage completed.
pub const EVENT_SALVAGED: &str = "salvaged";

/// An image was pushed to the backup registry.
pub const EVENT_PUSHED: &str = "pushed";

/// A backup registry push failed.
pub const EVENT_PUSH_FAILED: &str = "push_failed";

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from webhook delivery.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("sending webhook: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook returned status {0}")]
    Status(u16),
}

/// Notification payload posted to the webhook.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub event_type: String,
    pub pod_name: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub image_ref: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub digest: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source_node: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub target_node: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
    pub timestamp: String,
}

impl Notification {
    pub fn new(event_type: &str, pod_name: &str, namespace: &str) -> Self {
        Self {
            event_type: event_type.to_string(),
            pod_name: pod_name.to_string(),
            namespace: namespace.to_string(),
            image_ref: String::new(),
            digest: String::new(),
            source_node: String::new(),
            target_node: String::new(),
            error: String::new(),
            timestamp: String::new(),
        }
    }
}

/// Posts JSON notifications to a single webhook URL, optionally filtered by
/// event type.
pub struct Notifier {
    url: String,
    events: HashSet<String>,
    client: reqwest::Client,
}

impl Notifier {
    /// Create a notifier. An empty `event_types` list sends all events.
    pub fn new(url: &str, event_types: &[String]) -> Self {
        Self {
            url: url.to_string(),
            events: event_types
                .iter()
                .filter(|e| !e.is_empty())
                .cloned()
                .collect(),
            client: reqwest::Client::new(),
        }
    }

    /// True when the event type passes the filter.
    pub fn wants(&self, event_type: &str) -> bool {
        self.events.is_empty() || self.events.contains(event_type)
    }

    /// Deliver one notification. The timestamp is stamped here.
    pub async fn notify(&self, mut notification: Notification) -> Result<(), NotifyError> {
        if self.url.is_empty() || !self.wants(&notification.event_type) {
            return Ok(());
        }

        notification.timestamp = Utc::now().to_rfc3339();

        let response = self
            .client
            .post(&self.url)
            .timeout(WEBHOOK_TIMEOUT)
            .json(&notification)
            .send()
            .await?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_filter() {
        let all = Notifier::new("http://hook", &[]);
        assert!(all.wants(EVENT_SALVAGED));
        assert!(all.wants(EVENT_PUSH_FAILED));

        let filtered = Notifier::new("http://hook", &[EVENT_SALVAGED.to_string()]);
        assert!(filtered.wants(EVENT_SALVAGED));
        assert!(!filtered.wants(EVENT_PUSHED));
    }

    #[test]
    fn test_payload_omits_empty_fields() {
        let mut notification = Notification::new(EVENT_SALVAGED, "app-1", "default");
        notification.digest = "sha256:abc".into();
        notification.timestamp = "2026-08-02T00:00:00Z".into();

        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value["type"], EVENT_SALVAGED);
        assert_eq!(value["digest"], "sha256:abc");
        assert!(value.get("error").is_none());
        assert!(value.get("source_node").is_none());
    }

    #[tokio::test]
    async fn test_empty_url_is_noop() {
        let notifier = Notifier::new("", &[]);
        let notification = Notification::new(EVENT_SALVAGED, "app-1", "default");
        assert!(notifier.notify(notification).await.is_ok());
    }
}
