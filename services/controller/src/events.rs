//! Cluster event emission.
//!
//! Events are the operator's human-visible side channel: they name the
//! digest, the nodes involved, and what a cluster operator should do about
//! it. Emission failures are logged and swallowed; events never gate the
//! salvage path.

use k8s_openapi::api::core::v1::{ObjectReference, Pod};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// The image digest exists on cluster nodes.
pub const REASON_SALVAGEABLE: &str = "ImageSalvageable";

/// The image uses a tag with no cached digest; nothing to act on.
pub const REASON_NOT_ACTIONABLE: &str = "ImageNotActionable";

/// The image was transferred between nodes.
pub const REASON_SALVAGED: &str = "ImageSalvaged";

/// A salvage attempt failed.
pub const REASON_SALVAGE_FAILED: &str = "ImageSalvageFailed";

/// An image record exists but its content blobs are missing.
pub const REASON_CORRUPT: &str = "ImageCorrupt";

/// The image was pushed to the backup registry.
pub const REASON_PUSHED: &str = "ImagePushed";

/// The backup registry push failed.
pub const REASON_PUSH_FAILED: &str = "ImagePushFailed";

const ACTION_DETECTED: &str = "Detected";
const ACTION_SALVAGING: &str = "Salvaging";
const ACTION_SALVAGED: &str = "Salvaged";
const ACTION_CLEANING: &str = "Cleaning";
const ACTION_PUSHING: &str = "Pushing";

/// Emits cluster events for salvage detections and outcomes.
pub struct EventSink {
    recorder: Recorder,
}

impl EventSink {
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: "salvor".into(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }

    async fn emit(
        &self,
        pod: &Pod,
        type_: EventType,
        reason: &str,
        action: &str,
        note: String,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note: Some(note),
            action: action.to_string(),
            secondary: None,
        };
        if let Err(error) = self.recorder.publish(&event, &pod_reference(pod)).await {
            warn!(reason = %reason, error = %error, "Failed to publish event");
        }
    }

    /// Warning: the digest exists on the listed nodes.
    pub async fn salvageable(&self, pod: &Pod, image: &str, nodes: &[String]) {
        self.emit(
            pod,
            EventType::Warning,
            REASON_SALVAGEABLE,
            ACTION_DETECTED,
            format!(
                "Registry pull failed for {image}; image digest exists on nodes: [{}]. \
                 Salvage only buys time: rebuild and push the image properly.",
                nodes.join(", ")
            ),
        )
        .await;
    }

    /// Warning: tag-only image with no cached digest anywhere.
    pub async fn not_actionable(&self, pod: &Pod, image: &str) {
        self.emit(
            pod,
            EventType::Warning,
            REASON_NOT_ACTIONABLE,
            ACTION_DETECTED,
            format!("Not actionable: image {image} uses a tag, not a digest. Pin images by digest for salvor to help."),
        )
        .await;
    }

    /// Warning: the image was moved between nodes.
    pub async fn salvaged(&self, pod: &Pod, digest: &str, source_node: &str, target_node: &str) {
        self.emit(
            pod,
            EventType::Warning,
            REASON_SALVAGED,
            ACTION_SALVAGED,
            format!(
                "Image {digest} salvaged from node {source_node} to node {target_node}. \
                 This is an emergency measure: restore the registry copy."
            ),
        )
        .await;
    }

    /// Warning: salvage attempt failed.
    pub async fn salvage_failed(&self, pod: &Pod, digest: &str, reason: &str) {
        self.emit(
            pod,
            EventType::Warning,
            REASON_SALVAGE_FAILED,
            ACTION_SALVAGING,
            format!("Image salvage failed for {digest}: {reason}"),
        )
        .await;
    }

    /// Warning: corrupt image record detected and removed.
    pub async fn corrupt_image(&self, pod: &Pod, image: &str, node_name: &str) {
        self.emit(
            pod,
            EventType::Warning,
            REASON_CORRUPT,
            ACTION_CLEANING,
            format!(
                "Corrupt image record for {image} on node {node_name}: content blobs missing. Removing stale record."
            ),
        )
        .await;
    }

    /// Normal: the image was pushed to the backup registry.
    pub async fn pushed(&self, pod: &Pod, digest: &str, target_ref: &str, source_node: &str) {
        self.emit(
            pod,
            EventType::Normal,
            REASON_PUSHED,
            ACTION_PUSHING,
            format!("Image {digest} pushed to backup registry {target_ref} from node {source_node}."),
        )
        .await;
    }

    /// Warning: the backup registry push failed.
    pub async fn push_failed(&self, pod: &Pod, digest: &str, target_ref: &str, reason: &str) {
        self.emit(
            pod,
            EventType::Warning,
            REASON_PUSH_FAILED,
            ACTION_PUSHING,
            format!("Registry push failed for {digest} to {target_ref}: {reason}"),
        )
        .await;
    }
}

fn pod_reference(pod: &Pod) -> ObjectReference {
    ObjectReference {
        api_version: Some("v1".to_string()),
        kind: Some("Pod".to_string()),
        name: pod.metadata.name.clone(),
        namespace: pod.metadata.namespace.clone(),
        uid: pod.metadata.uid.clone(),
        ..Default::default()
    }
}
