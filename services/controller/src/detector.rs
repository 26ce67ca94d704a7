//! Image pull failure detection from pod status.

use k8s_openapi::api::core::v1::{Container, ContainerStatus, Pod};

/// Waiting reasons that indicate a registry pull failure.
const PULL_FAILURE_REASONS: [&str; 2] = ["ImagePullBackOff", "ErrImagePull"];

/// Waiting reason that may indicate a corrupt local image.
const CREATE_CONTAINER_ERROR: &str = "CreateContainerError";

/// A detected image pull failure for a single container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub container_name: String,
    pub image: String,
    pub reason: String,
    pub message: String,
    /// True when the image record exists but content blobs are missing
    /// (CreateContainerError with a rootfs resolution failure).
    pub corrupt_image: bool,
}

/// Inspect a pod and return any image pull failures found across both
/// regular and init container statuses, in status-list order.
pub fn detect(pod: &Pod) -> Vec<Failure> {
    let Some(status) = pod.status.as_ref() else {
        return Vec::new();
    };
    let Some(spec) = pod.spec.as_ref() else {
        return Vec::new();
    };

    let mut failures = detect_in_statuses(
        status.container_statuses.as_deref().unwrap_or_default(),
        &spec.containers,
    );
    failures.extend(detect_in_statuses(
        status.init_container_statuses.as_deref().unwrap_or_default(),
        spec.init_containers.as_deref().unwrap_or_default(),
    ));
    failures
}

fn detect_in_statuses(statuses: &[ContainerStatus], specs: &[Container]) -> Vec<Failure> {
    let mut failures = Vec::new();

    for cs in statuses {
        let Some(waiting) = cs.state.as_ref().and_then(|s| s.waiting.as_ref()) else {
            continue;
        };
        let reason = waiting.reason.as_deref().unwrap_or_default();
        let message = waiting.message.as_deref().unwrap_or_default();

        // The image is read from the spec, not the status, to survive
        // kubelet status lag.
        let image = spec_image(specs, &cs.name);

        if PULL_FAILURE_REASONS.contains(&reason) {
            failures.push(Failure {
                container_name: cs.name.clone(),
                image,
                reason: reason.to_string(),
                message: message.to_string(),
                corrupt_image: false,
            });
            continue;
        }

        // Corrupt image: containerd has the image record but content blobs
        // are missing. The kubelet reports the image as present while
        // container creation fails resolving the rootfs.
        if reason == CREATE_CONTAINER_ERROR && is_corrupt_image_message(message) {
            failures.push(Failure {
                container_name: cs.name.clone(),
                image,
                reason: reason.to_string(),
                message: message.to_string(),
                corrupt_image: true,
            });
        }
    }

    failures
}

fn spec_image(specs: &[Container], container_name: &str) -> String {
    specs
        .iter()
        .find(|c| c.name == container_name)
        .and_then(|c| c.image.clone())
        .unwrap_or_default()
}

/// True when the message indicates missing content blobs (the image record
/// exists but layers are gone).
fn is_corrupt_image_message(message: &str) -> bool {
    message.contains("failed to resolve rootfs")
        && message.contains("content digest")
        && message.contains("not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod_with_status(statuses: serde_json::Value, init_statuses: serde_json::Value) -> Pod {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "app-1", "namespace": "default"},
            "spec": {
                "containers": [
                    {"name": "app", "image": "registry.example.com/app@sha256:0000000000000000000000000000000000000000000000000000000000000000"},
                ],
                "initContainers": [
                    {"name": "init", "image": "registry.example.com/init:v1"},
                ],
            },
            "status": {
                "containerStatuses": statuses,
                "initContainerStatuses": init_statuses,
            },
        }))
        .unwrap()
    }

    #[test]
    fn test_detect_image_pull_back_off() {
        let pod = pod_with_status(
            json!([{
                "name": "app",
                "image": "stale-status-image",
                "imageId": "",
                "ready": false,
                "restartCount": 0,
                "state": {"waiting": {"reason": "ImagePullBackOff", "message": "Back-off pulling image"}},
            }]),
            json!([]),
        );

        let failures = detect(&pod);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].container_name, "app");
        assert_eq!(failures[0].reason, "ImagePullBackOff");
        assert!(!failures[0].corrupt_image);
        // Spec image wins over status image.
        assert!(failures[0].image.starts_with("registry.example.com/app@sha256:"));
    }

    #[test]
    fn test_detect_err_image_pull() {
        let pod = pod_with_status(
            json!([{
                "name": "app",
                "image": "x",
                "imageId": "",
                "ready": false,
                "restartCount": 0,
                "state": {"waiting": {"reason": "ErrImagePull", "message": "rpc error"}},
            }]),
            json!([]),
        );

        let failures = detect(&pod);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].reason, "ErrImagePull");
    }

    #[test]
    fn test_detect_init_container_failure() {
        let pod = pod_with_status(
            json!([]),
            json!([{
                "name": "init",
                "image": "x",
                "imageId": "",
                "ready": false,
                "restartCount": 0,
                "state": {"waiting": {"reason": "ImagePullBackOff", "message": ""}},
            }]),
        );

        let failures = detect(&pod);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].container_name, "init");
        assert_eq!(failures[0].image, "registry.example.com/init:v1");
    }

    #[test]
    fn test_detect_corrupt_image() {
        let message = "failed to create containerd container: failed to resolve rootfs: content digest sha256:b50153e8abcd: not found";
        let pod = pod_with_status(
            json!([{
                "name": "app",
                "image": "x",
                "imageId": "",
                "ready": false,
                "restartCount": 0,
                "state": {"waiting": {"reason": "CreateContainerError", "message": message}},
            }]),
            json!([]),
        );

        let failures = detect(&pod);
        assert_eq!(failures.len(), 1);
        assert!(failures[0].corrupt_image);
        assert_eq!(failures[0].reason, "CreateContainerError");
    }

    #[test]
    fn test_detect_ignores_other_create_errors() {
        let pod = pod_with_status(
            json!([{
                "name": "app",
                "image": "x",
                "imageId": "",
                "ready": false,
                "restartCount": 0,
                "state": {"waiting": {"reason": "CreateContainerError", "message": "some other failure"}},
            }]),
            json!([]),
        );

        assert!(detect(&pod).is_empty());
    }

    #[test]
    fn test_detect_ignores_running_containers() {
        let pod = pod_with_status(
            json!([{
                "name": "app",
                "image": "x",
                "imageId": "",
                "ready": true,
                "restartCount": 0,
                "state": {"running": {"startedAt": "2024-01-01T00:00:00Z"}},
            }]),
            json!([]),
        );

        assert!(detect(&pod).is_empty());
    }

    #[test]
    fn test_detect_ignores_crash_loop() {
        let pod = pod_with_status(
            json!([{
                "name": "app",
                "image": "x",
                "imageId": "",
                "ready": false,
                "restartCount": 3,
                "state": {"waiting": {"reason": "CrashLoopBackOff", "message": "back-off"}},
            }]),
            json!([]),
        );

        assert!(detect(&pod).is_empty());
    }

    #[test]
    fn test_detect_no_status() {
        let pod: Pod = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "app-1"},
            "spec": {"containers": [{"name": "app", "image": "x"}]},
        }))
        .unwrap();
        assert!(detect(&pod).is_empty());
    }
}
