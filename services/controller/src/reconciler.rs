//! Pod reconciliation: failure classification and salvage dispatch.
//!
//! Gate order is deliberate: kill switch, hard deny list, object existence,
//! then the double opt-in (namespace annotation plus workload annotation,
//! inherited through at most two owner levels). Only a fully opted-in pod
//! can produce any side effect.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject};
use kube::core::GroupVersionKind;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Client, ResourceExt};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{self, Config};
use crate::detector;
use crate::endpoints::AgentLocator;
use crate::events::EventSink;
use crate::inventory::Finder;
use crate::metrics::Metrics;
use crate::record::RecordStore;
use crate::salvage::{Orchestrator, SalvageError};

/// Requeue delay for transient salvage failures.
pub const TRANSIENT_REQUEUE: Duration = Duration::from_secs(30);

/// How many owner levels the opt-in annotation is inherited through.
const OWNER_WALK_DEPTH: usize = 2;

/// Errors that abort a reconcile and trigger a requeue.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("kubernetes api: {0}")]
    Kube(#[from] kube::Error),

    #[error("salvage: {0}")]
    Salvage(#[from] SalvageError),
}

/// Shared state handed to every reconcile.
pub struct Context {
    pub client: Client,
    pub config: Config,
    pub finder: Finder,
    pub events: Arc<EventSink>,
    pub metrics: Arc<Metrics>,
    pub records: Arc<RecordStore>,
    /// Present when an agent namespace is configured.
    pub locator: Option<Arc<AgentLocator>>,
    /// Present when an agent namespace is configured.
    pub orchestrator: Option<Arc<Orchestrator>>,
}

/// Run the pod controller until shutdown.
pub async fn run(ctx: Arc<Context>) {
    let pods: Api<Pod> = Api::all(ctx.client.clone());

    Controller::new(pods, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!(pod = %object.name, "Reconciled"),
                Err(err) => debug!(error = %err, "Reconcile failed"),
            }
        })
        .await;
}

/// Handle a single pod event.
pub async fn reconcile(pod: Arc<Pod>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    if !ctx.config.enabled {
        return Ok(Action::await_change());
    }

    let namespace = pod.namespace().unwrap_or_default();
    if config::is_denied(&namespace) {
        return Ok(Action::await_change());
    }

    // Deletion races are benign: a pod that disappeared needs nothing.
    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), &namespace);
    let Some(pod) = pods.get_opt(&pod.name_any()).await? else {
        return Ok(Action::await_change());
    };

    if !namespace_opted_in(&ctx, &namespace).await {
        return Ok(Action::await_change());
    }
    if !workload_opted_in(&ctx, &pod, &namespace).await {
        return Ok(Action::await_change());
    }

    let failures = detector::detect(&pod);
    if failures.is_empty() {
        return Ok(Action::await_change());
    }

    for failure in &failures {
        ctx.metrics.detected_failures_total.inc();

        if failure.corrupt_image {
            handle_corrupt_image(&ctx, &pod, failure).await;
            continue;
        }

        let resolution = salvor_imageref::resolve(&failure.image);

        let (digest, nodes) = if resolution.actionable {
            let nodes = ctx.finder.find_nodes(&resolution.digest).await?;
            (resolution.digest.clone(), nodes)
        } else {
            // Tag-only: node status first, then ask the agents directly —
            // the kubelet truncates long image lists.
            let (mut digest, mut nodes) = ctx.finder.find_nodes_by_tag(&failure.image).await?;
            if digest.is_empty() {
                if let Some(locator) = &ctx.locator {
                    match locator.resolve_tag_via_agents(&failure.image).await {
                        Ok(Some((resolved, node))) => {
                            debug!(image = %failure.image, digest = %resolved, node = %node, "Resolved tag via agent");
                            digest = resolved;
                            nodes = vec![node];
                        }
                        Ok(None) => {}
                        Err(err) => {
                            warn!(image = %failure.image, error = %err, "Agent tag resolution failed");
                        }
                    }
                }
            }
            if digest.is_empty() {
                debug!(
                    container = %failure.container_name,
                    image = %failure.image,
                    "Image not actionable (tag-only, no cached digest found)"
                );
                ctx.metrics.not_actionable_total.inc();
                ctx.events.not_actionable(&pod, &failure.image).await;
                continue;
            }
            (digest, nodes)
        };

        if nodes.is_empty() {
            // The image is truly gone from the cluster; nothing to salvage.
            continue;
        }

        info!(
            container = %failure.container_name,
            digest = %digest,
            nodes = ?nodes,
            "Image salvageable"
        );
        ctx.metrics.salvageable_images_total.inc();
        ctx.events.salvageable(&pod, &failure.image, &nodes).await;

        let Some(orchestrator) = &ctx.orchestrator else {
            continue;
        };
        let Some(target_node) = pod.spec.as_ref().and_then(|s| s.node_name.as_deref()) else {
            continue;
        };

        if ctx.records.exists(&digest).await? {
            debug!(digest = %digest, "SalvageRecord exists, skipping");
            continue;
        }

        // Pick a source node that is not the target node.
        let Some(source_node) = nodes.iter().find(|n| n.as_str() != target_node) else {
            debug!(digest = %digest, node = %target_node, "Image already on target node, skipping salvage");
            continue;
        };

        match orchestrator
            .salvage(&pod, &digest, &failure.image, source_node)
            .await
        {
            Ok(()) => {}
            Err(err) if err.is_transient() => {
                return Err(err.into());
            }
            Err(err) => {
                error!(digest = %digest, error = %err, "Salvage failed permanently");
            }
        }
    }

    Ok(Action::await_change())
}

/// All reconcile errors are retried after a fixed delay; permanent salvage
/// failures never surface here (they are logged and dropped in-loop).
pub fn error_policy(_pod: Arc<Pod>, _error: &ReconcileError, _ctx: Arc<Context>) -> Action {
    Action::requeue(TRANSIENT_REQUEUE)
}

/// Corrupt image: remove the stale record on the pod's node, then restart
/// the pod for a clean pull. No SalvageRecord is written.
async fn handle_corrupt_image(ctx: &Context, pod: &Pod, failure: &detector::Failure) {
    ctx.metrics.corrupt_images_total.inc();

    let Some(locator) = &ctx.locator else {
        return;
    };
    let Some(node_name) = pod.spec.as_ref().and_then(|s| s.node_name.as_deref()) else {
        return;
    };

    info!(image = %failure.image, node = %node_name, "Corrupt image detected, removing stale record");
    ctx.events.corrupt_image(pod, &failure.image, node_name).await;

    if let Err(err) = locator.remove_image_on_node(node_name, &failure.image).await {
        error!(image = %failure.image, node = %node_name, error = %err, "Failed to remove corrupt image");
        return;
    }

    if pod.owner_references().is_empty() {
        return;
    }
    let namespace = pod.namespace().unwrap_or_default();
    let pods: Api<Pod> = Api::namespaced(ctx.client.clone(), &namespace);
    match pods.delete(&pod.name_any(), &DeleteParams::default()).await {
        Ok(_) => {
            info!(pod = %pod.name_any(), namespace = %namespace, "Deleted pod after corrupt image cleanup");
        }
        Err(kube::Error::Api(ref response)) if response.code == 404 => {}
        Err(err) => {
            error!(pod = %pod.name_any(), error = %err, "Failed to delete pod after corrupt image cleanup");
        }
    }
}

/// The namespace must carry the allow annotation with the exact value.
async fn namespace_opted_in(ctx: &Context, namespace: &str) -> bool {
    let namespaces: Api<Namespace> = Api::all(ctx.client.clone());
    let Ok(Some(ns)) = namespaces.get_opt(namespace).await else {
        return false;
    };
    has_opt_in(
        ns.metadata.annotations.as_ref(),
        config::ANNOTATION_NAMESPACE_ALLOW,
    )
}

/// The pod, or any ancestor within two owner levels, must carry the
/// auto-salvage annotation. Short-circuits on first match.
async fn workload_opted_in(ctx: &Context, pod: &Pod, namespace: &str) -> bool {
    if has_opt_in(
        pod.metadata.annotations.as_ref(),
        config::ANNOTATION_POD_AUTO_SALVAGE,
    ) {
        return true;
    }

    let mut frontier: Vec<OwnerReference> = pod.owner_references().to_vec();
    for _ in 0..OWNER_WALK_DEPTH {
        if frontier.is_empty() {
            return false;
        }
        let mut next = Vec::new();
        for owner in &frontier {
            let Some(object) = get_owner(ctx, namespace, owner).await else {
                continue;
            };
            if has_opt_in(
                object.metadata.annotations.as_ref(),
                config::ANNOTATION_POD_AUTO_SALVAGE,
            ) {
                return true;
            }
            next.extend(object.owner_references().to_vec());
        }
        frontier = next;
    }
    false
}

async fn get_owner(
    ctx: &Context,
    namespace: &str,
    owner: &OwnerReference,
) -> Option<DynamicObject> {
    let (group, version) = match owner.api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), owner.api_version.clone()),
    };
    let gvk = GroupVersionKind {
        group,
        version,
        kind: owner.kind.clone(),
    };
    let resource = ApiResource::from_gvk(&gvk);
    let api: Api<DynamicObject> = Api::namespaced_with(ctx.client.clone(), namespace, &resource);
    match api.get_opt(&owner.name).await {
        Ok(object) => object,
        Err(err) => {
            debug!(kind = %owner.kind, name = %owner.name, error = %err, "Owner lookup failed");
            None
        }
    }
}

fn has_opt_in(
    annotations: Option<&std::collections::BTreeMap<String, String>>,
    key: &str,
) -> bool {
    annotations
        .and_then(|a| a.get(key))
        .is_some_and(|value| value == config::OPT_IN_VALUE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_has_opt_in_exact_value_only() {
        let mut annotations = BTreeMap::new();
        annotations.insert(config::ANNOTATION_POD_AUTO_SALVAGE.to_string(), "true".to_string());
        assert!(has_opt_in(Some(&annotations), config::ANNOTATION_POD_AUTO_SALVAGE));

        for bad in ["True", "TRUE", "yes", "1", ""] {
            let mut annotations = BTreeMap::new();
            annotations.insert(config::ANNOTATION_POD_AUTO_SALVAGE.to_string(), bad.to_string());
            assert!(
                !has_opt_in(Some(&annotations), config::ANNOTATION_POD_AUTO_SALVAGE),
                "value {bad:?} must not opt in"
            );
        }

        assert!(!has_opt_in(None, config::ANNOTATION_POD_AUTO_SALVAGE));
    }

    #[test]
    fn test_transient_requeue_delay() {
        assert_eq!(TRANSIENT_REQUEUE, Duration::from_secs(30));
    }
}
