//! Agent endpoint resolution.
//!
//! Agents run as a DaemonSet; the instance for a node is found by listing
//! agent-labelled pods in the configured namespace and matching on
//! `spec.nodeName`. The pod IP plus the configured port is the endpoint.

use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::{Api, Client};
use salvor_proto::agent::v1::{RemoveImageRequest, ResolveTagRequest, SalvorAgentClient};
use salvor_tls::TlsMaterial;
use thiserror::Error;
use tracing::debug;

/// Label selector identifying agent pods.
const AGENT_LABEL_SELECTOR: &str =
    "app.kubernetes.io/name=salvor,app.kubernetes.io/component=agent";

/// Errors from agent lookups and calls.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("listing agent pods: {0}")]
    List(#[from] kube::Error),

    #[error("no agent pod found on node {0}")]
    NoAgent(String),

    #[error(transparent)]
    Dial(#[from] salvor_tls::DialError),

    #[error("agent call failed: {0}")]
    Rpc(#[from] tonic::Status),
}

/// Finds agent endpoints by node name and fronts direct agent calls.
pub struct AgentLocator {
    pods: Api<Pod>,
    port: u16,
    tls: Option<TlsMaterial>,
}

impl AgentLocator {
    pub fn new(client: Client, namespace: &str, port: u16, tls: Option<TlsMaterial>) -> Self {
        Self {
            pods: Api::namespaced(client, namespace),
            port,
            tls,
        }
    }

    async fn agent_pods(&self) -> Result<Vec<Pod>, EndpointError> {
        let list = self
            .pods
            .list(&ListParams::default().labels(AGENT_LABEL_SELECTOR))
            .await?;
        Ok(list.items)
    }

    /// The `ip:port` endpoint of the agent on the given node.
    pub async fn endpoint_for_node(&self, node_name: &str) -> Result<String, EndpointError> {
        for pod in self.agent_pods().await? {
            let on_node = pod
                .spec
                .as_ref()
                .and_then(|s| s.node_name.as_deref())
                .is_some_and(|n| n == node_name);
            let ip = pod.status.as_ref().and_then(|s| s.pod_ip.clone());
            if on_node {
                if let Some(ip) = ip {
                    return Ok(format!("{ip}:{}", self.port));
                }
            }
        }
        Err(EndpointError::NoAgent(node_name.to_string()))
    }

    /// Ask every agent in turn to resolve a tag, stopping at the first hit.
    /// Used as a fallback when node status truncates the image list. Returns
    /// `(digest, node)` or `None` when no agent has the image.
    pub async fn resolve_tag_via_agents(
        &self,
        image_ref: &str,
    ) -> Result<Option<(String, String)>, EndpointError> {
        let pods = self.agent_pods().await?;
        debug!(image = %image_ref, agents = pods.len(), "Querying agents for tag");

        for pod in pods {
            let Some(ip) = pod.status.as_ref().and_then(|s| s.pod_ip.clone()) else {
                continue;
            };
            let Some(node) = pod.spec.as_ref().and_then(|s| s.node_name.clone()) else {
                continue;
            };
            let endpoint = format!("{ip}:{}", self.port);
            match self.resolve_tag_from_agent(&endpoint, image_ref).await {
                Ok(digest) if !digest.is_empty() => {
                    debug!(image = %image_ref, digest = %digest, node = %node, "Resolved tag via agent");
                    return Ok(Some((digest, node)));
                }
                Ok(_) => {}
                Err(error) => {
                    debug!(endpoint = %endpoint, node = %node, error = %error, "Agent ResolveTag failed");
                }
            }
        }
        Ok(None)
    }

    /// Remove an image record on a specific node.
    pub async fn remove_image_on_node(
        &self,
        node_name: &str,
        image_ref: &str,
    ) -> Result<(), EndpointError> {
        let endpoint = self.endpoint_for_node(node_name).await?;
        let channel = salvor_tls::dial(&endpoint, self.tls.as_ref()).await?;
        SalvorAgentClient::new(channel)
            .remove_image(RemoveImageRequest {
                image_ref: image_ref.to_string(),
            })
            .await?;
        Ok(())
    }

    async fn resolve_tag_from_agent(
        &self,
        endpoint: &str,
        image_ref: &str,
    ) -> Result<String, EndpointError> {
        let channel = salvor_tls::dial(endpoint, self.tls.as_ref()).await?;
        let resp = SalvorAgentClient::new(channel)
            .resolve_tag(ResolveTagRequest {
                image_ref: image_ref.to_string(),
            })
            .await?;
        Ok(resp.into_inner().digest)
    }

    /// Client-side TLS material, shared with the orchestrator's dials.
    pub fn tls(&self) -> Option<&TlsMaterial> {
        self.tls.as_ref()
    }
}
