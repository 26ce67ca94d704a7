//! Node inventory: locating cached image digests via node status.
//!
//! The kubelet reports cached images in `node.status.images`, grouping tag
//! and digest forms of the same content in one entry's `names` list. That
//! grouping is what lets a tag be bridged to a digest without touching the
//! node: a sibling scan inside one entry.

use k8s_openapi::api::core::v1::Node;
use kube::api::ListParams;
use kube::{Api, Client};

/// Locates nodes that have a specific image digest cached.
#[derive(Clone)]
pub struct Finder {
    nodes: Api<Node>,
}

impl Finder {
    pub fn new(client: Client) -> Self {
        Self {
            nodes: Api::all(client),
        }
    }

    /// Names of nodes whose reported image list contains the digest.
    pub async fn find_nodes(&self, digest: &str) -> Result<Vec<String>, kube::Error> {
        let node_list = self.nodes.list(&ListParams::default()).await?;
        Ok(nodes_with_digest(&node_list.items, digest))
    }

    /// Resolve a tag reference through grouped node image entries. Returns
    /// the digest from the first matching group and every node that has it.
    pub async fn find_nodes_by_tag(
        &self,
        image_tag: &str,
    ) -> Result<(String, Vec<String>), kube::Error> {
        let node_list = self.nodes.list(&ListParams::default()).await?;
        Ok(nodes_with_tag(&node_list.items, image_tag))
    }
}

/// Scan helper behind [`Finder::find_nodes`].
pub fn nodes_with_digest(nodes: &[Node], digest: &str) -> Vec<String> {
    nodes
        .iter()
        .filter(|node| node_has_digest(node, digest))
        .filter_map(|node| node.metadata.name.clone())
        .collect()
}

/// Scan helper behind [`Finder::find_nodes_by_tag`].
pub fn nodes_with_tag(nodes: &[Node], image_tag: &str) -> (String, Vec<String>) {
    let mut digest = String::new();
    let mut matches = Vec::new();

    for node in nodes {
        let Some(found) = node_digest_for_tag(node, image_tag) else {
            continue;
        };
        if digest.is_empty() {
            digest = found;
        }
        if let Some(name) = node.metadata.name.clone() {
            matches.push(name);
        }
    }

    (digest, matches)
}

/// True if any image name on the node ends in `@<digest>`.
///
/// `node.status.images[].names` carries entries like
/// `docker.io/library/nginx@sha256:abc...` and `docker.io/library/nginx:1.25`.
fn node_has_digest(node: &Node, digest: &str) -> bool {
    let suffix = format!("@{digest}");
    for_image_names(node, |name| name.ends_with(&suffix))
}

/// Digest from a node image entry that also contains the given tag. A group
/// matches iff one name equals the tag and a sibling name ends in
/// `@sha256:<64 hex>`.
fn node_digest_for_tag(node: &Node, image_tag: &str) -> Option<String> {
    let images = node.status.as_ref()?.images.as_ref()?;
    for image in images {
        let Some(names) = image.names.as_ref() else {
            continue;
        };
        let mut has_tag = false;
        let mut digest = None;
        for name in names {
            if name == image_tag {
                has_tag = true;
            }
            if let Some(idx) = name.rfind("@sha256:") {
                let candidate = &name[idx + 1..];
                if salvor_imageref::is_sha256_digest(candidate) {
                    digest = Some(candidate.to_string());
                }
            }
        }
        if has_tag {
            if let Some(digest) = digest {
                return Some(digest);
            }
        }
    }
    None
}

fn for_image_names(node: &Node, mut pred: impl FnMut(&str) -> bool) -> bool {
    let Some(images) = node.status.as_ref().and_then(|s| s.images.as_ref()) else {
        return false;
    };
    images
        .iter()
        .filter_map(|img| img.names.as_ref())
        .flatten()
        .any(|name| pred(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const HEX_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const HEX_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    fn node(name: &str, images: serde_json::Value) -> Node {
        serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Node",
            "metadata": {"name": name},
            "status": {"images": images},
        }))
        .unwrap()
    }

    #[test]
    fn test_nodes_with_digest() {
        let digest = format!("sha256:{HEX_A}");
        let nodes = vec![
            node(
                "node-1",
                json!([{"names": [format!("registry.example.com/app@{digest}"), "registry.example.com/app:v1"]}]),
            ),
            node(
                "node-2",
                json!([{"names": [format!("registry.example.com/other@sha256:{HEX_B}")]}]),
            ),
            node("node-3", json!([])),
        ];

        let got = nodes_with_digest(&nodes, &digest);
        assert_eq!(got, vec!["node-1"]);
    }

    #[test]
    fn test_nodes_with_digest_requires_suffix_match() {
        let digest = format!("sha256:{HEX_A}");
        // The digest appearing mid-name must not match.
        let nodes = vec![node(
            "node-1",
            json!([{"names": [format!("registry.example.com/app@{digest}.bak")]}]),
        )];
        assert!(nodes_with_digest(&nodes, &digest).is_empty());
    }

    #[test]
    fn test_nodes_with_tag_resolves_sibling_digest() {
        let nodes = vec![
            node(
                "node-1",
                json!([{
                    "names": [
                        "registry.example.com/app:v1",
                        format!("registry.example.com/app@sha256:{HEX_A}"),
                    ],
                }]),
            ),
            node(
                "node-2",
                json!([{
                    "names": [
                        "registry.example.com/app:v1",
                        format!("registry.example.com/app@sha256:{HEX_A}"),
                    ],
                }]),
            ),
        ];

        let (digest, matches) = nodes_with_tag(&nodes, "registry.example.com/app:v1");
        assert_eq!(digest, format!("sha256:{HEX_A}"));
        assert_eq!(matches, vec!["node-1", "node-2"]);
    }

    #[test]
    fn test_nodes_with_tag_requires_same_group() {
        // Tag in one entry, digest in another: the bridge must not cross
        // entries, because only a shared entry proves shared content.
        let nodes = vec![node(
            "node-1",
            json!([
                {"names": ["registry.example.com/app:v1"]},
                {"names": [format!("registry.example.com/other@sha256:{HEX_A}")]},
            ]),
        )];

        let (digest, matches) = nodes_with_tag(&nodes, "registry.example.com/app:v1");
        assert!(digest.is_empty());
        assert!(matches.is_empty());
    }

    #[test]
    fn test_nodes_with_tag_first_group_wins() {
        let nodes = vec![
            node(
                "node-1",
                json!([{
                    "names": ["app:latest", format!("app@sha256:{HEX_A}")],
                }]),
            ),
            node(
                "node-2",
                json!([{
                    "names": ["app:latest", format!("app@sha256:{HEX_B}")],
                }]),
            ),
        ];

        let (digest, matches) = nodes_with_tag(&nodes, "app:latest");
        assert_eq!(digest, format!("sha256:{HEX_A}"));
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn test_nodes_with_tag_unknown_tag() {
        let nodes = vec![node(
            "node-1",
            json!([{"names": ["app:v1", format!("app@sha256:{HEX_A}")]}]),
        )];
        let (digest, matches) = nodes_with_tag(&nodes, "app:v2");
        assert!(digest.is_empty());
        assert!(matches.is_empty());
    }

    #[test]
    fn test_node_without_status() {
        let node: Node = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Node",
            "metadata": {"name": "node-1"},
        }))
        .unwrap();
        assert!(nodes_with_digest(&[node], "sha256:abc").is_empty());
    }
}
