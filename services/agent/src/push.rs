//! OCI distribution push for salvaged images.
//!
//! Implements the two upload legs of the distribution spec over HTTP:
//! monolithic blob uploads (HEAD, POST, PUT) and a manifest PUT. The input is
//! an exported OCI archive, so the push works from any agent without touching
//! the runtime again.
//!
//! Reference: https://github.com/opencontainers/distribution-spec

use std::path::{Path, PathBuf};

use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, info};

use crate::store::archive::{self, ImageManifest, UnpackedArchive};

/// Errors from registry pushes.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive: {0}")]
    Archive(#[from] archive::ArchiveError),

    #[error("invalid target ref {0:?}")]
    InvalidRef(String),

    #[error("archive contains no manifest")]
    NoManifest,

    #[error("authentication required by registry")]
    AuthRequired,

    #[error("{op} returned status {status}")]
    UnexpectedStatus { op: &'static str, status: StatusCode },

    #[error("upload did not return a location")]
    NoUploadLocation,
}

/// Credentials for basic auth; `None` pushes anonymously.
pub type Credentials = Option<(String, String)>;

/// A `host/repository:tag` target split into its parts.
#[derive(Debug, PartialEq, Eq)]
struct TargetRef {
    host: String,
    repository: String,
    tag: String,
}

/// Push an exported OCI archive to `target_ref`.
pub async fn push_archive(
    archive_path: &Path,
    target_ref: &str,
    credentials: Credentials,
    insecure: bool,
) -> Result<(), PushError> {
    let target = parse_target_ref(target_ref)?;
    let scheme = if insecure { "http" } else { "https" };
    let base = format!("{scheme}://{}/v2/{}", target.host, target.repository);

    let scratch = tempfile::tempdir()?;
    let unpacked = {
        let archive_path = archive_path.to_path_buf();
        let dest = scratch.path().join("unpacked");
        tokio::task::spawn_blocking(move || archive::unpack(&archive_path, &dest))
            .await
            .map_err(|e| PushError::Io(std::io::Error::other(e)))??
    };

    let (manifest, manifest_digest, manifest_bytes) = resolve_manifest(&unpacked)?;

    let client = Client::new();
    let pusher = Pusher {
        client,
        base,
        credentials,
    };

    for desc in std::iter::once(&manifest.config).chain(manifest.layers.iter()) {
        let blob = unpacked.blob_path(&desc.digest)?;
        pusher.upload_blob(&desc.digest, &blob).await?;
    }

    pusher
        .put_manifest(
            &target.tag,
            manifest
                .media_type
                .as_deref()
                .unwrap_or(archive::MEDIA_TYPE_OCI_MANIFEST),
            manifest_bytes,
        )
        .await?;

    info!(
        target = %target_ref,
        digest = %manifest_digest,
        layers = manifest.layers.len(),
        "Pushed image"
    );
    Ok(())
}

/// Pick the image manifest out of the archive, following one level of index
/// indirection when the runtime exported an index wrapper.
fn resolve_manifest(
    unpacked: &UnpackedArchive,
) -> Result<(ImageManifest, String, Vec<u8>), PushError> {
    let mut desc = unpacked
        .index
        .manifests
        .first()
        .cloned()
        .ok_or(PushError::NoManifest)?;

    if archive::is_index_media_type(&desc.media_type) {
        let bytes = std::fs::read(unpacked.blob_path(&desc.digest)?)?;
        let inner: archive::ImageIndex = serde_json::from_slice(&bytes)
            .map_err(|_| PushError::NoManifest)?;
        desc = inner.manifests.first().cloned().ok_or(PushError::NoManifest)?;
    }

    let path: PathBuf = unpacked.blob_path(&desc.digest)?;
    let bytes = std::fs::read(&path)?;
    let manifest: ImageManifest =
        serde_json::from_slice(&bytes).map_err(|_| PushError::NoManifest)?;
    Ok((manifest, desc.digest, bytes))
}

struct Pusher {
    client: Client,
    base: String,
    credentials: Credentials,
}

impl Pusher {
    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some((user, pass)) => req.basic_auth(user, Some(pass)),
            None => req,
        }
    }

    /// Upload one blob unless the registry already has it.
    async fn upload_blob(&self, digest: &str, path: &Path) -> Result<(), PushError> {
        let head_url = format!("{}/blobs/{digest}", self.base);
        let head = self.authed(self.client.head(&head_url)).send().await?;
        match head.status() {
            StatusCode::OK => {
                debug!(digest = %digest, "Blob already present");
                return Ok(());
            }
            StatusCode::UNAUTHORIZED => return Err(PushError::AuthRequired),
            _ => {}
        }

        let start_url = format!("{}/blobs/uploads/", self.base);
        let start = self.authed(self.client.post(&start_url)).send().await?;
        match start.status() {
            StatusCode::ACCEPTED => {}
            StatusCode::UNAUTHORIZED => return Err(PushError::AuthRequired),
            status => {
                return Err(PushError::UnexpectedStatus {
                    op: "starting blob upload",
                    status,
                });
            }
        }

        let location = start
            .headers()
            .get("Location")
            .and_then(|v| v.to_str().ok())
            .ok_or(PushError::NoUploadLocation)?;
        let put_url = upload_url(&self.base, location, digest);

        let data = tokio::fs::read(path).await?;
        let size = data.len();
        let put = self
            .authed(self.client.put(&put_url))
            .header("Content-Type", "application/octet-stream")
            .body(data)
            .send()
            .await?;
        match put.status() {
            StatusCode::CREATED => {
                debug!(digest = %digest, size, "Blob uploaded");
                Ok(())
            }
            StatusCode::UNAUTHORIZED => Err(PushError::AuthRequired),
            status => Err(PushError::UnexpectedStatus {
                op: "completing blob upload",
                status,
            }),
        }
    }

    async fn put_manifest(
        &self,
        tag: &str,
        media_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), PushError> {
        let url = format!("{}/manifests/{tag}", self.base);
        let resp = self
            .authed(self.client.put(&url))
            .header("Content-Type", media_type)
            .body(bytes)
            .send()
            .await?;
        match resp.status() {
            StatusCode::CREATED | StatusCode::OK => Ok(()),
            StatusCode::UNAUTHORIZED => Err(PushError::AuthRequired),
            status => Err(PushError::UnexpectedStatus {
                op: "putting manifest",
                status,
            }),
        }
    }
}

/// Resolve the PUT target from an upload `Location`, which registries return
/// either absolute or host-relative, and append the digest parameter.
fn upload_url(base: &str, location: &str, digest: &str) -> String {
    let absolute = if location.starts_with("http://") || location.starts_with("https://") {
        location.to_string()
    } else {
        // base is "<scheme>://<host>/v2/<repo>"; take scheme://host.
        let origin: String = {
            let scheme_end = base.find("//").map(|i| i + 2).unwrap_or(0);
            match base[scheme_end..].find('/') {
                Some(i) => base[..scheme_end + i].to_string(),
                None => base.to_string(),
            }
        };
        format!("{origin}{location}")
    };

    let separator = if absolute.contains('?') { '&' } else { '?' };
    format!("{absolute}{separator}digest={digest}")
}

/// Split `host/repository[:tag]` into parts. The host component must look
/// like a registry (contains `.` or `:`, or is `localhost`).
fn parse_target_ref(target_ref: &str) -> Result<TargetRef, PushError> {
    let (host, rest) = target_ref
        .split_once('/')
        .ok_or_else(|| PushError::InvalidRef(target_ref.to_string()))?;
    if !host.contains(['.', ':']) && host != "localhost" {
        return Err(PushError::InvalidRef(target_ref.to_string()));
    }

    let (repository, tag) = match rest.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo.to_string(), tag.to_string()),
        _ => (rest.to_string(), "latest".to_string()),
    };
    if repository.is_empty() {
        return Err(PushError::InvalidRef(target_ref.to_string()));
    }

    Ok(TargetRef {
        host: host.to_string(),
        repository,
        tag,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_ref() {
        let t = parse_target_ref("backup.example.com:5000/team/app:v1").unwrap();
        assert_eq!(t.host, "backup.example.com:5000");
        assert_eq!(t.repository, "team/app");
        assert_eq!(t.tag, "v1");
    }

    #[test]
    fn test_parse_target_ref_defaults_tag() {
        let t = parse_target_ref("backup.example.com/team/app").unwrap();
        assert_eq!(t.tag, "latest");
    }

    #[test]
    fn test_parse_target_ref_localhost() {
        let t = parse_target_ref("localhost/app:dev").unwrap();
        assert_eq!(t.host, "localhost");
        assert_eq!(t.repository, "app");
    }

    #[test]
    fn test_parse_target_ref_rejects_bare_name() {
        assert!(parse_target_ref("nginx:latest").is_err());
        assert!(parse_target_ref("team/app:v1").is_err());
    }

    #[test]
    fn test_upload_url_relative_location() {
        let url = upload_url(
            "https://backup.example.com/v2/team/app",
            "/v2/team/app/blobs/uploads/uuid-1",
            "sha256:abc",
        );
        assert_eq!(
            url,
            "https://backup.example.com/v2/team/app/blobs/uploads/uuid-1?digest=sha256:abc"
        );
    }

    #[test]
    fn test_upload_url_absolute_location_with_query() {
        let url = upload_url(
            "https://backup.example.com/v2/team/app",
            "https://backup.example.com/v2/team/app/blobs/uploads/uuid-1?state=x",
            "sha256:abc",
        );
        assert!(url.ends_with("state=x&digest=sha256:abc"));
    }
}
