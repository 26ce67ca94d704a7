//! containerd-backed image store.
//!
//! Talks gRPC to the local containerd socket in the `k8s.io` namespace where
//! the kubelet keeps its images. Export and import go through the content
//! store and assemble the OCI archive ourselves: that path works against
//! containerd 1.x runtimes that lack the streaming transfer service.

use std::collections::HashSet;
use std::path::Path;

use containerd_client::services::v1::content_client::ContentClient;
use containerd_client::services::v1::images_client::ImagesClient;
use containerd_client::services::v1::{
    CreateImageRequest, DeleteImageRequest, Image, InfoRequest, ListImagesRequest,
    ReadContentRequest, WriteAction, WriteContentRequest,
};
use containerd_client::with_namespace;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;
use tonic::Code;
use tonic::Request;
use tracing::{debug, info};

use super::archive::{
    self, ArchiveWriter, Descriptor, ImageIndex, ANNOTATION_IMAGE_NAME, ANNOTATION_REF_NAME,
    CRI_IMAGE_LABEL, CRI_IMAGE_LABEL_VALUE, MEDIA_TYPE_OCI_INDEX,
};
use super::{ImageStore, StoreError};

/// Runtime namespace the kubelet stores images under.
const RUNTIME_NAMESPACE: &str = "k8s.io";

/// Chunk size for content-store blob uploads.
const WRITE_CHUNK_SIZE: usize = 1024 * 1024;

/// Image store backed by the local containerd socket.
pub struct ContainerdStore {
    channel: Channel,
}

impl ContainerdStore {
    /// Connect to containerd via the given socket path.
    pub async fn connect(socket_path: &str) -> Result<Self, StoreError> {
        let channel = containerd_client::connect(socket_path).await?;
        info!(socket = %socket_path, namespace = RUNTIME_NAMESPACE, "Connected to containerd");
        Ok(Self { channel })
    }

    fn images(&self) -> ImagesClient<Channel> {
        ImagesClient::new(self.channel.clone())
    }

    fn content(&self) -> ContentClient<Channel> {
        ContentClient::new(self.channel.clone())
    }

    /// First image record whose target matches the digest.
    async fn image_by_digest(&self, digest: &str) -> Result<Option<Image>, StoreError> {
        let req = ListImagesRequest {
            filters: vec![format!("target.digest=={digest}")],
        };
        let req = with_namespace!(req, RUNTIME_NAMESPACE);
        let resp = self.images().list(req).await?.into_inner();
        Ok(resp.images.into_iter().next())
    }

    /// Read a whole blob from the content store. A missing blob is the
    /// corrupt-image signal, not a plain not-found.
    async fn read_blob(&self, digest: &str) -> Result<Vec<u8>, StoreError> {
        let req = ReadContentRequest {
            digest: digest.to_string(),
            offset: 0,
            size: 0,
        };
        let req = with_namespace!(req, RUNTIME_NAMESPACE);
        let mut stream = self
            .content()
            .read(req)
            .await
            .map_err(|s| blob_error(digest, s))?
            .into_inner();

        let mut buf = Vec::new();
        loop {
            match stream.message().await {
                Ok(Some(chunk)) => buf.extend_from_slice(&chunk.data),
                Ok(None) => break,
                Err(s) => return Err(blob_error(digest, s)),
            }
        }
        Ok(buf)
    }

    /// Walk from a target descriptor to every referenced descriptor,
    /// top-level manifest first. Manifest payloads are parsed to discover
    /// children; configs and layers are leaves.
    async fn referenced_descriptors(
        &self,
        target: &Descriptor,
    ) -> Result<Vec<Descriptor>, StoreError> {
        let mut out = Vec::new();
        let mut stack = vec![target.clone()];
        let mut seen = HashSet::new();

        while let Some(desc) = stack.pop() {
            if !seen.insert(desc.digest.clone()) {
                continue;
            }
            if archive::is_manifest_media_type(&desc.media_type) {
                let raw = self.read_blob(&desc.digest).await?;
                if archive::is_index_media_type(&desc.media_type) {
                    let index: ImageIndex =
                        serde_json::from_slice(&raw).map_err(|e| malformed(&desc.digest, e))?;
                    stack.extend(index.manifests);
                } else {
                    let manifest: archive::ImageManifest =
                        serde_json::from_slice(&raw).map_err(|e| malformed(&desc.digest, e))?;
                    stack.push(manifest.config);
                    stack.extend(manifest.layers);
                }
            }
            out.push(desc);
        }
        Ok(out)
    }

    /// Upload one blob file to the content store, skipping blobs that are
    /// already present and tolerating concurrent writers.
    async fn write_blob(&self, digest: &str, path: &Path) -> Result<(), StoreError> {
        let info_req = InfoRequest {
            digest: digest.to_string(),
        };
        let info_req = with_namespace!(info_req, RUNTIME_NAMESPACE);
        if self.content().info(info_req).await.is_ok() {
            debug!(digest = %digest, "Blob already in content store");
            return Ok(());
        }

        let total = tokio::fs::metadata(path).await?.len() as i64;
        let reference = format!("salvor-import-{}", &digest[digest.len().saturating_sub(12)..]);

        let (tx, rx) = mpsc::channel::<WriteContentRequest>(4);
        let file_path = path.to_path_buf();
        let expected = digest.to_string();
        let write_ref = reference.clone();
        let producer = tokio::spawn(async move {
            let mut file = tokio::fs::File::open(&file_path).await?;
            let mut offset = 0i64;
            let mut buf = vec![0u8; WRITE_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                let req = WriteContentRequest {
                    action: WriteAction::Write as i32,
                    r#ref: write_ref.clone(),
                    total,
                    expected: String::new(),
                    offset,
                    data: buf[..n].to_vec(),
                    labels: Default::default(),
                };
                if tx.send(req).await.is_err() {
                    break;
                }
                offset += n as i64;
            }
            let commit = WriteContentRequest {
                action: WriteAction::Commit as i32,
                r#ref: write_ref,
                total,
                expected,
                offset,
                data: Vec::new(),
                labels: Default::default(),
            };
            let _ = tx.send(commit).await;
            Ok::<_, std::io::Error>(())
        });

        let outbound = ReceiverStream::new(rx);
        let outbound = with_namespace!(outbound, RUNTIME_NAMESPACE);
        let result = async {
            let mut inbound = self.content().write(outbound).await?.into_inner();
            while inbound.message().await?.is_some() {}
            Ok::<_, tonic::Status>(())
        }
        .await;

        match result {
            Ok(()) => {}
            Err(status) if status.code() == Code::AlreadyExists => {
                debug!(digest = %digest, "Blob committed by a concurrent writer");
            }
            Err(status) => return Err(StoreError::Runtime(status)),
        }

        producer
            .await
            .map_err(|e| StoreError::Malformed(format!("blob upload task: {e}")))??;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ImageStore for ContainerdStore {
    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let req = ListImagesRequest { filters: vec![] };
        let req = with_namespace!(req, RUNTIME_NAMESPACE);
        let resp = self.images().list(req).await?.into_inner();

        let mut seen = HashSet::new();
        let mut digests = Vec::new();
        for img in resp.images {
            let Some(target) = img.target else { continue };
            if seen.insert(target.digest.clone()) {
                digests.push(target.digest);
            }
        }
        Ok(digests)
    }

    async fn has(&self, digest: &str) -> Result<bool, StoreError> {
        Ok(self.image_by_digest(digest).await?.is_some())
    }

    async fn size(&self, digest: &str) -> Result<i64, StoreError> {
        let img = self
            .image_by_digest(digest)
            .await?
            .ok_or_else(|| StoreError::NotFound(digest.to_string()))?;
        let target = img
            .target
            .ok_or_else(|| StoreError::Malformed(format!("image {digest} has no target")))?;

        let descriptors = self
            .referenced_descriptors(&runtime_descriptor(&target))
            .await?;
        Ok(descriptors.iter().map(|d| d.size).sum())
    }

    async fn resolve_tag(&self, image_ref: &str) -> Result<String, StoreError> {
        let req = ListImagesRequest {
            filters: vec![format!("name=={image_ref}")],
        };
        let req = with_namespace!(req, RUNTIME_NAMESPACE);
        let resp = self.images().list(req).await?.into_inner();
        Ok(resp
            .images
            .into_iter()
            .find_map(|img| img.target.map(|t| t.digest))
            .unwrap_or_default())
    }

    async fn export(
        &self,
        digest: &str,
        w: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), StoreError> {
        let img = self
            .image_by_digest(digest)
            .await?
            .ok_or_else(|| StoreError::NotFound(digest.to_string()))?;
        let target = img
            .target
            .as_ref()
            .ok_or_else(|| StoreError::Malformed(format!("image {digest} has no target")))?;

        let mut top = runtime_descriptor(target);
        top.annotations = Some(
            [
                (ANNOTATION_IMAGE_NAME.to_string(), img.name.clone()),
                (ANNOTATION_REF_NAME.to_string(), img.name.clone()),
            ]
            .into(),
        );

        let blobs = self.referenced_descriptors(&top).await?;

        let index = ImageIndex {
            schema_version: 2,
            media_type: Some(MEDIA_TYPE_OCI_INDEX.to_string()),
            manifests: vec![top],
        };
        let index_bytes = serde_json::to_vec(&index)
            .map_err(|e| StoreError::Malformed(format!("encoding index: {e}")))?;

        let mut writer = ArchiveWriter::new(w);
        writer.write_layout().await?;
        writer.write_file("index.json", &index_bytes).await?;

        for desc in &blobs {
            let hex = desc.hex()?;
            writer
                .begin_file(&archive::blob_entry_path(hex), desc.size as u64)
                .await?;

            let req = ReadContentRequest {
                digest: desc.digest.clone(),
                offset: 0,
                size: 0,
            };
            let req = with_namespace!(req, RUNTIME_NAMESPACE);
            let mut stream = self
                .content()
                .read(req)
                .await
                .map_err(|s| blob_error(&desc.digest, s))?
                .into_inner();

            let mut written = 0u64;
            loop {
                match stream.message().await {
                    Ok(Some(chunk)) => {
                        writer.write_data(&chunk.data).await?;
                        written += chunk.data.len() as u64;
                    }
                    Ok(None) => break,
                    Err(s) => return Err(blob_error(&desc.digest, s)),
                }
            }
            if written != desc.size as u64 {
                return Err(StoreError::Malformed(format!(
                    "blob {} truncated: got {written} bytes, want {}",
                    desc.digest, desc.size
                )));
            }
            writer.end_file(written).await?;
        }

        writer.finish().await?;
        debug!(digest = %digest, blobs = blobs.len(), "Exported image archive");
        Ok(())
    }

    async fn import(&self, r: &mut (dyn AsyncRead + Send + Unpin)) -> Result<String, StoreError> {
        // Spool the stream to disk; the tar must be unpacked before its blobs
        // can be pushed to the content store.
        let scratch = tempfile::tempdir()?;
        let archive_path = scratch.path().join("archive.tar");
        let mut spool = tokio::fs::File::create(&archive_path).await?;
        tokio::io::copy(r, &mut spool).await?;
        spool.flush().await?;
        drop(spool);

        let unpack_dir = scratch.path().join("unpacked");
        let unpacked = {
            let archive_path = archive_path.clone();
            tokio::task::spawn_blocking(move || archive::unpack(&archive_path, &unpack_dir))
                .await
                .map_err(|e| StoreError::Malformed(format!("unpack task: {e}")))??
        };

        if unpacked.index.manifests.is_empty() {
            return Err(StoreError::Malformed(
                "no manifests in imported archive".to_string(),
            ));
        }

        for (digest, path) in unpacked.blobs()? {
            self.write_blob(&digest, &path).await?;
        }

        // Blobs alone are invisible to the kubelet; create an image record
        // per manifest so the image service lists it.
        let mut last_digest = String::new();
        for manifest in &unpacked.index.manifests {
            let name = manifest
                .annotations
                .as_ref()
                .and_then(|a| {
                    a.get(ANNOTATION_IMAGE_NAME)
                        .or_else(|| a.get(ANNOTATION_REF_NAME))
                })
                .cloned()
                .unwrap_or_else(|| manifest.digest.clone());

            let record = Image {
                name: name.clone(),
                labels: [(CRI_IMAGE_LABEL.to_string(), CRI_IMAGE_LABEL_VALUE.to_string())].into(),
                target: Some(containerd_client::types::Descriptor {
                    media_type: manifest.media_type.clone(),
                    digest: manifest.digest.clone(),
                    size: manifest.size,
                    annotations: Default::default(),
                }),
                ..Default::default()
            };
            let req = CreateImageRequest {
                image: Some(record),
                ..Default::default()
            };
            let req = with_namespace!(req, RUNTIME_NAMESPACE);
            match self.images().create(req).await {
                Ok(_) => {
                    info!(name = %name, digest = %manifest.digest, "Created image record");
                }
                Err(status) if status.code() == Code::AlreadyExists => {
                    debug!(name = %name, "Image record already exists");
                }
                Err(status) => return Err(StoreError::Runtime(status)),
            }
            last_digest = manifest.digest.clone();
        }

        Ok(last_digest)
    }

    async fn remove(&self, image_ref: &str) -> Result<(), StoreError> {
        let req = DeleteImageRequest {
            name: image_ref.to_string(),
            sync: false,
        };
        let req = with_namespace!(req, RUNTIME_NAMESPACE);
        match self.images().delete(req).await {
            Ok(_) => Ok(()),
            Err(status) if status.code() == Code::NotFound => {
                Err(StoreError::NotFound(image_ref.to_string()))
            }
            Err(status) => Err(StoreError::Runtime(status)),
        }
    }
}

/// Convert a runtime descriptor to the archive descriptor shape.
fn runtime_descriptor(d: &containerd_client::types::Descriptor) -> Descriptor {
    Descriptor {
        media_type: d.media_type.clone(),
        digest: d.digest.clone(),
        size: d.size,
        annotations: None,
    }
}

fn blob_error(digest: &str, status: tonic::Status) -> StoreError {
    if status.code() == Code::NotFound {
        StoreError::BlobMissing {
            digest: digest.to_string(),
        }
    } else {
        StoreError::Runtime(status)
    }
}

fn malformed(digest: &str, err: serde_json::Error) -> StoreError {
    StoreError::Malformed(format!("parsing manifest {digest}: {err}"))
}
