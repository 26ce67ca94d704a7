//! OCI image archive framing.
//!
//! The wire payload between agents is an OCI image layout in a tar stream:
//! `oci-layout`, `index.json`, and `blobs/sha256/<hex>` for the manifest,
//! config, and every layer. The writer streams entries into an `AsyncWrite`
//! so exports never buffer an image in memory; the reader unpacks a spooled
//! archive on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// OCI image index media type.
pub const MEDIA_TYPE_OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";

/// OCI image manifest media type.
pub const MEDIA_TYPE_OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";

/// Docker schema2 manifest media type.
pub const MEDIA_TYPE_DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Docker schema2 manifest list media type.
pub const MEDIA_TYPE_DOCKER_MANIFEST_LIST: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

/// Annotation carrying the full image record name across the wire.
pub const ANNOTATION_IMAGE_NAME: &str = "containerd.io/image.name";

/// Standard OCI reference-name annotation, used as a fallback.
pub const ANNOTATION_REF_NAME: &str = "org.opencontainers.image.ref.name";

/// Label that marks an image record as kubelet-managed so the CRI layer
/// recognises it.
pub const CRI_IMAGE_LABEL: &str = "io.cri-containerd.image";

/// Value for [`CRI_IMAGE_LABEL`].
pub const CRI_IMAGE_LABEL_VALUE: &str = "managed";

const OCI_LAYOUT: &[u8] = br#"{"imageLayoutVersion":"1.0.0"}"#;

/// Errors from archive assembly and parsing.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Underlying I/O failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON document in the archive was malformed.
    #[error("parsing {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },

    /// The archive carries no `index.json`.
    #[error("archive missing index.json")]
    MissingIndex,

    /// The index references a blob the archive does not contain.
    #[error("archive missing blob {digest}")]
    MissingBlob { digest: String },

    /// A descriptor digest was not `sha256:<hex>`.
    #[error("unsupported digest {0}")]
    UnsupportedDigest(String),
}

/// An OCI content descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: String,
    pub size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
}

impl Descriptor {
    /// Hex portion of a `sha256:` digest.
    pub fn hex(&self) -> Result<&str, ArchiveError> {
        self.digest
            .strip_prefix("sha256:")
            .ok_or_else(|| ArchiveError::UnsupportedDigest(self.digest.clone()))
    }
}

/// An OCI image index (also the shape of `index.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub manifests: Vec<Descriptor>,
}

/// An OCI image manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
}

/// True for media types whose payload references further descriptors.
pub fn is_manifest_media_type(media_type: &str) -> bool {
    matches!(
        media_type,
        MEDIA_TYPE_OCI_INDEX
            | MEDIA_TYPE_OCI_MANIFEST
            | MEDIA_TYPE_DOCKER_MANIFEST
            | MEDIA_TYPE_DOCKER_MANIFEST_LIST
    )
}

/// True for index/list media types.
pub fn is_index_media_type(media_type: &str) -> bool {
    matches!(
        media_type,
        MEDIA_TYPE_OCI_INDEX | MEDIA_TYPE_DOCKER_MANIFEST_LIST
    )
}

/// In-archive path of a blob.
pub fn blob_entry_path(hex: &str) -> String {
    format!("blobs/sha256/{hex}")
}

/// Streaming tar writer for the OCI layout.
pub struct ArchiveWriter<'a, W: ?Sized> {
    w: &'a mut W,
}

impl<'a, W: AsyncWrite + Send + Unpin + ?Sized> ArchiveWriter<'a, W> {
    pub fn new(w: &'a mut W) -> Self {
        Self { w }
    }

    /// Write the fixed `oci-layout` marker entry.
    pub async fn write_layout(&mut self) -> Result<(), ArchiveError> {
        self.write_file("oci-layout", OCI_LAYOUT).await
    }

    /// Write a whole small entry at once.
    pub async fn write_file(&mut self, path: &str, data: &[u8]) -> Result<(), ArchiveError> {
        self.begin_file(path, data.len() as u64).await?;
        self.w.write_all(data).await?;
        self.end_file(data.len() as u64).await
    }

    /// Write the header for an entry whose data will be streamed with
    /// [`write_data`](Self::write_data), then closed by
    /// [`end_file`](Self::end_file) with the same size.
    pub async fn begin_file(&mut self, path: &str, size: u64) -> Result<(), ArchiveError> {
        let mut header = tar::Header::new_gnu();
        header.set_path(path)?;
        header.set_size(size);
        header.set_mode(0o444);
        header.set_mtime(0);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        self.w.write_all(header.as_bytes()).await?;
        Ok(())
    }

    /// Stream a slice of entry data.
    pub async fn write_data(&mut self, data: &[u8]) -> Result<(), ArchiveError> {
        self.w.write_all(data).await?;
        Ok(())
    }

    /// Pad the entry out to the 512-byte tar block boundary.
    pub async fn end_file(&mut self, size: u64) -> Result<(), ArchiveError> {
        let remainder = (size % 512) as usize;
        if remainder != 0 {
            self.w.write_all(&[0u8; 512][..512 - remainder]).await?;
        }
        Ok(())
    }

    /// Write the two terminating zero blocks and flush.
    pub async fn finish(mut self) -> Result<(), ArchiveError> {
        self.w.write_all(&[0u8; 1024]).await?;
        self.w.flush().await?;
        Ok(())
    }
}

/// An archive unpacked to a scratch directory.
#[derive(Debug)]
pub struct UnpackedArchive {
    pub index: ImageIndex,
    root: PathBuf,
}

impl UnpackedArchive {
    /// Path of a blob file inside the unpacked layout; errors when the
    /// archive did not contain it.
    pub fn blob_path(&self, digest: &str) -> Result<PathBuf, ArchiveError> {
        let hex = digest
            .strip_prefix("sha256:")
            .ok_or_else(|| ArchiveError::UnsupportedDigest(digest.to_string()))?;
        let path = self.root.join("blobs").join("sha256").join(hex);
        if !path.is_file() {
            return Err(ArchiveError::MissingBlob {
                digest: digest.to_string(),
            });
        }
        Ok(path)
    }

    /// All blob files present in the layout as `(digest, path)` pairs.
    pub fn blobs(&self) -> Result<Vec<(String, PathBuf)>, ArchiveError> {
        let dir = self.root.join("blobs").join("sha256");
        let mut out = Vec::new();
        if !dir.is_dir() {
            return Ok(out);
        }
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(hex) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            out.push((format!("sha256:{hex}"), entry.path()));
        }
        out.sort();
        Ok(out)
    }

    /// Parse a manifest blob from the layout.
    pub fn read_manifest(&self, digest: &str) -> Result<ImageManifest, ArchiveError> {
        let path = self.blob_path(digest)?;
        let bytes = std::fs::read(&path)?;
        serde_json::from_slice(&bytes).map_err(|source| ArchiveError::Json {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Unpack a spooled archive into `dest` and parse its index.
///
/// Blocking; call from `spawn_blocking`.
pub fn unpack(archive: &Path, dest: &Path) -> Result<UnpackedArchive, ArchiveError> {
    std::fs::create_dir_all(dest)?;
    let file = std::fs::File::open(archive)?;
    let mut ar = tar::Archive::new(file);
    ar.unpack(dest)?;

    let index_path = dest.join("index.json");
    let bytes = std::fs::read(&index_path).map_err(|_| ArchiveError::MissingIndex)?;
    let index: ImageIndex = serde_json::from_slice(&bytes).map_err(|source| ArchiveError::Json {
        path: index_path.display().to_string(),
        source,
    })?;

    Ok(UnpackedArchive {
        index,
        root: dest.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use sha2::{Digest as _, Sha256};

    fn digest_of(data: &[u8]) -> String {
        format!("sha256:{}", hex::encode(Sha256::digest(data)))
    }

    /// Build a minimal single-manifest archive in memory.
    pub(crate) async fn build_test_archive(image_name: &str) -> (Vec<u8>, String) {
        let config = br#"{"architecture":"amd64","os":"linux"}"#.to_vec();
        let layer = vec![7u8; 1000];
        let config_digest = digest_of(&config);
        let layer_digest = digest_of(&layer);

        let manifest = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": MEDIA_TYPE_OCI_MANIFEST,
            "config": {
                "mediaType": "application/vnd.oci.image.config.v1+json",
                "digest": config_digest,
                "size": config.len(),
            },
            "layers": [{
                "mediaType": "application/vnd.oci.image.layer.v1.tar",
                "digest": layer_digest,
                "size": layer.len(),
            }],
        });
        let manifest_bytes = serde_json::to_vec(&manifest).unwrap();
        let manifest_digest = digest_of(&manifest_bytes);

        let index = ImageIndex {
            schema_version: 2,
            media_type: Some(MEDIA_TYPE_OCI_INDEX.to_string()),
            manifests: vec![Descriptor {
                media_type: MEDIA_TYPE_OCI_MANIFEST.to_string(),
                digest: manifest_digest.clone(),
                size: manifest_bytes.len() as i64,
                annotations: Some(HashMap::from([(
                    ANNOTATION_IMAGE_NAME.to_string(),
                    image_name.to_string(),
                )])),
            }],
        };
        let index_bytes = serde_json::to_vec(&index).unwrap();

        let mut buf = Vec::new();
        let mut writer = ArchiveWriter::new(&mut buf);
        writer.write_layout().await.unwrap();
        writer.write_file("index.json", &index_bytes).await.unwrap();
        for (digest, data) in [
            (&manifest_digest, &manifest_bytes),
            (&config_digest, &config),
            (&layer_digest, &layer),
        ] {
            let hex = digest.strip_prefix("sha256:").unwrap();
            writer
                .write_file(&blob_entry_path(hex), data)
                .await
                .unwrap();
        }
        writer.finish().await.unwrap();

        (buf, manifest_digest)
    }

    #[tokio::test]
    async fn test_archive_round_trip() {
        let (archive_bytes, manifest_digest) = build_test_archive("registry.example.com/app:v1").await;

        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("archive.tar");
        std::fs::write(&archive_path, &archive_bytes).unwrap();

        let unpacked = unpack(&archive_path, &dir.path().join("out")).unwrap();
        assert_eq!(unpacked.index.manifests.len(), 1);

        let top = &unpacked.index.manifests[0];
        assert_eq!(top.digest, manifest_digest);
        assert_eq!(
            top.annotations.as_ref().unwrap()[ANNOTATION_IMAGE_NAME],
            "registry.example.com/app:v1"
        );

        let manifest = unpacked.read_manifest(&manifest_digest).unwrap();
        assert_eq!(manifest.layers.len(), 1);

        // Every referenced blob must be present.
        unpacked.blob_path(&manifest.config.digest).unwrap();
        unpacked.blob_path(&manifest.layers[0].digest).unwrap();
        assert_eq!(unpacked.blobs().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unpack_rejects_missing_index() {
        let mut buf = Vec::new();
        let mut writer = ArchiveWriter::new(&mut buf);
        writer.write_layout().await.unwrap();
        writer.finish().await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("archive.tar");
        std::fs::write(&archive_path, &buf).unwrap();

        assert!(matches!(
            unpack(&archive_path, &dir.path().join("out")),
            Err(ArchiveError::MissingIndex)
        ));
    }

    #[tokio::test]
    async fn test_missing_blob_reported() {
        let (archive_bytes, _) = build_test_archive("app:v1").await;
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("archive.tar");
        std::fs::write(&archive_path, &archive_bytes).unwrap();

        let unpacked = unpack(&archive_path, &dir.path().join("out")).unwrap();
        let absent = "sha256:ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff";
        assert!(matches!(
            unpacked.blob_path(absent),
            Err(ArchiveError::MissingBlob { .. })
        ));
    }

    #[test]
    fn test_media_type_predicates() {
        assert!(is_manifest_media_type(MEDIA_TYPE_OCI_MANIFEST));
        assert!(is_manifest_media_type(MEDIA_TYPE_DOCKER_MANIFEST_LIST));
        assert!(is_index_media_type(MEDIA_TYPE_OCI_INDEX));
        assert!(!is_index_media_type(MEDIA_TYPE_OCI_MANIFEST));
        assert!(!is_manifest_media_type(
            "application/vnd.oci.image.layer.v1.tar"
        ));
    }
}
