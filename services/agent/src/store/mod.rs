//! Typed access to the node-local image store.
//!
//! The [`ImageStore`] trait is the agent's only view of the container
//! runtime. The production implementation speaks gRPC to containerd
//! ([`ContainerdStore`]); tests use the in-memory [`fake::FakeImageStore`].

pub mod archive;
pub mod containerd;
pub mod fake;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

pub use containerd::ContainerdStore;

pub use archive::ArchiveError;

/// Errors from image store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No image record matches the digest or reference.
    #[error("image {0} not found")]
    NotFound(String),

    /// An image record exists but a referenced content blob is gone.
    #[error("content {digest} missing from store")]
    BlobMissing { digest: String },

    /// Archive assembly or parsing failed.
    #[error("archive: {0}")]
    Archive(#[from] ArchiveError),

    /// The runtime returned an RPC error.
    #[error("runtime: {0}")]
    Runtime(#[from] tonic::Status),

    /// The runtime socket could not be reached.
    #[error("connecting to runtime: {0}")]
    Connect(#[from] tonic::transport::Error),

    /// Local I/O failed (spool files, pipes).
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// The store returned data we could not interpret.
    #[error("{0}")]
    Malformed(String),
}

/// Node-local image store operations, scoped to the runtime namespace the
/// kubelet uses.
#[async_trait]
pub trait ImageStore: Send + Sync + 'static {
    /// All unique image digests in the store.
    async fn list(&self) -> Result<Vec<String>, StoreError>;

    /// True when the digest has an image record.
    async fn has(&self, digest: &str) -> Result<bool, StoreError>;

    /// Total content size in bytes, including every referenced blob.
    async fn size(&self, digest: &str) -> Result<i64, StoreError>;

    /// Digest for an image reference, empty when unknown.
    async fn resolve_tag(&self, image_ref: &str) -> Result<String, StoreError>;

    /// Write an OCI archive of the image and all referenced blobs to `w`.
    async fn export(
        &self,
        digest: &str,
        w: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), StoreError>;

    /// Read an OCI archive from `r`, store its blobs, and create an image
    /// record per manifest. Returns the last created digest.
    async fn import(&self, r: &mut (dyn AsyncRead + Send + Unpin)) -> Result<String, StoreError>;

    /// Delete an image record (blobs are left for the garbage collector).
    async fn remove(&self, image_ref: &str) -> Result<(), StoreError>;
}
