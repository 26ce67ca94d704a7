//! In-memory image store doubles for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{ImageStore, StoreError};

/// Image store holding raw archive bytes per digest. Imported archives are
/// stored under the sha256 of their bytes, so a round trip of an image whose
/// digest matches its content is digest-stable.
#[derive(Debug, Default)]
pub struct FakeImageStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    images: HashMap<String, Vec<u8>>,
    tags: HashMap<String, String>,
}

impl FakeImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an image with the given digest and archive data.
    pub fn add_image(&self, digest: &str, data: Vec<u8>) {
        let mut inner = self.inner.lock().unwrap();
        inner.images.insert(digest.to_string(), data);
    }

    /// Map an image reference to a digest.
    pub fn add_tag(&self, image_ref: &str, digest: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.tags.insert(image_ref.to_string(), digest.to_string());
    }

    /// Digest that [`import`](ImageStore::import) will assign to `data`.
    pub fn content_digest(data: &[u8]) -> String {
        format!("sha256:{}", hex::encode(Sha256::digest(data)))
    }
}

#[async_trait]
impl ImageStore for FakeImageStore {
    async fn list(&self) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut digests: Vec<String> = inner.images.keys().cloned().collect();
        digests.sort();
        Ok(digests)
    }

    async fn has(&self, digest: &str) -> Result<bool, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.images.contains_key(digest))
    }

    async fn size(&self, digest: &str) -> Result<i64, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .images
            .get(digest)
            .map(|d| d.len() as i64)
            .ok_or_else(|| StoreError::NotFound(digest.to_string()))
    }

    async fn resolve_tag(&self, image_ref: &str) -> Result<String, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.tags.get(image_ref).cloned().unwrap_or_default())
    }

    async fn export(
        &self,
        digest: &str,
        w: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), StoreError> {
        let data = {
            let inner = self.inner.lock().unwrap();
            inner
                .images
                .get(digest)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(digest.to_string()))?
        };
        w.write_all(&data).await?;
        Ok(())
    }

    async fn import(&self, r: &mut (dyn AsyncRead + Send + Unpin)) -> Result<String, StoreError> {
        let mut data = Vec::new();
        r.read_to_end(&mut data).await?;
        let digest = Self::content_digest(&data);
        let mut inner = self.inner.lock().unwrap();
        inner.images.insert(digest.clone(), data);
        Ok(digest)
    }

    async fn remove(&self, image_ref: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.tags.remove(image_ref).is_some() {
            return Ok(());
        }
        if inner.images.remove(image_ref).is_some() {
            return Ok(());
        }
        Err(StoreError::NotFound(image_ref.to_string()))
    }
}

/// Image store that fails every operation, for error-path tests.
#[derive(Debug, Default)]
pub struct FailingImageStore;

fn unavailable() -> StoreError {
    StoreError::Runtime(tonic::Status::unavailable("runtime unreachable"))
}

#[async_trait]
impl ImageStore for FailingImageStore {
    async fn list(&self) -> Result<Vec<String>, StoreError> {
        Err(unavailable())
    }

    async fn has(&self, _digest: &str) -> Result<bool, StoreError> {
        Err(unavailable())
    }

    async fn size(&self, _digest: &str) -> Result<i64, StoreError> {
        Err(unavailable())
    }

    async fn resolve_tag(&self, _image_ref: &str) -> Result<String, StoreError> {
        Err(unavailable())
    }

    async fn export(
        &self,
        _digest: &str,
        _w: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<(), StoreError> {
        Err(unavailable())
    }

    async fn import(&self, _r: &mut (dyn AsyncRead + Send + Unpin)) -> Result<String, StoreError> {
        Err(unavailable())
    }

    async fn remove(&self, _image_ref: &str) -> Result<(), StoreError> {
        Err(unavailable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_store_round_trip() {
        let store = FakeImageStore::new();
        let data = b"archive bytes".to_vec();
        let digest = FakeImageStore::content_digest(&data);
        store.add_image(&digest, data.clone());

        assert!(store.has(&digest).await.unwrap());
        assert_eq!(store.size(&digest).await.unwrap(), data.len() as i64);

        let mut exported = Vec::new();
        store.export(&digest, &mut exported).await.unwrap();
        assert_eq!(exported, data);

        let imported = store.import(&mut exported.as_slice()).await.unwrap();
        assert_eq!(imported, digest);
    }

    #[tokio::test]
    async fn test_fake_store_tags() {
        let store = FakeImageStore::new();
        store.add_tag("registry/app:v1", "sha256:abc");
        assert_eq!(
            store.resolve_tag("registry/app:v1").await.unwrap(),
            "sha256:abc"
        );
        assert_eq!(store.resolve_tag("unknown:v1").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_fake_store_remove() {
        let store = FakeImageStore::new();
        store.add_image("sha256:abc", vec![1, 2, 3]);
        store.remove("sha256:abc").await.unwrap();
        assert!(matches!(
            store.remove("sha256:abc").await,
            Err(StoreError::NotFound(_))
        ));
    }
}
