//! Blob descriptors and the services which resolve them

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use storage::{Storage, StorageError};

use crate::digest::{Digest, DigestError};
use crate::paths::PathResolver;

/// Media type reported for blobs when nothing more specific is known.
pub const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

/// Metadata describing a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Digest of the blob content
    pub digest: Digest,

    /// Size of the blob in bytes
    pub size: u64,

    /// Media type of the blob
    pub media_type: String,
}

impl Descriptor {
    /// Create a descriptor with the default media type.
    pub fn new(digest: Digest, size: u64) -> Self {
        Self {
            digest,
            size,
            media_type: DEFAULT_MEDIA_TYPE.to_owned(),
        }
    }
}

/// Errors returned when resolving a descriptor.
#[derive(Debug, thiserror::Error)]
pub enum StatError {
    /// No blob is known for the digest
    #[error("blob unknown")]
    NotFound,

    /// The digest cannot address a blob
    #[error(transparent)]
    InvalidDigest(#[from] DigestError),

    /// The resolver failed to answer
    #[error("descriptor lookup failed")]
    Failed(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl From<StorageError> for StatError {
    fn from(error: StorageError) -> Self {
        if error.is_not_found() {
            StatError::NotFound
        } else {
            StatError::Failed(Box::new(error))
        }
    }
}

/// Resolves a digest to the descriptor of the blob it names.
#[async_trait::async_trait]
pub trait BlobStatter: fmt::Debug + Send + Sync {
    /// Look up the descriptor for `digest`.
    async fn stat(&self, digest: &Digest) -> Result<Descriptor, StatError>;
}

#[async_trait::async_trait]
impl<S> BlobStatter for Arc<S>
where
    S: ?Sized + BlobStatter,
{
    async fn stat(&self, digest: &Digest) -> Result<Descriptor, StatError> {
        (**self).stat(digest).await
    }
}

/// Describes blobs by inspecting their data files in storage.
#[derive(Debug, Clone)]
pub struct DriverStatter {
    storage: Storage,
    paths: PathResolver,
}

impl DriverStatter {
    /// Create a statter over `storage`, locating blobs with `paths`.
    pub fn new(storage: Storage, paths: PathResolver) -> Self {
        Self { storage, paths }
    }
}

#[async_trait::async_trait]
impl BlobStatter for DriverStatter {
    #[tracing::instrument(skip(self), fields(driver = self.storage.name()))]
    async fn stat(&self, digest: &Digest) -> Result<Descriptor, StatError> {
        let path = self.paths.blob_data_path(digest)?;
        let metadata = self.storage.metadata(&path).await?;

        Ok(Descriptor::new(digest.clone(), metadata.size))
    }
}

/// Caches descriptors returned by an inner statter.
///
/// Only successful lookups are remembered, and at most `capacity` of them;
/// the least recently used descriptor is evicted first. A digest always names
/// the same content, so a cached descriptor never goes stale.
pub struct CachedStatter<S> {
    inner: S,
    cache: Mutex<LruCache<Digest, Descriptor>>,
}

impl<S: fmt::Debug> fmt::Debug for CachedStatter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cache = self.cache.lock();
        f.debug_struct("CachedStatter")
            .field("inner", &self.inner)
            .field("len", &cache.len())
            .field("capacity", &cache.cap())
            .finish()
    }
}

impl<S> CachedStatter<S> {
    /// Wrap `inner` with an empty cache holding up to `capacity` descriptors.
    pub fn new(inner: S, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of cached descriptors.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    /// Maximum number of cached descriptors.
    pub fn capacity(&self) -> NonZeroUsize {
        self.cache.lock().cap()
    }
}

#[async_trait::async_trait]
impl<S> BlobStatter for CachedStatter<S>
where
    S: BlobStatter,
{
    async fn stat(&self, digest: &Digest) -> Result<Descriptor, StatError> {
        let cached = self.cache.lock().get(digest).cloned();
        if let Some(descriptor) = cached {
            tracing::trace!(%digest, "descriptor cache hit");
            return Ok(descriptor);
        }

        let descriptor = self.inner.stat(digest).await?;
        self.cache.lock().put(digest.clone(), descriptor.clone());
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use storage::MemoryStorage;

    use super::*;

    #[derive(Debug, Default)]
    struct CountingStatter {
        calls: AtomicUsize,
        missing: Option<Digest>,
    }

    #[async_trait::async_trait]
    impl BlobStatter for CountingStatter {
        async fn stat(&self, digest: &Digest) -> Result<Descriptor, StatError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.missing.as_ref() == Some(digest) {
                Err(StatError::NotFound)
            } else {
                Ok(Descriptor::new(digest.clone(), 7))
            }
        }
    }

    fn capacity(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[tokio::test]
    async fn driver_statter_describes_stored_blob() {
        let storage: Storage = MemoryStorage::new().into();
        let paths = PathResolver::default();
        let data = b"some blob";
        let digest = Digest::sha256(data);

        storage
            .upload(&paths.blob_data_path(&digest).unwrap(), &mut &data[..])
            .await
            .unwrap();

        let statter = DriverStatter::new(storage, paths);
        let descriptor = statter.stat(&digest).await.unwrap();
        assert_eq!(descriptor.digest, digest);
        assert_eq!(descriptor.size, data.len() as u64);
        assert_eq!(descriptor.media_type, DEFAULT_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn driver_statter_reports_missing_blob() {
        let statter = DriverStatter::new(MemoryStorage::new().into(), PathResolver::default());
        let result = statter.stat(&Digest::sha256(b"missing")).await;
        assert!(matches!(result, Err(StatError::NotFound)));
    }

    #[tokio::test]
    async fn cache_remembers_hits_only() {
        let hit = Digest::sha256(b"present");
        let miss = Digest::sha256(b"absent");
        let statter = CachedStatter::new(
            CountingStatter {
                missing: Some(miss.clone()),
                ..Default::default()
            },
            capacity(16),
        );

        statter.stat(&hit).await.unwrap();
        statter.stat(&hit).await.unwrap();
        assert_eq!(statter.inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(statter.len(), 1);

        assert!(statter.stat(&miss).await.is_err());
        assert!(statter.stat(&miss).await.is_err());
        assert_eq!(statter.inner.calls.load(Ordering::SeqCst), 3);
        assert_eq!(statter.len(), 1);
    }

    #[tokio::test]
    async fn cache_is_bounded() {
        let statter = CachedStatter::new(CountingStatter::default(), capacity(8));
        assert_eq!(statter.capacity().get(), 8);
        assert!(statter.is_empty());

        for i in 0..1000u32 {
            statter.stat(&Digest::sha256(i.to_be_bytes())).await.unwrap();
            assert!(statter.len() <= 8);
        }
        assert_eq!(statter.len(), 8);
        assert_eq!(statter.inner.calls.load(Ordering::SeqCst), 1000);
    }

    #[tokio::test]
    async fn cache_evicts_least_recently_used() {
        let statter = CachedStatter::new(CountingStatter::default(), capacity(2));
        let (a, b, c) = (
            Digest::sha256(b"a"),
            Digest::sha256(b"b"),
            Digest::sha256(b"c"),
        );

        statter.stat(&a).await.unwrap();
        statter.stat(&b).await.unwrap();
        statter.stat(&a).await.unwrap();
        statter.stat(&c).await.unwrap();
        assert_eq!(statter.inner.calls.load(Ordering::SeqCst), 3);

        // `b` was least recently used and has been evicted.
        statter.stat(&a).await.unwrap();
        assert_eq!(statter.inner.calls.load(Ordering::SeqCst), 3);
        statter.stat(&b).await.unwrap();
        assert_eq!(statter.inner.calls.load(Ordering::SeqCst), 4);
    }
}
