//! # Storage backends
//!
//! Configuration and unification for the storage backends.

use std::sync::Arc;

use camino::Utf8Path;
#[cfg(feature = "local")]
use camino::Utf8PathBuf;
use http::request;
use serde::Deserialize;
use tokio::io;

#[cfg(feature = "local")]
pub(crate) mod local;

pub(crate) mod memory;

#[cfg(feature = "local")]
#[doc(inline)]
pub use local::LocalDriver;

#[doc(inline)]
pub use memory::MemoryStorage;

#[doc(inline)]
pub use storage_driver::{
    BoxReader, Driver, Metadata, Reader, SeekableRead, StorageError, StorageErrorKind,
};

/// Selects and configures a storage backend.
///
/// ```toml
/// [storage]
/// local = { path = "/var/lib/blobs" }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageConfig {
    /// Keep objects in memory. Optionally hand out redirects rooted at `redirect`.
    Memory {
        /// Base URL used to build redirect URLs.
        #[serde(default)]
        redirect: Option<String>,
    },

    /// Keep objects on the local filesystem below `path`.
    #[cfg(feature = "local")]
    Local {
        /// Root directory for stored objects.
        path: Utf8PathBuf,
    },
}

impl StorageConfig {
    /// Construct the configured backend.
    #[tracing::instrument]
    pub async fn build(self) -> Result<Storage, StorageError> {
        let client: Storage = match self {
            StorageConfig::Memory { redirect: None } => MemoryStorage::new().into(),
            StorageConfig::Memory {
                redirect: Some(base),
            } => MemoryStorage::new().with_redirect(base).into(),
            #[cfg(feature = "local")]
            StorageConfig::Local { path } => LocalDriver::open(path).await?.into(),
        };
        Ok(client)
    }
}

pub(crate) type ArcDriver = Arc<dyn Driver + Send + Sync>;

/// A shared handle to a storage driver.
#[derive(Debug, Clone)]
pub struct Storage {
    driver: ArcDriver,
}

impl<D> From<D> for Storage
where
    D: Driver + Send + Sync + 'static,
{
    fn from(value: D) -> Self {
        Storage::new(value)
    }
}

impl Storage {
    /// Wrap a driver in a shared handle.
    pub fn new<D: Driver + Send + Sync + 'static>(driver: D) -> Self {
        Self {
            driver: Arc::new(driver),
        }
    }

    /// The name of the underlying driver.
    pub fn name(&self) -> &'static str {
        self.driver.name()
    }

    /// Get the metadata for an object.
    #[tracing::instrument(skip(self), fields(driver=self.driver.name()))]
    pub async fn metadata(&self, remote: &Utf8Path) -> Result<Metadata, StorageError> {
        self.driver.metadata(remote).await
    }

    /// Open a seekable reader over an object, starting at `offset`.
    #[tracing::instrument(skip(self), fields(driver=self.driver.name()))]
    pub async fn reader(&self, remote: &Utf8Path, offset: u64) -> Result<BoxReader, StorageError> {
        tracing::trace!(%remote, "Opening reader at {offset}");
        self.driver.reader(remote, offset).await
    }

    /// Ask the driver for a direct-access URL for an object.
    #[tracing::instrument(skip(self, request), fields(driver=self.driver.name()))]
    pub async fn redirect_url(
        &self,
        remote: &Utf8Path,
        request: &request::Parts,
    ) -> Result<Option<String>, StorageError> {
        self.driver.redirect_url(remote, request).await
    }

    /// Upload an object from a reader.
    #[tracing::instrument(skip(self, reader), fields(driver=self.driver.name()))]
    pub async fn upload<'d, R>(&'d self, remote: &Utf8Path, reader: &mut R) -> Result<(), StorageError>
    where
        R: io::AsyncBufRead + Unpin + Send + Sync + 'd,
    {
        tracing::trace!(%remote, "Uploading to: {remote}");
        self.driver.upload(remote, reader).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_config_builds_memory_driver() {
        let config: StorageConfig =
            serde_json::from_str(r#"{"memory": {}}"#).expect("valid config");
        let storage = config.build().await.unwrap();
        assert_eq!(storage.name(), "memory");
    }

    #[tokio::test]
    async fn storage_handle_round_trips_through_driver() {
        let storage: Storage = MemoryStorage::new().into();
        let path = Utf8Path::new("/blobs/data");
        storage.upload(path, &mut &b"abc"[..]).await.unwrap();

        let metadata = storage.metadata(path).await.unwrap();
        assert_eq!(metadata.size, 3);
    }
}
