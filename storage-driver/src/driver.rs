use std::{fmt, ops::Deref, sync::Arc};

use camino::Utf8Path;
use http::request;
use tokio::io;

use crate::error::StorageError;

/// A reader stream used to feed content into a driver.
pub type Reader<'r> = dyn io::AsyncBufRead + Unpin + Send + Sync + 'r;

/// A byte stream over stored content which supports seeking.
pub trait SeekableRead: io::AsyncRead + io::AsyncSeek + Unpin + Send + Sync {}

impl<T> SeekableRead for T where T: io::AsyncRead + io::AsyncSeek + Unpin + Send + Sync {}

/// An owned, seekable reader handed out by a driver.
///
/// The handle is released when it is dropped.
pub type BoxReader = Box<dyn SeekableRead + 'static>;

/// File object metadata, which will be generically provided by the driver.
///
/// This struct only provides common metadata fields, and drivers may provide more specific
/// metadata fields directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Metadata {
    /// The size of the object in bytes.
    pub size: u64,
}

/// A storage driver, which provides the ability to interact with a storage backend.
///
/// Paths are absolute within the driver's namespace, e.g.
/// `/docker/registry/v2/blobs/sha256/ab/ab.../data`.
#[async_trait::async_trait]
pub trait Driver: fmt::Debug {
    /// The name of the driver.
    fn name(&self) -> &'static str;

    /// Get the metadata for an object, by path.
    async fn metadata(&self, remote: &Utf8Path) -> Result<Metadata, StorageError>;

    /// Open a seekable reader over an object, positioned at `offset`.
    async fn reader(&self, remote: &Utf8Path, offset: u64) -> Result<BoxReader, StorageError>;

    /// Produce a URL which lets the client fetch the object directly from the backend.
    ///
    /// Returns `None` when the driver declines to redirect, which is the default. The
    /// inbound request is provided since some backends derive signed URLs from it.
    async fn redirect_url(
        &self,
        remote: &Utf8Path,
        request: &request::Parts,
    ) -> Result<Option<String>, StorageError> {
        let _ = (remote, request);
        Ok(None)
    }

    /// Upload an object to the storage, using a reader stream to provide the contents.
    async fn upload(&self, remote: &Utf8Path, reader: &mut Reader<'_>) -> Result<(), StorageError>;
}

#[async_trait::async_trait]
impl<D> Driver for Arc<D>
where
    D: ?Sized + Driver + Sync + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.deref().name()
    }

    async fn metadata(&self, remote: &Utf8Path) -> Result<Metadata, StorageError> {
        self.deref().metadata(remote).await
    }

    async fn reader(&self, remote: &Utf8Path, offset: u64) -> Result<BoxReader, StorageError> {
        self.deref().reader(remote, offset).await
    }

    async fn redirect_url(
        &self,
        remote: &Utf8Path,
        request: &request::Parts,
    ) -> Result<Option<String>, StorageError> {
        self.deref().redirect_url(remote, request).await
    }

    async fn upload(&self, remote: &Utf8Path, reader: &mut Reader<'_>) -> Result<(), StorageError> {
        self.deref().upload(remote, reader).await
    }
}
