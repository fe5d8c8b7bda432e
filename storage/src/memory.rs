use std::collections::HashMap;
use std::io::Cursor;

use bytes::Bytes;
use camino::{Utf8Path, Utf8PathBuf};
use http::request;
use tokio::{io::AsyncReadExt, sync::RwLock};

use storage_driver::{BoxReader, Driver, Metadata, Reader, StorageError, StorageErrorKind};

#[derive(Debug)]
struct MemoryFileItem {
    data: Bytes,
}

impl From<Vec<u8>> for MemoryFileItem {
    fn from(data: Vec<u8>) -> Self {
        Self { data: data.into() }
    }
}

impl From<&MemoryFileItem> for Metadata {
    fn from(value: &MemoryFileItem) -> Self {
        Self {
            size: value.data.len() as u64,
        }
    }
}

/// Storage driver that stores objects in memory.
///
/// Readers share the stored buffer, so opening one is cheap and never
/// blocks writers for longer than a map lookup.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: RwLock<HashMap<Utf8PathBuf, MemoryFileItem>>,
    redirect: Option<String>,
}

impl MemoryStorage {
    /// Create a new, empty `MemoryStorage` which never redirects.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out redirect URLs of the form `<base>/<path>` for stored objects.
    pub fn with_redirect(mut self, base: impl Into<String>) -> Self {
        self.redirect = Some(base.into());
        self
    }

    fn not_found(&self, remote: &Utf8Path) -> StorageError {
        StorageError::builder(
            self.name(),
            StorageErrorKind::NotFound,
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Path not found: {remote}"),
            ),
        )
        .path(remote.as_str())
        .build()
    }
}

#[async_trait::async_trait]
impl Driver for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn metadata(&self, remote: &Utf8Path) -> Result<Metadata, StorageError> {
        let objects = self.objects.read().await;
        Ok(objects
            .get(remote)
            .ok_or_else(|| self.not_found(remote))?
            .into())
    }

    async fn reader(&self, remote: &Utf8Path, offset: u64) -> Result<BoxReader, StorageError> {
        let data = {
            let objects = self.objects.read().await;
            objects
                .get(remote)
                .ok_or_else(|| self.not_found(remote))?
                .data
                .clone()
        };

        if offset > data.len() as u64 {
            return Err(StorageError::builder(
                self.name(),
                StorageErrorKind::InvalidRequest,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("offset {offset} beyond end of object ({})", data.len()),
                ),
            )
            .path(remote.as_str())
            .build());
        }

        let mut cursor = Cursor::new(data);
        cursor.set_position(offset);
        Ok(Box::new(cursor))
    }

    async fn redirect_url(
        &self,
        remote: &Utf8Path,
        _request: &request::Parts,
    ) -> Result<Option<String>, StorageError> {
        Ok(self.redirect.as_ref().map(|base| {
            format!(
                "{}/{}",
                base.trim_end_matches('/'),
                remote.as_str().trim_start_matches('/')
            )
        }))
    }

    async fn upload(&self, remote: &Utf8Path, local: &mut Reader<'_>) -> Result<(), StorageError> {
        let mut buf = Vec::new();

        local
            .read_to_end(&mut buf)
            .await
            .map_err(|err| StorageError::io(self.name(), err))?;

        tracing::trace!(%remote, "stored {} bytes in memory", buf.len());

        let mut objects = self.objects.write().await;
        objects.insert(remote.to_owned(), buf.into());

        Ok(())
    }
}
