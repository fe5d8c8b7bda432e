use std::io::SeekFrom;

use camino::{Utf8Path, Utf8PathBuf};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use storage_driver::{BoxReader, Driver, Metadata, Reader, StorageError, StorageErrorKind};

/// Storage driver backed by a directory on the local filesystem.
///
/// Object paths are interpreted relative to the root directory. This driver
/// never hands out redirect URLs.
#[derive(Debug)]
pub struct LocalDriver {
    root: Utf8PathBuf,
}

impl LocalDriver {
    /// Create a driver rooted at `root`. The directory is created lazily on upload.
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    /// Create a driver rooted at `root`, creating the directory if needed.
    pub async fn open(root: Utf8PathBuf) -> Result<Self, StorageError> {
        tokio::fs::create_dir_all(&root).await.map_err(|err| {
            StorageError::builder("local", err.kind().into(), err)
                .path(root.as_str())
                .context("create root directory")
                .build()
        })?;
        Ok(Self::new(root))
    }

    fn path(&self, remote: &Utf8Path) -> Utf8PathBuf {
        let mut path = self.root.clone();
        path.push(remote.as_str().trim_start_matches('/'));
        path
    }

    fn error(&self, remote: &Utf8Path, context: &str, err: std::io::Error) -> StorageError {
        StorageError::builder(self.name(), err.kind().into(), err)
            .path(remote.as_str())
            .context(context)
            .build()
    }
}

#[async_trait::async_trait]
impl Driver for LocalDriver {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn metadata(&self, remote: &Utf8Path) -> Result<Metadata, StorageError> {
        let metadata = tokio::fs::metadata(self.path(remote))
            .await
            .map_err(|err| self.error(remote, "metadata", err))?;

        if metadata.is_dir() {
            return Err(StorageError::builder(
                self.name(),
                StorageErrorKind::NotFound,
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("Path is a directory: {remote}"),
                ),
            )
            .path(remote.as_str())
            .build());
        }

        Ok(Metadata {
            size: metadata.len(),
        })
    }

    async fn reader(&self, remote: &Utf8Path, offset: u64) -> Result<BoxReader, StorageError> {
        let mut file = tokio::fs::File::open(self.path(remote))
            .await
            .map_err(|err| self.error(remote, "open remote file", err))?;

        if offset > 0 {
            file.seek(SeekFrom::Start(offset))
                .await
                .map_err(|err| self.error(remote, "seek", err))?;
        }

        Ok(Box::new(tokio::io::BufReader::new(file)))
    }

    async fn upload(&self, remote: &Utf8Path, local: &mut Reader<'_>) -> Result<(), StorageError> {
        let target = self.path(remote);

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| self.error(remote, "create_dir_all", err))?;
        }

        let mut writer = tokio::io::BufWriter::new(
            tokio::fs::File::create(&target)
                .await
                .map_err(|err| self.error(remote, "create remote file", err))?,
        );

        tokio::io::copy(local, &mut writer)
            .await
            .map_err(|err| self.error(remote, "copy", err))?;

        writer
            .shutdown()
            .await
            .map_err(|err| self.error(remote, "shutdown writer", err))?;

        tracing::trace!(%remote, %target, "stored object on disk");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    fn tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap().to_owned();
        (dir, root)
    }

    #[tokio::test]
    async fn upload_then_read_from_offset() {
        let (_dir, root) = tempdir();
        let driver = LocalDriver::open(root).await.unwrap();
        let path = Utf8Path::new("/docker/registry/v2/blobs/sha256/ab/abcd/data");

        driver.upload(path, &mut &b"0123456789"[..]).await.unwrap();
        assert_eq!(driver.metadata(path).await.unwrap().size, 10);

        let mut reader = driver.reader(path, 4).await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"456789");
    }

    #[tokio::test]
    async fn missing_file_and_directories_are_not_found() {
        let (_dir, root) = tempdir();
        let driver = LocalDriver::open(root).await.unwrap();
        let path = Utf8Path::new("/blobs/sha256/ab/abcd/data");

        let err = driver.reader(path, 0).await.err().expect("missing");
        assert!(err.is_not_found());

        driver.upload(path, &mut &b"x"[..]).await.unwrap();
        let err = driver
            .metadata(Utf8Path::new("/blobs/sha256/ab"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
