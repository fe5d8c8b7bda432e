//! Size-bounded readers over blob data

use std::collections::VecDeque;
use std::io::{self, SeekFrom};

use bytes::Bytes;
use camino::{Utf8Path, Utf8PathBuf};
use futures::Stream;
use storage::{BoxReader, Storage, StorageError};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

const CHUNK_SIZE: usize = 32 * 1024;

/// An exclusively owned reader over one blob, bounded to the descriptor size.
///
/// The underlying storage handle is released when the reader, or the stream
/// produced from it, is dropped.
pub struct BlobReader {
    inner: BoxReader,
    path: Utf8PathBuf,
    size: u64,
}

impl std::fmt::Debug for BlobReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobReader")
            .field("path", &self.path)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl BlobReader {
    /// Open a reader over `size` bytes stored at `path`.
    pub async fn open(storage: &Storage, path: &Utf8Path, size: u64) -> Result<Self, StorageError> {
        let inner = storage.reader(path, 0).await?;
        Ok(Self {
            inner,
            path: path.to_owned(),
            size,
        })
    }

    /// Stream the given segments in order.
    ///
    /// Each segment's `prefix` is emitted before its bytes and the `trailer`
    /// after the last one. Reads never go past `size`; a backend that returns
    /// fewer bytes than promised ends the stream with an error.
    pub(crate) fn into_stream(
        self,
        segments: Vec<Segment>,
        trailer: Bytes,
    ) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
        let state = StreamState {
            reader: self,
            segments: segments.into(),
            remaining: 0,
            trailer: Some(trailer).filter(|t| !t.is_empty()),
            failed: false,
        };

        futures::stream::unfold(state, |mut state| async move {
            let item = state.next_chunk().await?;
            Some((item, state))
        })
    }
}

impl Drop for BlobReader {
    fn drop(&mut self) {
        tracing::trace!(path = %self.path, "released blob reader");
    }
}

/// A byte range to stream, optionally preceded by framing bytes.
#[derive(Debug, Clone)]
pub(crate) struct Segment {
    pub(crate) prefix: Bytes,
    pub(crate) start: u64,
    pub(crate) length: u64,
}

impl Segment {
    pub(crate) fn new(start: u64, length: u64) -> Self {
        Self {
            prefix: Bytes::new(),
            start,
            length,
        }
    }
}

struct StreamState {
    reader: BlobReader,
    segments: VecDeque<Segment>,
    remaining: u64,
    trailer: Option<Bytes>,
    failed: bool,
}

impl StreamState {
    async fn next_chunk(&mut self) -> Option<io::Result<Bytes>> {
        if self.failed {
            return None;
        }

        let result = self.advance().await;
        if let Some(Err(error)) = &result {
            tracing::error!(path = %self.reader.path, %error, "blob stream failed");
            self.failed = true;
        }
        result
    }

    async fn advance(&mut self) -> Option<io::Result<Bytes>> {
        loop {
            if self.remaining > 0 {
                return Some(self.read_chunk().await);
            }

            let Some(segment) = self.segments.pop_front() else {
                return self.trailer.take().map(Ok);
            };

            if segment.start.saturating_add(segment.length) > self.reader.size {
                return Some(Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "segment extends past end of blob",
                )));
            }

            if let Err(error) = self
                .reader
                .inner
                .seek(SeekFrom::Start(segment.start))
                .await
            {
                return Some(Err(error));
            }
            self.remaining = segment.length;

            if !segment.prefix.is_empty() {
                return Some(Ok(segment.prefix));
            }
        }
    }

    async fn read_chunk(&mut self) -> io::Result<Bytes> {
        let want = self.remaining.min(CHUNK_SIZE as u64) as usize;
        let mut buf = vec![0u8; want];
        let n = self.reader.inner.read(&mut buf).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("blob ended {} bytes early", self.remaining),
            ));
        }
        buf.truncate(n);
        self.remaining -= n as u64;
        Ok(Bytes::from(buf))
    }
}
