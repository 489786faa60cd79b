//! Replayable upload bodies and temporary storage
//!
//! An upload may be attempted several times, so its payload has to be
//! re-readable from the start. Streams of unknown length are handed to a
//! [`TempStorage`] once, before the first attempt, which yields a replayable
//! source plus the byte length.

use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::Result;

/// Boxed async byte stream used for request bodies
pub type BoxReader = Pin<Box<dyn AsyncRead + Send + Sync>>;

/// A payload that can be opened again for every attempt
#[async_trait]
pub trait BodySource: Send + Sync {
    /// Open a fresh reader positioned at the start of the payload
    async fn open(&self) -> io::Result<BoxReader>;
}

#[async_trait]
impl BodySource for Bytes {
    async fn open(&self) -> io::Result<BoxReader> {
        Ok(Box::pin(io::Cursor::new(self.clone())))
    }
}

/// A payload read from a local file
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl BodySource for FileSource {
    async fn open(&self) -> io::Result<BoxReader> {
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(Box::pin(file))
    }
}

/// A replayable payload with its length
#[derive(Clone)]
pub struct StoredBody {
    pub source: Arc<dyn BodySource>,
    pub length: u64,
}

impl std::fmt::Debug for StoredBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredBody")
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// Temporary storage for payloads whose length is not known up front
///
/// Implementations consume the stream and return something that can be
/// replayed along with its byte length. Dropping the returned source signals
/// that the stored contents may be cleaned up.
#[async_trait]
pub trait TempStorage: Send + Sync {
    async fn store(&self, reader: BoxReader) -> Result<StoredBody>;
}

/// Fallback storage that buffers the whole payload in memory
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryStorage;

#[async_trait]
impl TempStorage for MemoryStorage {
    async fn store(&self, mut reader: BoxReader) -> Result<StoredBody> {
        let mut buf = Vec::new();
        let length = reader.read_to_end(&mut buf).await? as u64;
        Ok(StoredBody {
            source: Arc::new(Bytes::from(buf)),
            length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    async fn read_all(source: &dyn BodySource) -> Vec<u8> {
        let mut out = Vec::new();
        source.open().await.unwrap().read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn test_bytes_source_replays() {
        let source = Bytes::from_static(b"payload");
        assert_eq!(read_all(&source).await, b"payload");
        assert_eq!(read_all(&source).await, b"payload");
    }

    #[tokio::test]
    async fn test_file_source_replays() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"on disk").unwrap();
        file.flush().unwrap();

        let source = FileSource::new(file.path());
        assert_eq!(read_all(&source).await, b"on disk");
        assert_eq!(read_all(&source).await, b"on disk");
    }

    #[tokio::test]
    async fn test_file_source_missing() {
        let source = FileSource::new("/nonexistent/b2c-upload.bin");
        assert!(source.open().await.is_err());
    }

    #[tokio::test]
    async fn test_memory_storage() {
        let reader: BoxReader = Box::pin(&b"streamed without a length"[..]);
        let stored = MemoryStorage.store(reader).await.unwrap();
        assert_eq!(stored.length, 25);
        assert_eq!(read_all(stored.source.as_ref()).await, b"streamed without a length");
    }
}
