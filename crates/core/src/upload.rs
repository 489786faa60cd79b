//! Upload options, one-shot upload requests and body preparation

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use jiff::Timestamp;
use sha1::Sha1;

use crate::error::Result;
use crate::hash_reader::HashedPostfixedReader;
use crate::storage::{BodySource, BoxReader, FileSource, StoredBody, TempStorage};

/// Let B2 pick the content type from the file name
pub const CONTENT_TYPE_AUTO: &str = "b2/x-auto";

/// Marker content type for hide markers
pub const CONTENT_TYPE_HIDE: &str = "application/x-bz-hide-marker";

/// `X-Bz-Content-Sha1` value announcing a digest after the payload
pub const HEX_DIGITS_AT_END: &str = "hex_digits_at_end";

/// How the SHA-1 of an upload is supplied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ContentSha1 {
    /// Computed while streaming and appended to the body
    #[default]
    AtEnd,
    /// Known ahead of time (hex)
    Provided(String),
}

/// Metadata for a single-file upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadFileOptions {
    pub file_name: String,

    /// `None` means `b2/x-auto`
    pub content_type: Option<String>,

    pub content_sha1: ContentSha1,

    pub src_last_modified: Option<Timestamp>,
    pub content_disposition: Option<String>,
    pub content_language: Option<String>,
    pub expires: Option<String>,
    pub cache_control: Option<String>,
    pub content_encoding: Option<String>,

    /// Custom `X-Bz-Info-*` entries, keyed without the prefix
    pub file_info: BTreeMap<String, String>,
}

impl UploadFileOptions {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            ..Default::default()
        }
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn content_sha1(mut self, sha1: impl Into<String>) -> Self {
        self.content_sha1 = ContentSha1::Provided(sha1.into());
        self
    }

    pub fn src_last_modified(mut self, ts: Timestamp) -> Self {
        self.src_last_modified = Some(ts);
        self
    }

    pub fn info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.file_info.insert(key.into(), value.into());
        self
    }
}

/// Payload for an upload
pub enum UploadBody {
    /// Re-openable payload of known length
    Replayable {
        source: Arc<dyn BodySource>,
        length: u64,
    },
    /// One-shot stream; buffered through temp storage before the first attempt
    Stream(BoxReader),
}

impl UploadBody {
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let length = data.len() as u64;
        UploadBody::Replayable {
            source: Arc::new(data),
            length,
        }
    }

    pub async fn file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let length = tokio::fs::metadata(path).await?.len();
        Ok(UploadBody::Replayable {
            source: Arc::new(FileSource::new(path)),
            length,
        })
    }

    pub fn stream(reader: BoxReader) -> Self {
        UploadBody::Stream(reader)
    }

    /// Turn this body into something every attempt can replay
    pub async fn into_stored(self, storage: &dyn TempStorage) -> Result<StoredBody> {
        match self {
            UploadBody::Replayable { source, length } => Ok(StoredBody { source, length }),
            UploadBody::Stream(reader) => storage.store(reader).await,
        }
    }
}

impl std::fmt::Debug for UploadBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadBody::Replayable { length, .. } => {
                f.debug_struct("Replayable").field("length", length).finish()
            }
            UploadBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// One upload attempt for `upload_file`
pub struct UploadRequest {
    pub options: UploadFileOptions,
    /// Payload length, not counting any appended digest
    pub content_length: u64,
    pub body: BoxReader,
}

/// One upload attempt for `upload_part`
pub struct UploadPartRequest {
    /// 1-based, up to 10000
    pub part_number: u32,
    pub content_sha1: ContentSha1,
    pub content_length: u64,
    pub body: BoxReader,
}

/// Body ready to be put on the wire
pub struct PreparedBody {
    pub reader: BoxReader,
    /// Bytes that will actually be sent, digest included
    pub content_length: u64,
    /// Value for `X-Bz-Content-Sha1`
    pub sha1_header: String,
}

/// Wrap the payload so its SHA-1 trails it when no digest was supplied
pub fn prepare_body(body: BoxReader, length: u64, sha1: &ContentSha1) -> PreparedBody {
    match sha1 {
        ContentSha1::Provided(hex) if hex != HEX_DIGITS_AT_END => PreparedBody {
            reader: body,
            content_length: length,
            sha1_header: hex.clone(),
        },
        _ => PreparedBody {
            reader: Box::pin(HashedPostfixedReader::<_, Sha1>::new(body)),
            content_length: HashedPostfixedReader::<BoxReader, Sha1>::postfixed_len(length),
            sha1_header: HEX_DIGITS_AT_END.to_string(),
        },
    }
}
