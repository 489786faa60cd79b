//! Download requests and streaming responses

use std::collections::BTreeMap;
use std::fmt;
use std::pin::Pin;

use tokio::io::AsyncRead;

/// Streaming body of a download
pub type DownloadBody = Pin<Box<dyn AsyncRead + Send>>;

/// Optional range and response header overrides for a download
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Sent as the `Range` header, e.g. `bytes=0-99`
    pub range: Option<String>,
    pub content_disposition: Option<String>,
    pub content_language: Option<String>,
    pub expires: Option<String>,
    pub cache_control: Option<String>,
    pub content_encoding: Option<String>,
    pub content_type: Option<String>,
}

impl DownloadOptions {
    pub fn range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn content_disposition(mut self, value: impl Into<String>) -> Self {
        self.content_disposition = Some(value.into());
        self
    }

    /// Query parameters that ask B2 to override the stored response headers
    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("b2ContentDisposition", &self.content_disposition),
            ("b2ContentLanguage", &self.content_language),
            ("b2Expires", &self.expires),
            ("b2CacheControl", &self.cache_control),
            ("b2ContentEncoding", &self.content_encoding),
            ("b2ContentType", &self.content_type),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_deref().map(|v| (key, v)))
        .collect()
    }
}

/// A successful download
///
/// The body streams from the connection of the attempt that succeeded.
/// Responses of failed attempts are dropped before the next one starts.
pub struct Download {
    pub body: DownloadBody,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub content_sha1: Option<String>,
    pub content_range: Option<String>,
    pub file_id: Option<String>,
    pub file_name: Option<String>,
    /// `X-Bz-Info-*` headers, keys without the prefix
    pub file_info: BTreeMap<String, String>,
}

impl Download {
    pub fn new(body: DownloadBody) -> Self {
        Self {
            body,
            content_length: None,
            content_type: None,
            content_sha1: None,
            content_range: None,
            file_id: None,
            file_name: None,
            file_info: BTreeMap::new(),
        }
    }
}

impl fmt::Debug for Download {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Download")
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .field("content_sha1", &self.content_sha1)
            .field("content_range", &self.content_range)
            .field("file_id", &self.file_id)
            .field("file_name", &self.file_name)
            .field("file_info", &self.file_info)
            .finish_non_exhaustive()
    }
}
