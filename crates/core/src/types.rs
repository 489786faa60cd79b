//! B2 resource types
//!
//! Only the shapes the client actually drives are modeled here. Field names
//! follow the API's camelCase JSON.

use std::collections::BTreeMap;
use std::fmt;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Bucket visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BucketType {
    #[serde(rename = "allPublic")]
    AllPublic,
    #[serde(rename = "allPrivate")]
    AllPrivate,
    #[serde(rename = "snapshot")]
    Snapshot,
    /// Only meaningful as a `b2_list_buckets` filter
    #[serde(rename = "all")]
    All,
}

impl fmt::Display for BucketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketType::AllPublic => write!(f, "allPublic"),
            BucketType::AllPrivate => write!(f, "allPrivate"),
            BucketType::Snapshot => write!(f, "snapshot"),
            BucketType::All => write!(f, "all"),
        }
    }
}

impl std::str::FromStr for BucketType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allPublic" => Ok(BucketType::AllPublic),
            "allPrivate" => Ok(BucketType::AllPrivate),
            "snapshot" => Ok(BucketType::Snapshot),
            "all" => Ok(BucketType::All),
            _ => Err(format!("Invalid bucket type: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub account_id: String,
    pub bucket_id: String,
    pub bucket_name: String,
    pub bucket_type: BucketType,

    #[serde(default)]
    pub bucket_info: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub revision: u64,
}

/// State of a file version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    /// Large file started but not finished or cancelled
    Start,
    Upload,
    /// Hide marker
    Hide,
    /// Virtual folder produced by delimiter listings
    Folder,
}

/// A single file version as returned by most file endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileVersion {
    #[serde(default)]
    pub account_id: String,

    #[serde(default)]
    pub bucket_id: String,

    #[serde(default)]
    pub file_id: Option<String>,

    pub file_name: String,
    pub action: FileAction,

    #[serde(default)]
    pub content_length: u64,

    #[serde(default)]
    pub content_sha1: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_md5: Option<String>,

    #[serde(default)]
    pub content_type: Option<String>,

    #[serde(default)]
    pub file_info: BTreeMap<String, String>,

    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub upload_timestamp: i64,
}

impl FileVersion {
    pub fn uploaded_at(&self) -> Option<Timestamp> {
        Timestamp::from_millisecond(self.upload_timestamp).ok()
    }
}

/// A part of a large file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedPart {
    pub file_id: String,
    pub part_number: u32,
    pub content_length: u64,
    pub content_sha1: String,

    #[serde(default)]
    pub upload_timestamp: i64,
}

/// Upload URL and its dedicated token, from `b2_get_upload_url` or
/// `b2_get_upload_part_url`
///
/// The pair is meant for one uploader at a time and may stop working after
/// some failures; it is never shared between logical uploads.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadEndpoint {
    pub upload_url: String,
    pub authorization_token: String,

    #[serde(default)]
    pub bucket_id: Option<String>,

    /// Set for part upload URLs
    #[serde(default)]
    pub file_id: Option<String>,
}

impl fmt::Debug for UploadEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadEndpoint")
            .field("upload_url", &self.upload_url)
            .field("authorization_token", &"<redacted>")
            .field("bucket_id", &self.bucket_id)
            .field("file_id", &self.file_id)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListBucketsOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bucket_types: Vec<BucketType>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ListBucketsResponse {
    pub buckets: Vec<Bucket>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFileNamesOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_file_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_count: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFileNamesResponse {
    pub files: Vec<FileVersion>,

    /// Pass as `start_file_name` to continue listing
    #[serde(default)]
    pub next_file_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFileVersionsOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_file_name: Option<String>,

    /// Only valid together with `start_file_name`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_file_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_count: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFileVersionsResponse {
    pub files: Vec<FileVersion>,

    #[serde(default)]
    pub next_file_name: Option<String>,

    #[serde(default)]
    pub next_file_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPartsOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_part_number: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_part_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPartsResponse {
    pub parts: Vec<UploadedPart>,

    #[serde(default)]
    pub next_part_number: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUnfinishedLargeFilesOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_file_id: Option<String>,

    /// At most 100
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUnfinishedLargeFilesResponse {
    pub files: Vec<FileVersion>,

    #[serde(default)]
    pub next_file_id: Option<String>,
}

/// Whether a server-side copy keeps the source metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetadataDirective {
    Copy,
    /// Use `content_type` and `file_info` from the request
    Replace,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyFileOptions {
    pub source_file_id: String,
    pub file_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_bucket_id: Option<String>,

    /// e.g. `bytes=1000-2000`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_directive: Option<MetadataDirective>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub file_info: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartLargeFileOptions {
    pub file_name: String,

    /// Defaults to `b2/x-auto` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub file_info: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedFile {
    pub file_id: String,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledLargeFile {
    pub account_id: String,
    pub bucket_id: String,
    pub file_id: String,
    pub file_name: String,
}
