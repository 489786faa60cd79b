//! b2c-core: Core library for the b2c Backblaze B2 client
//!
//! This crate provides the reliability layer of the client:
//! - Exponential backoff with jitter
//! - Failure classification (retry, re-authorize, or give up)
//! - A shared account token cache
//! - A streaming reader that appends a SHA-1 digest to upload bodies
//! - The retry orchestrator, including the two-phase upload flow and
//!   downloads that hand back the body of the attempt that succeeded
//!
//! The crate does no HTTP itself. Network calls go through the [`B2Api`]
//! trait so the orchestrator can be driven by any transport, or by mocks in
//! tests.

pub mod api;
pub mod auth;
pub mod backoff;
pub mod classify;
pub mod config;
pub mod download;
pub mod error;
pub mod hash_reader;
pub mod retry;
pub mod storage;
pub mod types;
pub mod upload;

pub use api::B2Api;
pub use auth::{Allowed, AuthCache, AuthToken, Credentials};
pub use classify::{Classification, FailureKind, RequestPath, Verdict, classify};
pub use config::{ClientConfig, DEFAULT_API_URL, RetryBuilder, RetryConfig};
pub use download::{Download, DownloadBody, DownloadOptions};
pub use error::{Error, ErrorResponse, Result};
pub use hash_reader::HashedPostfixedReader;
pub use retry::RetryClient;
pub use storage::{BodySource, BoxReader, FileSource, MemoryStorage, StoredBody, TempStorage};
pub use types::{
    Bucket, BucketType, CancelledLargeFile, CopyFileOptions, DeletedFile, FileAction, FileVersion,
    ListBucketsOptions, ListBucketsResponse, ListFileNamesOptions, ListFileNamesResponse,
    ListFileVersionsOptions, ListFileVersionsResponse, ListPartsOptions, ListPartsResponse,
    ListUnfinishedLargeFilesOptions, ListUnfinishedLargeFilesResponse, MetadataDirective,
    StartLargeFileOptions, UploadEndpoint, UploadedPart,
};
pub use upload::{
    ContentSha1, PreparedBody, UploadBody, UploadFileOptions, UploadPartRequest, UploadRequest,
    prepare_body,
};

pub use tokio_util::sync::CancellationToken;
