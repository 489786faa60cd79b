//! One-shot B2 API trait
//!
//! Each method performs exactly one network round trip and decodes the
//! response. Implementations tag failures into [`crate::Error`] variants so
//! the retry layer can classify them; they never retry on their own.

use async_trait::async_trait;

use crate::auth::{AuthToken, Credentials};
use crate::download::{Download, DownloadOptions};
use crate::error::Result;
use crate::types::{
    CancelledLargeFile, CopyFileOptions, DeletedFile, FileVersion, ListBucketsOptions,
    ListBucketsResponse, ListFileNamesOptions, ListFileNamesResponse, ListFileVersionsOptions,
    ListFileVersionsResponse, ListPartsOptions, ListPartsResponse,
    ListUnfinishedLargeFilesOptions, ListUnfinishedLargeFilesResponse, StartLargeFileOptions,
    UploadEndpoint, UploadedPart,
};
use crate::upload::{UploadPartRequest, UploadRequest};

/// Single-attempt B2 operations
///
/// Calls that need account authorization take the token explicitly; upload
/// calls take the upload endpoint instead.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait B2Api: Send + Sync {
    /// Exchange credentials for an account token
    async fn authorize_account(&self, credentials: &Credentials) -> Result<AuthToken>;

    async fn list_buckets(
        &self,
        auth: &AuthToken,
        options: &ListBucketsOptions,
    ) -> Result<ListBucketsResponse>;

    async fn list_file_names(
        &self,
        auth: &AuthToken,
        bucket_id: &str,
        options: &ListFileNamesOptions,
    ) -> Result<ListFileNamesResponse>;

    async fn list_file_versions(
        &self,
        auth: &AuthToken,
        bucket_id: &str,
        options: &ListFileVersionsOptions,
    ) -> Result<ListFileVersionsResponse>;

    async fn get_file_info(&self, auth: &AuthToken, file_id: &str) -> Result<FileVersion>;

    /// Server-side copy of a file or a byte range of it
    async fn copy_file(&self, auth: &AuthToken, options: &CopyFileOptions) -> Result<FileVersion>;

    async fn delete_file_version(
        &self,
        auth: &AuthToken,
        file_id: &str,
        file_name: &str,
    ) -> Result<DeletedFile>;

    async fn hide_file(
        &self,
        auth: &AuthToken,
        bucket_id: &str,
        file_name: &str,
    ) -> Result<FileVersion>;

    async fn start_large_file(
        &self,
        auth: &AuthToken,
        bucket_id: &str,
        options: &StartLargeFileOptions,
    ) -> Result<FileVersion>;

    /// Stitch uploaded parts together; `part_sha1s` is in part order
    async fn finish_large_file(
        &self,
        auth: &AuthToken,
        file_id: &str,
        part_sha1s: Vec<String>,
    ) -> Result<FileVersion>;

    async fn cancel_large_file(&self, auth: &AuthToken, file_id: &str)
    -> Result<CancelledLargeFile>;

    async fn list_parts(
        &self,
        auth: &AuthToken,
        file_id: &str,
        options: &ListPartsOptions,
    ) -> Result<ListPartsResponse>;

    async fn list_unfinished_large_files(
        &self,
        auth: &AuthToken,
        bucket_id: &str,
        options: &ListUnfinishedLargeFilesOptions,
    ) -> Result<ListUnfinishedLargeFilesResponse>;

    async fn get_upload_url(&self, auth: &AuthToken, bucket_id: &str) -> Result<UploadEndpoint>;

    async fn get_upload_part_url(&self, auth: &AuthToken, file_id: &str)
    -> Result<UploadEndpoint>;

    async fn upload_file(
        &self,
        endpoint: &UploadEndpoint,
        request: UploadRequest,
    ) -> Result<FileVersion>;

    async fn upload_part(
        &self,
        endpoint: &UploadEndpoint,
        request: UploadPartRequest,
    ) -> Result<UploadedPart>;

    /// Start a download from the account's download URL. Errors are returned
    /// before any of the body is handed out.
    async fn download_file_by_id(
        &self,
        auth: &AuthToken,
        file_id: &str,
        options: &DownloadOptions,
    ) -> Result<Download>;

    async fn download_file_by_name(
        &self,
        auth: &AuthToken,
        bucket_name: &str,
        file_name: &str,
        options: &DownloadOptions,
    ) -> Result<Download>;
}
