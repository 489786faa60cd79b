//! Retry orchestration for B2 operations
//!
//! [`RetryClient`] wraps a one-shot [`B2Api`] and drives every logical call
//! through an explicit state loop: make sure an account token is cached,
//! run the attempt, classify any failure, then either give up or sleep and
//! go again. Uploads add a phase that fetches a fresh upload endpoint.
//!
//! One attempt counter covers every phase of a call. Each failed network
//! attempt spends one unit of `max_attempts`; fatal errors and cancellation
//! return at once without spending anything.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use humansize::{DECIMAL, format_size};
use tokio_util::sync::CancellationToken;

use crate::api::B2Api;
use crate::auth::{AuthCache, AuthToken, Credentials};
use crate::backoff;
use crate::classify::{Classification, RequestPath, classify};
use crate::config::RetryConfig;
use crate::download::{Download, DownloadOptions};
use crate::error::{Error, Result};
use crate::storage::{MemoryStorage, TempStorage};
use crate::types::{
    CancelledLargeFile, CopyFileOptions, DeletedFile, FileVersion, ListBucketsOptions,
    ListBucketsResponse, ListFileNamesOptions, ListFileNamesResponse, ListFileVersionsOptions,
    ListFileVersionsResponse, ListPartsOptions, ListPartsResponse,
    ListUnfinishedLargeFilesOptions, ListUnfinishedLargeFilesResponse, StartLargeFileOptions,
    UploadEndpoint, UploadedPart,
};
use crate::upload::{ContentSha1, UploadBody, UploadFileOptions, UploadPartRequest, UploadRequest};

/// Failed attempts within one logical call
#[derive(Debug)]
struct Attempts {
    failed: u32,
    max: u32,
}

impl Attempts {
    fn new(max: u32) -> Self {
        Self { failed: 0, max }
    }

    /// Count a failure; true once the budget is spent
    fn record_failure(&mut self) -> bool {
        self.failed += 1;
        self.failed >= self.max
    }
}

/// States of a plain API call
enum CallState {
    NeedAuth,
    Authorized(AuthToken),
}

/// States of an upload
enum UploadState {
    NeedAuth,
    NeedEndpoint(AuthToken),
    Uploading(UploadEndpoint),
}

/// B2 client that authorizes as needed and retries transient failures
///
/// Safe to share between tasks: the only shared mutable state is the
/// account token cache, and every call keeps its own attempt counter.
pub struct RetryClient<A> {
    api: A,
    credentials: Credentials,
    config: RetryConfig,
    auth: AuthCache,
    storage: Arc<dyn TempStorage>,
}

impl<A: B2Api> RetryClient<A> {
    pub fn new(api: A, credentials: Credentials, config: RetryConfig) -> Self {
        Self {
            api,
            credentials,
            config,
            auth: AuthCache::new(),
            storage: Arc::new(MemoryStorage),
        }
    }

    /// Storage used to buffer upload streams of unknown length
    pub fn with_temp_storage(mut self, storage: Arc<dyn TempStorage>) -> Self {
        self.storage = storage;
        self
    }

    /// Seed the cache with a token obtained elsewhere
    pub fn with_auth(self, token: AuthToken) -> Self {
        self.auth.set(token);
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn auth_cache(&self) -> &AuthCache {
        &self.auth
    }

    /// Drop the cached token, forcing the next call to re-authorize
    pub fn invalidate_authorization(&self) {
        self.auth.invalidate();
    }

    /// Return the cached token, authorizing first if there is none
    pub async fn authorize_if_needed(&self, ctx: &CancellationToken) -> Result<AuthToken> {
        let mut attempts = Attempts::new(self.config.max_attempts());
        self.ensure_auth(ctx, &mut attempts).await
    }

    pub async fn list_buckets(
        &self,
        ctx: &CancellationToken,
        options: &ListBucketsOptions,
    ) -> Result<ListBucketsResponse> {
        self.execute(ctx, "list_buckets", |auth| async move {
            self.api.list_buckets(&auth, options).await
        })
        .await
    }

    pub async fn list_file_names(
        &self,
        ctx: &CancellationToken,
        bucket_id: &str,
        options: &ListFileNamesOptions,
    ) -> Result<ListFileNamesResponse> {
        self.execute(ctx, "list_file_names", |auth| async move {
            self.api.list_file_names(&auth, bucket_id, options).await
        })
        .await
    }

    pub async fn list_file_versions(
        &self,
        ctx: &CancellationToken,
        bucket_id: &str,
        options: &ListFileVersionsOptions,
    ) -> Result<ListFileVersionsResponse> {
        self.execute(ctx, "list_file_versions", |auth| async move {
            self.api.list_file_versions(&auth, bucket_id, options).await
        })
        .await
    }

    pub async fn get_file_info(&self, ctx: &CancellationToken, file_id: &str) -> Result<FileVersion> {
        self.execute(ctx, "get_file_info", |auth| async move {
            self.api.get_file_info(&auth, file_id).await
        })
        .await
    }

    pub async fn copy_file(
        &self,
        ctx: &CancellationToken,
        options: &CopyFileOptions,
    ) -> Result<FileVersion> {
        self.execute(ctx, "copy_file", |auth| async move {
            self.api.copy_file(&auth, options).await
        })
        .await
    }

    pub async fn delete_file_version(
        &self,
        ctx: &CancellationToken,
        file_id: &str,
        file_name: &str,
    ) -> Result<DeletedFile> {
        self.execute(ctx, "delete_file_version", |auth| async move {
            self.api.delete_file_version(&auth, file_id, file_name).await
        })
        .await
    }

    pub async fn hide_file(
        &self,
        ctx: &CancellationToken,
        bucket_id: &str,
        file_name: &str,
    ) -> Result<FileVersion> {
        self.execute(ctx, "hide_file", |auth| async move {
            self.api.hide_file(&auth, bucket_id, file_name).await
        })
        .await
    }

    pub async fn start_large_file(
        &self,
        ctx: &CancellationToken,
        bucket_id: &str,
        options: &StartLargeFileOptions,
    ) -> Result<FileVersion> {
        self.execute(ctx, "start_large_file", |auth| async move {
            self.api.start_large_file(&auth, bucket_id, options).await
        })
        .await
    }

    /// Finish a large file. If this times out, check with `get_file_info`
    /// whether the parts were already combined.
    pub async fn finish_large_file(
        &self,
        ctx: &CancellationToken,
        file_id: &str,
        part_sha1s: &[String],
    ) -> Result<FileVersion> {
        self.execute(ctx, "finish_large_file", |auth| async move {
            self.api
                .finish_large_file(&auth, file_id, part_sha1s.to_vec())
                .await
        })
        .await
    }

    pub async fn cancel_large_file(
        &self,
        ctx: &CancellationToken,
        file_id: &str,
    ) -> Result<CancelledLargeFile> {
        self.execute(ctx, "cancel_large_file", |auth| async move {
            self.api.cancel_large_file(&auth, file_id).await
        })
        .await
    }

    pub async fn list_parts(
        &self,
        ctx: &CancellationToken,
        file_id: &str,
        options: &ListPartsOptions,
    ) -> Result<ListPartsResponse> {
        self.execute(ctx, "list_parts", |auth| async move {
            self.api.list_parts(&auth, file_id, options).await
        })
        .await
    }

    pub async fn list_unfinished_large_files(
        &self,
        ctx: &CancellationToken,
        bucket_id: &str,
        options: &ListUnfinishedLargeFilesOptions,
    ) -> Result<ListUnfinishedLargeFilesResponse> {
        self.execute(ctx, "list_unfinished_large_files", |auth| async move {
            self.api
                .list_unfinished_large_files(&auth, bucket_id, options)
                .await
        })
        .await
    }

    /// Download a file by id. Only starting the download is retried; reading
    /// the returned body is up to the caller.
    pub async fn download_file_by_id(
        &self,
        ctx: &CancellationToken,
        file_id: &str,
        options: &DownloadOptions,
    ) -> Result<Download> {
        self.execute(ctx, "download_file_by_id", |auth| async move {
            self.api.download_file_by_id(&auth, file_id, options).await
        })
        .await
    }

    pub async fn download_file_by_name(
        &self,
        ctx: &CancellationToken,
        bucket_name: &str,
        file_name: &str,
        options: &DownloadOptions,
    ) -> Result<Download> {
        self.execute(ctx, "download_file_by_name", |auth| async move {
            self.api
                .download_file_by_name(&auth, bucket_name, file_name, options)
                .await
        })
        .await
    }

    /// Upload a file: fetch an upload URL, then send the body, replacing the
    /// URL whenever the failure says it may no longer be usable.
    pub async fn upload_file(
        &self,
        ctx: &CancellationToken,
        bucket_id: &str,
        options: &UploadFileOptions,
        body: UploadBody,
    ) -> Result<FileVersion> {
        let stored = cancellable(ctx, body.into_stored(self.storage.as_ref())).await?;
        tracing::debug!(
            file_name = %options.file_name,
            size = %format_size(stored.length, DECIMAL),
            "Uploading file"
        );

        let stored = &stored;
        self.upload_via_endpoint(
            ctx,
            "upload_file",
            |auth| async move { self.api.get_upload_url(&auth, bucket_id).await },
            |endpoint| async move {
                let body = stored.source.open().await?;
                let request = UploadRequest {
                    options: options.clone(),
                    content_length: stored.length,
                    body,
                };
                self.api.upload_file(&endpoint, request).await
            },
        )
        .await
    }

    /// Upload one part of a large file through a part upload URL
    pub async fn upload_part(
        &self,
        ctx: &CancellationToken,
        file_id: &str,
        part_number: u32,
        content_sha1: &ContentSha1,
        body: UploadBody,
    ) -> Result<UploadedPart> {
        let stored = cancellable(ctx, body.into_stored(self.storage.as_ref())).await?;
        tracing::debug!(
            file_id,
            part_number,
            size = %format_size(stored.length, DECIMAL),
            "Uploading part"
        );

        let stored = &stored;
        self.upload_via_endpoint(
            ctx,
            "upload_part",
            |auth| async move { self.api.get_upload_part_url(&auth, file_id).await },
            |endpoint| async move {
                let body = stored.source.open().await?;
                let request = UploadPartRequest {
                    part_number,
                    content_sha1: content_sha1.clone(),
                    content_length: stored.length,
                    body,
                };
                self.api.upload_part(&endpoint, request).await
            },
        )
        .await
    }

    /// Drive a plain authorized call to completion
    async fn execute<T, F, Fut>(
        &self,
        ctx: &CancellationToken,
        operation: &'static str,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut(AuthToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = Attempts::new(self.config.max_attempts());
        let mut state = CallState::NeedAuth;

        loop {
            state = match state {
                CallState::NeedAuth => {
                    CallState::Authorized(self.ensure_auth(ctx, &mut attempts).await?)
                }
                CallState::Authorized(token) => {
                    let err = match cancellable(ctx, call(token.clone())).await {
                        Ok(value) => return Ok(value),
                        Err(err) => err,
                    };
                    let class = classify(&err, RequestPath::General);
                    if class.is_fatal() {
                        return Err(err);
                    }
                    if class.needs_reauth() {
                        self.drop_token(&token, operation);
                    }
                    self.wait_before_retry(ctx, &mut attempts, &class, err, operation)
                        .await?;
                    // Picks up whatever token is cached now, re-authorizing
                    // only if the slot is empty.
                    CallState::NeedAuth
                }
            };
        }
    }

    /// Drive the two-phase upload flow to completion
    async fn upload_via_endpoint<T, E, EFut, U, UFut>(
        &self,
        ctx: &CancellationToken,
        operation: &'static str,
        mut fetch_endpoint: E,
        mut upload: U,
    ) -> Result<T>
    where
        E: FnMut(AuthToken) -> EFut,
        EFut: Future<Output = Result<UploadEndpoint>>,
        U: FnMut(UploadEndpoint) -> UFut,
        UFut: Future<Output = Result<T>>,
    {
        let mut attempts = Attempts::new(self.config.max_attempts());
        let mut state = UploadState::NeedAuth;

        loop {
            state = match state {
                UploadState::NeedAuth => {
                    UploadState::NeedEndpoint(self.ensure_auth(ctx, &mut attempts).await?)
                }
                UploadState::NeedEndpoint(token) => {
                    match cancellable(ctx, fetch_endpoint(token.clone())).await {
                        Ok(endpoint) => UploadState::Uploading(endpoint),
                        Err(err) => {
                            let class = classify(&err, RequestPath::General);
                            if class.is_fatal() {
                                return Err(err);
                            }
                            if class.needs_reauth() {
                                self.drop_token(&token, operation);
                            }
                            self.wait_before_retry(ctx, &mut attempts, &class, err, operation)
                                .await?;
                            UploadState::NeedAuth
                        }
                    }
                }
                UploadState::Uploading(endpoint) => {
                    let err = match cancellable(ctx, upload(endpoint.clone())).await {
                        Ok(value) => return Ok(value),
                        Err(err) => err,
                    };
                    let class = classify(&err, RequestPath::Upload);
                    if class.is_fatal() {
                        return Err(err);
                    }
                    self.wait_before_retry(ctx, &mut attempts, &class, err, operation)
                        .await?;
                    if class.refresh_endpoint {
                        tracing::debug!(
                            operation,
                            upload_url = %endpoint.upload_url,
                            "Discarding upload endpoint"
                        );
                        UploadState::NeedAuth
                    } else {
                        UploadState::Uploading(endpoint)
                    }
                }
            };
        }
    }

    /// Return the cached token or authorize, retrying transient failures
    async fn ensure_auth(
        &self,
        ctx: &CancellationToken,
        attempts: &mut Attempts,
    ) -> Result<AuthToken> {
        loop {
            if let Some(token) = self.auth.get() {
                return Ok(token);
            }

            let gate = cancellable(ctx, async { Ok(self.auth.lock_refresh().await) }).await?;
            // Someone else may have re-authorized while we waited.
            if let Some(token) = self.auth.get() {
                return Ok(token);
            }
            if self.credentials.is_empty() {
                return Err(Error::MissingAuthorization);
            }

            let err = match cancellable(ctx, self.api.authorize_account(&self.credentials)).await {
                Ok(token) => {
                    tracing::debug!(
                        account_id = %token.account_id,
                        api_url = %token.api_url,
                        "Authorized account"
                    );
                    self.auth.set(token.clone());
                    return Ok(token);
                }
                Err(err) => err,
            };
            drop(gate);

            // No token to invalidate here, so a reauth verdict is just a retry.
            let class = classify(&err, RequestPath::General);
            if class.is_fatal() {
                return Err(err);
            }
            self.wait_before_retry(ctx, attempts, &class, err, "authorize_account")
                .await?;
        }
    }

    fn drop_token(&self, token: &AuthToken, operation: &'static str) {
        if self.auth.invalidate_token(token) {
            let age = jiff::Timestamp::now().duration_since(token.authorized_at);
            tracing::info!(
                operation,
                token_age_secs = age.as_secs(),
                "Account token expired, re-authorizing"
            );
        }
    }

    /// Spend one attempt, then sleep unless the budget is gone
    async fn wait_before_retry(
        &self,
        ctx: &CancellationToken,
        attempts: &mut Attempts,
        class: &Classification,
        err: Error,
        operation: &'static str,
    ) -> Result<()> {
        if attempts.record_failure() {
            tracing::warn!(
                operation,
                attempts = attempts.failed,
                error = %err,
                "Giving up after repeated failures"
            );
            return Err(Error::AttemptsExceeded {
                operation,
                attempts: attempts.failed,
                source: Box::new(err),
            });
        }

        let backoff = class
            .retry_after
            .unwrap_or_else(|| backoff::delay_for(&self.config, attempts.failed - 1));
        tracing::debug!(
            operation,
            attempt = attempts.failed,
            kind = ?class.kind,
            backoff_ms = backoff.as_millis(),
            error = %err,
            "Retrying after transient error"
        );

        sleep(ctx, backoff).await
    }
}

/// Run `fut` unless the caller cancels first
async fn cancellable<T>(
    ctx: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(Error::Cancelled),
        res = fut => res,
    }
}

async fn sleep(ctx: &CancellationToken, delay: Duration) -> Result<()> {
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
