//! reqwest implementation of the one-shot B2 API
//!
//! Every method is a single HTTP round trip. Failures are mapped into
//! `b2c_core::Error` here and nowhere else; retrying is left to
//! `RetryClient`.

use std::collections::BTreeMap;
use std::io;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use b2c_core::upload::CONTENT_TYPE_AUTO;
use b2c_core::{
    AuthToken, B2Api, CancelledLargeFile, ClientConfig, CopyFileOptions, Credentials,
    DeletedFile, Download, DownloadOptions, Error, FileVersion, ListBucketsOptions,
    ListBucketsResponse, ListFileNamesOptions, ListFileNamesResponse, ListFileVersionsOptions,
    ListFileVersionsResponse, ListPartsOptions, ListPartsResponse,
    ListUnfinishedLargeFilesOptions, ListUnfinishedLargeFilesResponse, PreparedBody, Result,
    StartLargeFileOptions, UploadEndpoint, UploadPartRequest, UploadRequest, UploadedPart,
    prepare_body,
};
use futures::TryStreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, RANGE};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio_util::io::{ReaderStream, StreamReader};
use url::Url;

use crate::error::{api_error, transport_error};

const API_VERSION_PATH: &str = "b2api/v2";
const INFO_HEADER_PREFIX: &str = "x-bz-info-";

/// B2 client speaking HTTP through reqwest
#[derive(Debug, Clone)]
pub struct HttpApi {
    http: reqwest::Client,
    api_url: Url,
    timeout: Duration,
}

impl HttpApi {
    /// Create a client from configuration
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let timeout = config.request_timeout();
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent())
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_url: config.api_url()?,
            timeout,
        })
    }

    /// Base URL used for account authorization
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    async fn call<B, T>(&self, auth: &AuthToken, name: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = endpoint_url(&auth.api_url, name)?;
        let req = self
            .http
            .post(url)
            .header(AUTHORIZATION, &auth.authorization_token)
            .timeout(self.timeout)
            .json(body);
        self.send_json(req).await
    }

    async fn send_json<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T> {
        let response = self.send(req).await?;
        let body = response.bytes().await.map_err(transport_error)?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Send a request, turning transport failures and non-2xx replies into
    /// errors. Error bodies are read and dropped here.
    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let req = req.build().map_err(transport_error)?;
        let method = req.method().clone();
        let url = req.url().clone();
        let start = Instant::now();
        tracing::debug!(%method, %url, "HTTP request");

        let response = match self.http.execute(req).await {
            Ok(response) => response,
            Err(e) => {
                let err = transport_error(e);
                tracing::debug!(
                    %method,
                    %url,
                    duration_ms = start.elapsed().as_millis(),
                    error = %err,
                    "HTTP request failed"
                );
                return Err(err);
            }
        };

        let status = response.status();
        if !status.is_success() {
            let err = api_error(response).await;
            tracing::debug!(
                %method,
                %url,
                status = status.as_u16(),
                duration_ms = start.elapsed().as_millis(),
                error = %err,
                "HTTP response"
            );
            return Err(err);
        }

        tracing::debug!(
            %method,
            %url,
            status = status.as_u16(),
            duration_ms = start.elapsed().as_millis(),
            "HTTP response"
        );
        Ok(response)
    }

    /// GET a file from the download URL and hand back its body unread
    async fn download(
        &self,
        auth: &AuthToken,
        mut url: Url,
        options: &DownloadOptions,
    ) -> Result<Download> {
        let overrides = options.query_pairs();
        if !overrides.is_empty() {
            url.query_pairs_mut().extend_pairs(overrides);
        }

        // No total timeout: the body may take long to arrive. Stalls are
        // still caught by the client's read timeout.
        let mut req = self
            .http
            .get(url)
            .header(AUTHORIZATION, &auth.authorization_token);
        if let Some(range) = &options.range {
            req = req.header(RANGE, range);
        }

        let response = self.send(req).await?;
        Ok(download_from(response))
    }

    fn upload_request(
        &self,
        endpoint: &UploadEndpoint,
        prepared: PreparedBody,
    ) -> reqwest::RequestBuilder {
        let PreparedBody {
            reader,
            content_length,
            sha1_header,
        } = prepared;

        self.http
            .post(&endpoint.upload_url)
            .header(AUTHORIZATION, &endpoint.authorization_token)
            .header(CONTENT_LENGTH, content_length)
            .header("X-Bz-Content-Sha1", sha1_header)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(reader)))
    }
}

fn download_from(response: reqwest::Response) -> Download {
    let content_length = response.content_length();
    let headers = response.headers().clone();
    let stream = response.bytes_stream().map_err(io::Error::other);

    let mut download = Download::new(Box::pin(StreamReader::new(stream)));
    download.content_length = content_length;
    download.content_type = header_value(&headers, CONTENT_TYPE.as_str());
    download.content_sha1 = header_value(&headers, "x-bz-content-sha1");
    download.content_range = header_value(&headers, "content-range");
    download.file_id = header_value(&headers, "x-bz-file-id");
    download.file_name = header_value(&headers, "x-bz-file-name").map(|v| decode_header(&v));
    download.file_info = headers
        .iter()
        .filter_map(|(name, value)| {
            let key = name.as_str().strip_prefix(INFO_HEADER_PREFIX)?;
            Some((key.to_string(), decode_header(value.to_str().ok()?)))
        })
        .collect();
    download
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Undo the percent-encoding B2 applies to file names and info values
fn decode_header(value: &str) -> String {
    urlencoding::decode(value)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

fn download_by_name_url(base: &str, bucket_name: &str, file_name: &str) -> Result<Url> {
    let raw = format!(
        "{}/file/{}/{}",
        base.trim_end_matches('/'),
        urlencoding::encode(bucket_name),
        encode_file_name(file_name)
    );
    Url::parse(&raw).map_err(|e| Error::General(format!("invalid download URL '{raw}': {e}")))
}

fn endpoint_url(base: &str, name: &str) -> Result<Url> {
    let raw = format!("{}/{API_VERSION_PATH}/{name}", base.trim_end_matches('/'));
    Url::parse(&raw).map_err(|e| Error::General(format!("invalid API URL '{raw}': {e}")))
}

/// Percent-encode a file name, keeping `/` separators readable
fn encode_file_name(name: &str) -> String {
    name.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// `X-Bz-Info-*` headers for a file upload
fn info_headers(options: &b2c_core::UploadFileOptions) -> Vec<(String, String)> {
    let mut headers = Vec::new();

    if let Some(ts) = options.src_last_modified {
        headers.push((
            "X-Bz-Info-src_last_modified_millis".to_string(),
            ts.as_millisecond().to_string(),
        ));
    }

    let b2_info = [
        ("b2-content-disposition", &options.content_disposition),
        ("b2-content-language", &options.content_language),
        ("b2-expires", &options.expires),
        ("b2-cache-control", &options.cache_control),
        ("b2-content-encoding", &options.content_encoding),
    ];
    for (key, value) in b2_info {
        if let Some(value) = value {
            headers.push((
                format!("X-Bz-Info-{key}"),
                urlencoding::encode(value).into_owned(),
            ));
        }
    }

    for (key, value) in &options.file_info {
        headers.push((
            format!("X-Bz-Info-{key}"),
            urlencoding::encode(value).into_owned(),
        ));
    }
    headers
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListBucketsBody<'a> {
    account_id: &'a str,
    #[serde(flatten)]
    options: &'a ListBucketsOptions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListFileNamesBody<'a> {
    bucket_id: &'a str,
    #[serde(flatten)]
    options: &'a ListFileNamesOptions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListFileVersionsBody<'a> {
    bucket_id: &'a str,
    #[serde(flatten)]
    options: &'a ListFileVersionsOptions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListPartsBody<'a> {
    file_id: &'a str,
    #[serde(flatten)]
    options: &'a ListPartsOptions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListUnfinishedBody<'a> {
    bucket_id: &'a str,
    #[serde(flatten)]
    options: &'a ListUnfinishedLargeFilesOptions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartLargeFileBody<'a> {
    bucket_id: &'a str,
    file_name: &'a str,
    content_type: &'a str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    file_info: &'a BTreeMap<String, String>,
}

#[async_trait]
impl B2Api for HttpApi {
    async fn authorize_account(&self, credentials: &Credentials) -> Result<AuthToken> {
        let url = endpoint_url(self.api_url.as_str(), "b2_authorize_account")?;
        let req = self
            .http
            .get(url)
            .basic_auth(&credentials.key_id, Some(&credentials.app_key))
            .timeout(self.timeout);
        self.send_json(req).await
    }

    async fn list_buckets(
        &self,
        auth: &AuthToken,
        options: &ListBucketsOptions,
    ) -> Result<ListBucketsResponse> {
        let body = ListBucketsBody {
            account_id: &auth.account_id,
            options,
        };
        self.call(auth, "b2_list_buckets", &body).await
    }

    async fn list_file_names(
        &self,
        auth: &AuthToken,
        bucket_id: &str,
        options: &ListFileNamesOptions,
    ) -> Result<ListFileNamesResponse> {
        let body = ListFileNamesBody { bucket_id, options };
        self.call(auth, "b2_list_file_names", &body).await
    }

    async fn list_file_versions(
        &self,
        auth: &AuthToken,
        bucket_id: &str,
        options: &ListFileVersionsOptions,
    ) -> Result<ListFileVersionsResponse> {
        let body = ListFileVersionsBody { bucket_id, options };
        self.call(auth, "b2_list_file_versions", &body).await
    }

    async fn get_file_info(&self, auth: &AuthToken, file_id: &str) -> Result<FileVersion> {
        self.call(auth, "b2_get_file_info", &json!({ "fileId": file_id }))
            .await
    }

    async fn copy_file(&self, auth: &AuthToken, options: &CopyFileOptions) -> Result<FileVersion> {
        self.call(auth, "b2_copy_file", options).await
    }

    async fn delete_file_version(
        &self,
        auth: &AuthToken,
        file_id: &str,
        file_name: &str,
    ) -> Result<DeletedFile> {
        let body = json!({ "fileId": file_id, "fileName": file_name });
        self.call(auth, "b2_delete_file_version", &body).await
    }

    async fn hide_file(
        &self,
        auth: &AuthToken,
        bucket_id: &str,
        file_name: &str,
    ) -> Result<FileVersion> {
        let body = json!({ "bucketId": bucket_id, "fileName": file_name });
        self.call(auth, "b2_hide_file", &body).await
    }

    async fn start_large_file(
        &self,
        auth: &AuthToken,
        bucket_id: &str,
        options: &StartLargeFileOptions,
    ) -> Result<FileVersion> {
        let body = StartLargeFileBody {
            bucket_id,
            file_name: &options.file_name,
            content_type: options.content_type.as_deref().unwrap_or(CONTENT_TYPE_AUTO),
            file_info: &options.file_info,
        };
        self.call(auth, "b2_start_large_file", &body).await
    }

    async fn finish_large_file(
        &self,
        auth: &AuthToken,
        file_id: &str,
        part_sha1s: Vec<String>,
    ) -> Result<FileVersion> {
        let body = json!({ "fileId": file_id, "partSha1Array": part_sha1s });
        self.call(auth, "b2_finish_large_file", &body).await
    }

    async fn cancel_large_file(
        &self,
        auth: &AuthToken,
        file_id: &str,
    ) -> Result<CancelledLargeFile> {
        self.call(auth, "b2_cancel_large_file", &json!({ "fileId": file_id }))
            .await
    }

    async fn list_parts(
        &self,
        auth: &AuthToken,
        file_id: &str,
        options: &ListPartsOptions,
    ) -> Result<ListPartsResponse> {
        let body = ListPartsBody { file_id, options };
        self.call(auth, "b2_list_parts", &body).await
    }

    async fn list_unfinished_large_files(
        &self,
        auth: &AuthToken,
        bucket_id: &str,
        options: &ListUnfinishedLargeFilesOptions,
    ) -> Result<ListUnfinishedLargeFilesResponse> {
        let body = ListUnfinishedBody { bucket_id, options };
        self.call(auth, "b2_list_unfinished_large_files", &body)
            .await
    }

    async fn get_upload_url(&self, auth: &AuthToken, bucket_id: &str) -> Result<UploadEndpoint> {
        self.call(auth, "b2_get_upload_url", &json!({ "bucketId": bucket_id }))
            .await
    }

    async fn get_upload_part_url(
        &self,
        auth: &AuthToken,
        file_id: &str,
    ) -> Result<UploadEndpoint> {
        self.call(auth, "b2_get_upload_part_url", &json!({ "fileId": file_id }))
            .await
    }

    async fn upload_file(
        &self,
        endpoint: &UploadEndpoint,
        request: UploadRequest,
    ) -> Result<FileVersion> {
        let UploadRequest {
            options,
            content_length,
            body,
        } = request;

        let prepared = prepare_body(body, content_length, &options.content_sha1);
        let content_type = options.content_type.as_deref().unwrap_or(CONTENT_TYPE_AUTO);
        let mut req = self
            .upload_request(endpoint, prepared)
            .header("X-Bz-File-Name", encode_file_name(&options.file_name))
            .header(CONTENT_TYPE, content_type);
        for (name, value) in info_headers(&options) {
            req = req.header(name, value);
        }

        self.send_json(req).await
    }

    async fn upload_part(
        &self,
        endpoint: &UploadEndpoint,
        request: UploadPartRequest,
    ) -> Result<UploadedPart> {
        let prepared = prepare_body(request.body, request.content_length, &request.content_sha1);
        let req = self
            .upload_request(endpoint, prepared)
            .header("X-Bz-Part-Number", request.part_number);
        self.send_json(req).await
    }

    async fn download_file_by_id(
        &self,
        auth: &AuthToken,
        file_id: &str,
        options: &DownloadOptions,
    ) -> Result<Download> {
        let mut url = endpoint_url(&auth.download_url, "b2_download_file_by_id")?;
        url.query_pairs_mut().append_pair("fileId", file_id);
        self.download(auth, url, options).await
    }

    async fn download_file_by_name(
        &self,
        auth: &AuthToken,
        bucket_name: &str,
        file_name: &str,
        options: &DownloadOptions,
    ) -> Result<Download> {
        let url = download_by_name_url(&auth.download_url, bucket_name, file_name)?;
        self.download(auth, url, options).await
    }
}
