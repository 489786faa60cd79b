mod common;

use std::time::{Duration, Instant};

use b2c_core::{
    AuthToken, B2Api, BoxReader, CancellationToken, ClientConfig, ContentSha1, CopyFileOptions,
    Credentials, DownloadBody, DownloadOptions, Error, ListBucketsOptions, ListPartsOptions,
    MetadataDirective, RetryBuilder, UploadBody, UploadEndpoint, UploadFileOptions,
    UploadPartRequest, UploadRequest,
};
use b2c_http::{HttpApi, connect};
use common::{Reply, TestServer};
use serde_json::json;
use tokio::io::AsyncReadExt;

const HELLO_SHA1: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";

fn config(server: &TestServer) -> ClientConfig {
    ClientConfig {
        api_url: Some(server.url.clone()),
        user_agent: Some("b2c-tests".to_string()),
        request_timeout_secs: 5,
        retry: RetryBuilder::new()
            .jitter(Duration::from_millis(1))
            .min(Duration::from_millis(1))
            .max(Duration::from_millis(5))
            .unit(Duration::from_millis(1))
            .build(),
    }
}

fn token(server: &TestServer, value: &str) -> AuthToken {
    serde_json::from_value(server.auth_body(value)).unwrap()
}

fn file_version(name: &str) -> serde_json::Value {
    json!({
        "accountId": "acct-1",
        "action": "upload",
        "bucketId": "bkt",
        "fileId": "4_zfile",
        "fileName": name,
        "contentLength": 11,
        "contentSha1": HELLO_SHA1,
        "contentType": "text/plain",
        "fileInfo": {},
        "uploadTimestamp": 1528406656000_i64
    })
}

fn endpoint(server: &TestServer) -> UploadEndpoint {
    serde_json::from_value(server.upload_url_body("up-tok")).unwrap()
}

async fn read_all(mut body: DownloadBody) -> Vec<u8> {
    let mut out = Vec::new();
    body.read_to_end(&mut out).await.unwrap();
    out
}

#[tokio::test]
async fn test_authorize_account() {
    common::init_tracing();
    let server = TestServer::start();
    server.push(Reply::json(200, server.auth_body("tok-1")));

    let api = HttpApi::new(&config(&server)).unwrap();
    let auth = api
        .authorize_account(&Credentials::new("key-id", "app-key"))
        .await
        .unwrap();

    assert_eq!(auth.authorization_token, "tok-1");
    assert_eq!(auth.api_url, server.url);
    assert!(auth.has_capability("writeFiles"));

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].path, "/b2api/v2/b2_authorize_account");
    assert!(requests[0].header("authorization").unwrap().starts_with("Basic "));
    assert_eq!(requests[0].header("user-agent"), Some("b2c-tests"));
}

#[tokio::test]
async fn test_json_call_sends_token_and_body() {
    let server = TestServer::start();
    server.push(Reply::json(200, json!({ "buckets": [] })));

    let api = HttpApi::new(&config(&server)).unwrap();
    let options = ListBucketsOptions {
        bucket_name: Some("photos".to_string()),
        ..Default::default()
    };
    let res = api
        .list_buckets(&token(&server, "tok-1"), &options)
        .await
        .unwrap();
    assert!(res.buckets.is_empty());

    let req = &server.requests()[0];
    assert_eq!(req.method, "POST");
    assert_eq!(req.path, "/b2api/v2/b2_list_buckets");
    assert_eq!(req.header("authorization"), Some("tok-1"));
    assert_eq!(
        req.json(),
        json!({ "accountId": "acct-1", "bucketName": "photos" })
    );
}

#[tokio::test]
async fn test_error_with_retry_after() {
    let server = TestServer::start();
    server.push(Reply::error(429, "too_many_requests").header("Retry-After", "7"));

    let api = HttpApi::new(&config(&server)).unwrap();
    let err = api
        .get_file_info(&token(&server, "tok-1"), "4_zfile")
        .await
        .unwrap_err();

    match err {
        Error::Api(resp) => {
            assert_eq!(resp.status, 429);
            assert_eq!(resp.code, "too_many_requests");
            assert_eq!(resp.retry_after, Some(Duration::from_secs(7)));
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_expired_token_code() {
    let server = TestServer::start();
    server.push(Reply::error(401, "expired_auth_token"));

    let api = HttpApi::new(&config(&server)).unwrap();
    let err = api
        .hide_file(&token(&server, "tok-1"), "bkt", "a.txt")
        .await
        .unwrap_err();
    assert!(err.api_response().unwrap().is_expired_auth());
}

#[tokio::test]
async fn test_error_without_json_body() {
    let server = TestServer::start();
    server.push(Reply::text(503, "upstream unavailable"));

    let api = HttpApi::new(&config(&server)).unwrap();
    let err = api
        .cancel_large_file(&token(&server, "tok-1"), "big")
        .await
        .unwrap_err();

    let resp = err.api_response().unwrap();
    assert_eq!(resp.status, 503);
    assert_eq!(resp.message, "upstream unavailable");
    assert!(resp.is_server_error());
}

#[tokio::test]
async fn test_timeout_maps_to_timeout() {
    let server = TestServer::start();
    server.push(Reply::json(200, json!({ "buckets": [] })).delayed(Duration::from_secs(3)));

    let mut cfg = config(&server);
    cfg.request_timeout_secs = 1;
    let api = HttpApi::new(&cfg).unwrap();
    let err = api
        .list_buckets(&token(&server, "tok-1"), &ListBucketsOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "got {err:?}");
}

#[tokio::test]
async fn test_upload_times_out_waiting_for_reply() {
    let server = TestServer::start();
    server.push(Reply::json(200, file_version("a.txt")).delayed(Duration::from_secs(4)));

    let mut cfg = config(&server);
    cfg.request_timeout_secs = 1;
    let api = HttpApi::new(&cfg).unwrap();
    let body: BoxReader = Box::pin(&b"hello world"[..]);
    let request = UploadRequest {
        options: UploadFileOptions::new("a.txt"),
        content_length: 11,
        body,
    };

    let start = Instant::now();
    let err = api
        .upload_file(&endpoint(&server), request)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "got {err:?}");
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_upload_appends_sha1() {
    let server = TestServer::start();
    server.push(Reply::json(200, file_version("dir/hello world.txt")));

    let api = HttpApi::new(&config(&server)).unwrap();
    let body: BoxReader = Box::pin(&b"hello world"[..]);
    let request = UploadRequest {
        options: UploadFileOptions::new("dir/hello world.txt"),
        content_length: 11,
        body,
    };
    let file = api.upload_file(&endpoint(&server), request).await.unwrap();
    assert_eq!(file.file_name, "dir/hello world.txt");

    let req = &server.requests()[0];
    assert_eq!(req.path, "/b2api/v2/b2_upload_file/bkt");
    assert_eq!(req.header("authorization"), Some("up-tok"));
    assert_eq!(req.header("content-length"), Some("51"));
    assert_eq!(req.header("x-bz-content-sha1"), Some("hex_digits_at_end"));
    assert_eq!(req.header("x-bz-file-name"), Some("dir/hello%20world.txt"));
    assert_eq!(req.header("content-type"), Some("b2/x-auto"));
    assert_eq!(req.body, format!("hello world{HELLO_SHA1}").as_bytes());
}

#[tokio::test]
async fn test_upload_part_with_known_sha1() {
    let server = TestServer::start();
    server.push(Reply::json(
        200,
        json!({
            "fileId": "big",
            "partNumber": 3,
            "contentLength": 11,
            "contentSha1": HELLO_SHA1,
            "uploadTimestamp": 1
        }),
    ));

    let api = HttpApi::new(&config(&server)).unwrap();
    let body: BoxReader = Box::pin(&b"hello world"[..]);
    let request = UploadPartRequest {
        part_number: 3,
        content_sha1: ContentSha1::Provided(HELLO_SHA1.to_string()),
        content_length: 11,
        body,
    };
    let part = api.upload_part(&endpoint(&server), request).await.unwrap();
    assert_eq!(part.part_number, 3);

    let req = &server.requests()[0];
    assert_eq!(req.header("x-bz-part-number"), Some("3"));
    assert_eq!(req.header("x-bz-content-sha1"), Some(HELLO_SHA1));
    assert_eq!(req.header("content-length"), Some("11"));
    assert_eq!(req.body, b"hello world");
}

#[tokio::test]
async fn test_retry_client_reauthorizes() {
    common::init_tracing();
    let server = TestServer::start();
    server.push(Reply::json(200, server.auth_body("tok-1")));
    server.push(Reply::error(401, "expired_auth_token"));
    server.push(Reply::json(200, server.auth_body("tok-2")));
    server.push(Reply::json(200, json!({ "buckets": [] })));

    let client = connect(&config(&server), Credentials::new("key-id", "app-key")).unwrap();
    let ctx = CancellationToken::new();
    client
        .list_buckets(&ctx, &ListBucketsOptions::default())
        .await
        .unwrap();

    let tokens: Vec<_> = server
        .requests_to("b2_list_buckets")
        .iter()
        .map(|r| r.header("authorization").unwrap_or_default().to_string())
        .collect();
    assert_eq!(tokens, vec!["tok-1", "tok-2"]);
    assert_eq!(server.requests_to("b2_authorize_account").len(), 2);
}

#[tokio::test]
async fn test_retry_client_honors_retry_after() {
    let server = TestServer::start();
    server.push(Reply::json(200, server.auth_body("tok-1")));
    server.push(Reply::error(429, "too_many_requests").header("Retry-After", "0"));
    server.push(Reply::json(200, json!({ "buckets": [] })));

    let mut cfg = config(&server);
    cfg.retry = RetryBuilder::new()
        .min(Duration::from_secs(30))
        .unit(Duration::from_secs(30))
        .build();
    let client = connect(&cfg, Credentials::new("key-id", "app-key")).unwrap();

    let start = Instant::now();
    client
        .list_buckets(&CancellationToken::new(), &ListBucketsOptions::default())
        .await
        .unwrap();
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(server.requests_to("b2_list_buckets").len(), 2);
}

#[tokio::test]
async fn test_retry_client_upload_refreshes_endpoint() {
    common::init_tracing();
    let server = TestServer::start();
    server.push(Reply::json(200, server.auth_body("tok-1")));
    server.push(Reply::json(200, server.upload_url_body("up-1")));
    server.push(Reply::error(503, "service_unavailable"));
    server.push(Reply::json(200, server.upload_url_body("up-2")));
    server.push(Reply::json(200, file_version("a.txt")));

    let client = connect(&config(&server), Credentials::new("key-id", "app-key")).unwrap();
    let ctx = CancellationToken::new();
    let file = client
        .upload_file(
            &ctx,
            "bkt",
            &UploadFileOptions::new("a.txt").content_type("text/plain"),
            UploadBody::bytes(&b"payload"[..]),
        )
        .await
        .unwrap();
    assert_eq!(file.file_name, "a.txt");

    assert_eq!(server.requests_to("b2_get_upload_url").len(), 2);
    let uploads = server.requests_to("b2_upload_file/bkt");
    assert_eq!(uploads.len(), 2);
    assert_eq!(uploads[0].header("authorization"), Some("up-1"));
    assert_eq!(uploads[1].header("authorization"), Some("up-2"));

    // Same payload and trailing digest on both attempts.
    assert_eq!(uploads[0].body, uploads[1].body);
    assert_eq!(uploads[0].body.len(), 47);
    assert!(uploads[0].body.starts_with(b"payload"));
    assert_eq!(uploads[1].header("content-type"), Some("text/plain"));
}

#[tokio::test]
async fn test_retry_client_without_credentials() {
    let server = TestServer::start();
    let client = connect(&config(&server), Credentials::default()).unwrap();

    let err = client
        .get_file_info(&CancellationToken::new(), "4_zfile")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingAuthorization));
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn test_download_by_name_maps_headers() {
    let server = TestServer::start();
    server.push(
        Reply::text(206, "hello")
            .header("X-Bz-File-Id", "4_zfile")
            .header("X-Bz-File-Name", "dir/hello%20world.txt")
            .header("X-Bz-Content-Sha1", HELLO_SHA1)
            .header("Content-Range", "bytes 0-4/11")
            .header("X-Bz-Info-author", "Jane%20Doe"),
    );

    let api = HttpApi::new(&config(&server)).unwrap();
    let options = DownloadOptions::default()
        .range("bytes=0-4")
        .content_type("text/csv");
    let download = api
        .download_file_by_name(
            &token(&server, "tok-1"),
            "photos",
            "dir/hello world.txt",
            &options,
        )
        .await
        .unwrap();

    assert_eq!(download.file_id.as_deref(), Some("4_zfile"));
    assert_eq!(download.file_name.as_deref(), Some("dir/hello world.txt"));
    assert_eq!(download.content_sha1.as_deref(), Some(HELLO_SHA1));
    assert_eq!(download.content_range.as_deref(), Some("bytes 0-4/11"));
    assert_eq!(download.content_length, Some(5));
    assert_eq!(download.file_info.get("author").map(String::as_str), Some("Jane Doe"));
    assert_eq!(read_all(download.body).await, b"hello");

    let req = &server.requests()[0];
    assert_eq!(req.method, "GET");
    assert_eq!(req.path, "/file/photos/dir/hello%20world.txt?b2ContentType=text%2Fcsv");
    assert_eq!(req.header("authorization"), Some("tok-1"));
    assert_eq!(req.header("range"), Some("bytes=0-4"));
}

#[tokio::test]
async fn test_download_by_id_query() {
    let server = TestServer::start();
    server.push(Reply::text(200, "hello world"));

    let api = HttpApi::new(&config(&server)).unwrap();
    let download = api
        .download_file_by_id(&token(&server, "tok-1"), "4_zfile", &DownloadOptions::default())
        .await
        .unwrap();
    assert_eq!(download.content_type.as_deref(), Some("text/plain"));
    assert_eq!(read_all(download.body).await, b"hello world");

    let req = &server.requests()[0];
    assert_eq!(req.path, "/b2api/v2/b2_download_file_by_id?fileId=4_zfile");
    assert!(req.header("range").is_none());
}

#[tokio::test]
async fn test_download_not_found() {
    let server = TestServer::start();
    server.push(Reply::error(404, "not_found"));

    let api = HttpApi::new(&config(&server)).unwrap();
    let err = api
        .download_file_by_id(&token(&server, "tok-1"), "gone", &DownloadOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.api_response().unwrap().code, "not_found");
}

#[tokio::test]
async fn test_retry_client_download_uses_last_response() {
    common::init_tracing();
    let server = TestServer::start();
    server.push(Reply::json(200, server.auth_body("tok-1")));
    server.push(Reply::text(429, "slow down").header("Retry-After", "0"));
    server.push(Reply::text(200, "fresh bytes").header("X-Bz-File-Id", "4_zfile"));

    let client = connect(&config(&server), Credentials::new("key-id", "app-key")).unwrap();
    let download = client
        .download_file_by_id(&CancellationToken::new(), "4_zfile", &DownloadOptions::default())
        .await
        .unwrap();

    assert_eq!(download.file_id.as_deref(), Some("4_zfile"));
    assert_eq!(read_all(download.body).await, b"fresh bytes");
    let downloads = server
        .requests()
        .into_iter()
        .filter(|r| r.path.contains("b2_download_file_by_id"))
        .count();
    assert_eq!(downloads, 2);
}

#[tokio::test]
async fn test_list_parts_and_copy_bodies() {
    let server = TestServer::start();
    server.push(Reply::json(200, json!({ "parts": [], "nextPartNumber": null })));
    server.push(Reply::json(200, file_version("copy.txt")));

    let api = HttpApi::new(&config(&server)).unwrap();
    let auth = token(&server, "tok-1");
    let options = ListPartsOptions {
        start_part_number: Some(2),
        max_part_count: Some(10),
    };
    let parts = api.list_parts(&auth, "big", &options).await.unwrap();
    assert!(parts.parts.is_empty());

    let copy = CopyFileOptions {
        source_file_id: "4_zfile".to_string(),
        file_name: "copy.txt".to_string(),
        metadata_directive: Some(MetadataDirective::Copy),
        ..Default::default()
    };
    let file = api.copy_file(&auth, &copy).await.unwrap();
    assert_eq!(file.file_name, "copy.txt");

    let requests = server.requests();
    assert_eq!(requests[0].path, "/b2api/v2/b2_list_parts");
    assert_eq!(
        requests[0].json(),
        json!({ "fileId": "big", "startPartNumber": 2, "maxPartCount": 10 })
    );
    assert_eq!(requests[1].path, "/b2api/v2/b2_copy_file");
    assert_eq!(
        requests[1].json(),
        json!({
            "sourceFileId": "4_zfile",
            "fileName": "copy.txt",
            "metadataDirective": "COPY"
        })
    );
}
