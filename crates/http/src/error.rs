//! Mapping of transport and HTTP failures into the core error type

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use b2c_core::{Error, ErrorResponse};
use reqwest::header::{HeaderMap, RETRY_AFTER};

/// Map a reqwest failure that produced no HTTP response
pub(crate) fn transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        return Error::Timeout(err.to_string());
    }
    match io_kind_in_chain(&err) {
        Some(io::ErrorKind::UnexpectedEof)
        | Some(io::ErrorKind::BrokenPipe)
        | Some(io::ErrorKind::ConnectionReset) => Error::UnexpectedEof(err.to_string()),
        Some(io::ErrorKind::TimedOut) => Error::Timeout(err.to_string()),
        _ => Error::Network(err.to_string()),
    }
}

/// First `io::ErrorKind` found while walking the source chain
fn io_kind_in_chain(err: &(dyn StdError + 'static)) -> Option<io::ErrorKind> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        current = e.source();
    }
    None
}

/// Turn a non-2xx response into an API error
///
/// B2 answers with a JSON `{status, code, message}` body. Anything else (a
/// proxy page, an empty body) keeps the status and uses the text as message.
pub(crate) async fn api_error(response: reqwest::Response) -> Error {
    let status = response.status().as_u16();
    let retry_after = parse_retry_after(response.headers());
    let text = response.text().await.unwrap_or_default();

    let mut resp = serde_json::from_str::<ErrorResponse>(&text)
        .unwrap_or_else(|_| ErrorResponse::new(status, "", text.trim()));
    resp.status = status;
    resp.retry_after = retry_after;
    Error::Api(resp)
}

/// `Retry-After` in whole seconds; HTTP dates are ignored
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use std::fmt;

    #[derive(Debug)]
    struct Wrapped(io::Error);

    impl fmt::Display for Wrapped {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "body write failed")
        }
    }

    impl StdError for Wrapped {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(7)));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_io_kind_found_in_chain() {
        let err = Wrapped(io::Error::from(io::ErrorKind::BrokenPipe));
        assert_eq!(io_kind_in_chain(&err), Some(io::ErrorKind::BrokenPipe));

        let plain = io::Error::from(io::ErrorKind::ConnectionReset);
        assert_eq!(
            io_kind_in_chain(&plain),
            Some(io::ErrorKind::ConnectionReset)
        );
    }

    #[test]
    fn test_no_io_kind() {
        let err = ErrorResponse::new(500, "internal_error", "boom");
        assert_eq!(io_kind_in_chain(&err), None);
    }
}
