//! Classify failures into retry verdicts.
//!
//! Classification is a pure function of the error and the request path, so
//! classifying the same error twice always yields the same answer.

use std::time::Duration;

use crate::error::Error;

/// Which kind of request produced the error
///
/// Upload requests treat a few extra failure classes as transient because
/// upload endpoints are single-use-oriented and can be replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPath {
    General,
    Upload,
}

/// What went wrong, as far as retrying is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transport timeout or 408 Request Timeout.
    NetworkTimeout,
    /// 403, which B2 also uses for transient cap and quota conditions.
    Forbidden,
    /// 401 with `expired_auth_token`.
    ExpiredAuth,
    /// 429 Too Many Requests.
    RateLimited,
    /// 5xx on an upload.
    ServerError,
    /// Connection dropped while streaming an upload body.
    UnexpectedEof,
    /// Caller cancellation.
    Cancelled,
    /// Anything not worth retrying.
    Fatal,
}

/// Decision taken for a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Retry after the computed backoff.
    Retryable,
    /// Drop the cached token, then retry.
    RetryableAfterReauth,
    /// Retry after the delay the server asked for.
    RetryableAfterDelayHint(Duration),
    /// Give up and hand the error back unchanged.
    Fatal,
}

/// Outcome of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: FailureKind,
    pub verdict: Verdict,
    /// Server-provided delay, overriding the backoff policy
    pub retry_after: Option<Duration>,
    /// The upload endpoint must be discarded and fetched again
    pub refresh_endpoint: bool,
}

impl Classification {
    fn fatal(kind: FailureKind) -> Self {
        Self {
            kind,
            verdict: Verdict::Fatal,
            retry_after: None,
            refresh_endpoint: false,
        }
    }

    fn retry(kind: FailureKind) -> Self {
        Self {
            kind,
            verdict: Verdict::Retryable,
            retry_after: None,
            refresh_endpoint: false,
        }
    }

    fn reauth() -> Self {
        Self {
            kind: FailureKind::ExpiredAuth,
            verdict: Verdict::RetryableAfterReauth,
            retry_after: None,
            refresh_endpoint: false,
        }
    }

    fn refreshing(mut self) -> Self {
        self.refresh_endpoint = true;
        self
    }

    fn with_hint(mut self, hint: Option<Duration>) -> Self {
        self.retry_after = hint;
        if let (Some(d), Verdict::Retryable) = (hint, self.verdict) {
            self.verdict = Verdict::RetryableAfterDelayHint(d);
        }
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.verdict == Verdict::Fatal
    }

    pub fn needs_reauth(&self) -> bool {
        self.verdict == Verdict::RetryableAfterReauth
    }
}

/// Classify an error for retry decisions.
pub fn classify(err: &Error, path: RequestPath) -> Classification {
    let upload = path == RequestPath::Upload;
    match err {
        Error::Cancelled => Classification::fatal(FailureKind::Cancelled),
        Error::Timeout(_) => Classification::retry(FailureKind::NetworkTimeout),
        Error::Api(resp) => {
            let base = if resp.is_request_timeout() {
                Classification::retry(FailureKind::NetworkTimeout)
            } else if resp.is_too_many_requests() {
                Classification::retry(FailureKind::RateLimited)
            } else if resp.is_forbidden() {
                Classification::retry(FailureKind::Forbidden)
            } else if resp.is_expired_auth() {
                let c = Classification::reauth();
                if upload { c.refreshing() } else { c }
            } else if upload && resp.is_server_error() {
                Classification::retry(FailureKind::ServerError).refreshing()
            } else {
                Classification::fatal(FailureKind::Fatal)
            };
            base.with_hint(resp.retry_after)
        }
        Error::UnexpectedEof(_) if upload => {
            Classification::retry(FailureKind::UnexpectedEof).refreshing()
        }
        Error::Io(e) => match e.kind() {
            std::io::ErrorKind::TimedOut => Classification::retry(FailureKind::NetworkTimeout),
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
                if upload =>
            {
                Classification::retry(FailureKind::UnexpectedEof).refreshing()
            }
            _ => Classification::fatal(FailureKind::Fatal),
        },
        _ => Classification::fatal(FailureKind::Fatal),
    }
}
