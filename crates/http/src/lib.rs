//! b2c-http: reqwest adapter for b2c
//!
//! This crate implements the one-shot `B2Api` trait from b2c-core over HTTP.
//! Wrap it in [`RetryClient`] (or use [`connect`]) to get authorization
//! caching and retries.

mod client;
mod error;

pub use b2c_core::{ClientConfig, Credentials, RetryClient};
pub use client::HttpApi;

/// Build a retrying client talking to B2 over HTTP
pub fn connect(
    config: &ClientConfig,
    credentials: Credentials,
) -> b2c_core::Result<RetryClient<HttpApi>> {
    let api = HttpApi::new(config)?;
    Ok(RetryClient::new(api, credentials, config.retry.clone()))
}
