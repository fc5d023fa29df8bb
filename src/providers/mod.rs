//! Outbound HTTP clients for provider APIs.
//!
//! Every call goes through one shared `reqwest::Client` built with an
//! explicit timeout. Base URLs are configurable so tests can point the
//! clients at a mock server.

pub mod sid;
pub mod slack;

pub use sid::{SidClient, SidTokenRequest, SidTokenResponse};
pub use slack::{SlackChannel, SlackClient, SlackOAuthResponse};

use anyhow::{Context, Result};
use std::time::Duration;

/// Build the HTTP client shared by all provider calls.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("oauth-installers/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Join a base URL and an endpoint path without doubling slashes.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
