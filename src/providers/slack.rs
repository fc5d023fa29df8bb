//! Slack Web API client (OAuth v2 token exchange, channel listing).

use super::endpoint;
use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Page size requested from conversations.list
const CHANNEL_PAGE_SIZE: &str = "200";

/// Upper bound on conversations.list pages followed
const MAX_CHANNEL_PAGES: usize = 50;

/// Token response from oauth.v2.access
#[derive(Deserialize, Debug)]
pub struct SlackOAuthResponse {
    pub access_token: String,
    pub token_type: String,
    pub scope: String,
    #[serde(default)]
    pub team: Option<SlackTeam>,
}

/// Workspace the bot was installed into
#[derive(Deserialize, Debug, Default)]
pub struct SlackTeam {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Channel summary returned to API callers
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SlackChannel {
    pub name: String,
    pub id: String,
}

#[derive(Deserialize)]
struct ConversationsPage {
    #[serde(default)]
    channels: Vec<SlackChannel>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

/// HTTP client for the Slack Web API.
pub struct SlackClient {
    http_client: Client,
    api_base_url: String,
}

impl SlackClient {
    /// Create a client against a Web API base URL (e.g. https://slack.com/api).
    pub fn new(http_client: Client, api_base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            api_base_url: api_base_url.into(),
        }
    }

    /// Exchange an authorization code for a bot token.
    pub async fn oauth_v2_access(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<SlackOAuthResponse> {
        let mut form_data = HashMap::new();
        form_data.insert("client_id", client_id);
        form_data.insert("client_secret", client_secret);
        form_data.insert("code", code);
        form_data.insert("redirect_uri", redirect_uri);

        let url = endpoint(&self.api_base_url, "oauth.v2.access");
        debug!("Exchanging Slack authorization code at {}", url);

        let response = self
            .http_client
            .post(&url)
            .header("Accept", "application/json")
            .form(&form_data)
            .send()
            .await
            .context("Failed to send Slack token exchange request")?;

        parse_envelope(response, "oauth.v2.access").await
    }

    /// List public channels visible to a bot token, following pagination.
    pub async fn conversations_list(&self, access_token: &str) -> Result<Vec<SlackChannel>> {
        let url = endpoint(&self.api_base_url, "conversations.list");
        let mut channels = Vec::new();
        let mut cursor = String::new();

        for _ in 0..MAX_CHANNEL_PAGES {
            let mut request = self
                .http_client
                .get(&url)
                .bearer_auth(access_token)
                .query(&[("types", "public_channel"), ("limit", CHANNEL_PAGE_SIZE)]);
            if !cursor.is_empty() {
                request = request.query(&[("cursor", cursor.as_str())]);
            }

            let response = request
                .send()
                .await
                .context("Failed to send Slack conversations.list request")?;

            let page: ConversationsPage = parse_envelope(response, "conversations.list").await?;
            channels.extend(page.channels);

            cursor = page
                .response_metadata
                .map(|m| m.next_cursor)
                .unwrap_or_default();
            if cursor.is_empty() {
                return Ok(channels);
            }
        }

        debug!(
            count = channels.len(),
            "Stopped following conversations.list cursor at page limit"
        );
        Ok(channels)
    }
}

/// Decode Slack's `{"ok": bool, "error": ...}` envelope.
///
/// Slack reports most failures with HTTP 200 and `ok: false`.
async fn parse_envelope<T: DeserializeOwned>(response: reqwest::Response, method: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(anyhow!("Slack {} failed with status {}", method, status));
    }

    let body: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse Slack {} response", method))?;

    if !body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
        let error = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        return Err(anyhow!("Slack {} returned error: {}", method, error));
    }

    serde_json::from_value(body).with_context(|| format!("Unexpected Slack {} payload", method))
}
