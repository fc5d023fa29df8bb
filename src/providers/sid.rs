//! SID OAuth endpoints (token exchange, revocation).

use super::endpoint;
use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// JSON body posted to /oauth/token
#[derive(Serialize, Debug)]
pub struct SidTokenRequest<'a> {
    pub grant_type: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub redirect_uri: &'a str,
    pub code: &'a str,
}

/// Token response from /oauth/token
#[derive(Deserialize, Debug)]
pub struct SidTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Serialize)]
struct RevokeRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    token: &'a str,
}

/// HTTP client for the SID authorization server.
pub struct SidClient {
    http_client: Client,
    auth_base_url: String,
}

impl SidClient {
    pub fn new(http_client: Client, auth_base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            auth_base_url: auth_base_url.into(),
        }
    }

    /// Exchange an authorization code for access and refresh tokens.
    pub async fn exchange_code(&self, request: &SidTokenRequest<'_>) -> Result<SidTokenResponse> {
        let url = endpoint(&self.auth_base_url, "oauth/token");
        debug!("Exchanging SID authorization code at {}", url);

        let response = self
            .http_client
            .post(&url)
            .header("Accept", "application/json")
            .json(request)
            .send()
            .await
            .context("Failed to send SID token exchange request")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "SID token exchange failed with status {}",
                response.status()
            ));
        }

        let token_response: SidTokenResponse = response
            .json()
            .await
            .context("Failed to parse SID token response")?;

        debug!(
            has_refresh_token = token_response.refresh_token.is_some(),
            expires_in = ?token_response.expires_in,
            "SID token exchange successful"
        );

        Ok(token_response)
    }

    /// Revoke a token at the provider.
    pub async fn revoke(&self, client_id: &str, client_secret: &str, token: &str) -> Result<()> {
        let url = endpoint(&self.auth_base_url, "oauth/revoke");

        let response = self
            .http_client
            .post(&url)
            .header("Accept", "application/json")
            .json(&RevokeRequest {
                client_id,
                client_secret,
                token,
            })
            .send()
            .await
            .context("Failed to send SID revoke request")?;

        if !response.status().is_success() {
            return Err(anyhow!("SID revoke failed with status {}", response.status()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn token_request<'a>(code: &'a str) -> SidTokenRequest<'a> {
        SidTokenRequest {
            grant_type: "authorization_code",
            client_id: "sid-id",
            client_secret: "sid-secret",
            redirect_uri: "https://api/callback",
            code,
        }
    }

    #[tokio::test]
    async fn test_exchange_code() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth/token")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(json!({
                "grant_type": "authorization_code",
                "client_id": "sid-id",
                "code": "abc"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "access_token": "sid-access",
                    "refresh_token": "sid-refresh",
                    "expires_in": 86400,
                    "token_type": "Bearer"
                }"#,
            )
            .create_async()
            .await;

        let client = SidClient::new(Client::new(), server.url());
        let response = client.exchange_code(&token_request("abc")).await.unwrap();

        assert_eq!(response.access_token, "sid-access");
        assert_eq!(response.refresh_token.as_deref(), Some("sid-refresh"));
        assert_eq!(response.expires_in, Some(86400));
        assert!(response.scope.is_none());
    }

    #[tokio::test]
    async fn test_exchange_code_rejected() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth/token")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": "invalid_grant", "error_description": "secret detail"}"#)
            .create_async()
            .await;

        let client = SidClient::new(Client::new(), server.url());
        let err = client.exchange_code(&token_request("used")).await.unwrap_err();

        assert!(err.to_string().contains("400"));
        // Provider error bodies are not carried upward
        assert!(!err.to_string().contains("secret detail"));
    }

    #[tokio::test]
    async fn test_revoke() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth/revoke")
            .match_body(Matcher::Json(json!({
                "client_id": "sid-id",
                "client_secret": "sid-secret",
                "token": "sid-refresh"
            })))
            .with_status(200)
            .create_async()
            .await;

        let client = SidClient::new(Client::new(), server.url());
        client.revoke("sid-id", "sid-secret", "sid-refresh").await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_revoke_failure() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth/revoke")
            .with_status(500)
            .create_async()
            .await;

        let client = SidClient::new(Client::new(), server.url());
        assert!(client.revoke("id", "secret", "token").await.is_err());
    }
}
