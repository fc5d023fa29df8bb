mod env;

pub use env::apply_env_overrides;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::auth::User;

/// Complete service configuration.
///
/// Loaded once at startup and shared read-only afterwards.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub sid: SidConfig,
    /// Bearer tokens accepted by the API, mapped to users
    #[serde(default)]
    pub sessions: Vec<SessionConfig>,
}

/// HTTP server and storage settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Default post-install redirect when the client passes none
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Base64-encoded 32-byte key; usually supplied via OAUTH_ENCRYPTION_KEY
    #[serde(default)]
    pub encryption_key: Option<String>,
    /// How long an issued state token stays valid
    #[serde(default = "default_state_expiry")]
    pub state_expiry_seconds: i64,
    /// Timeout for every outbound provider request
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
}

fn default_bind_address() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_database_path() -> String {
    "installations.db".to_string()
}

fn default_state_expiry() -> i64 {
    600
}

fn default_http_timeout() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            frontend_url: default_frontend_url(),
            database_path: default_database_path(),
            encryption_key: None,
            state_expiry_seconds: default_state_expiry(),
            http_timeout_seconds: default_http_timeout(),
        }
    }
}

/// Longest accepted state lifetime (one day)
const MAX_STATE_EXPIRY_SECONDS: i64 = 86_400;

impl AppConfig {
    /// Reject settings that would make every request fail.
    pub fn validate(&self) -> Result<()> {
        let server = &self.server;

        if server.http_timeout_seconds == 0 {
            bail!("http_timeout_seconds must be greater than zero");
        }
        if !(1..=MAX_STATE_EXPIRY_SECONDS).contains(&server.state_expiry_seconds) {
            bail!(
                "state_expiry_seconds must be between 1 and {}, got {}",
                MAX_STATE_EXPIRY_SECONDS,
                server.state_expiry_seconds
            );
        }

        Ok(())
    }
}

impl ServerConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }
}

/// Slack app credentials and endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_slack_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_slack_authorize_url")]
    pub authorize_url: String,
    /// Web API base, e.g. https://slack.com/api
    #[serde(default = "default_slack_api_base_url")]
    pub api_base_url: String,
}

fn default_slack_redirect_uri() -> String {
    "http://localhost:8000/api/auth/slack/callback".to_string()
}

fn default_slack_authorize_url() -> String {
    "https://slack.com/oauth/v2/authorize".to_string()
}

fn default_slack_api_base_url() -> String {
    "https://slack.com/api".to_string()
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: default_slack_redirect_uri(),
            authorize_url: default_slack_authorize_url(),
            api_base_url: default_slack_api_base_url(),
        }
    }
}

/// SID app credentials and endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct SidConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_sid_redirect_uri")]
    pub redirect_uri: String,
    /// Host serving /oauth/authorize, /oauth/token and /oauth/revoke
    #[serde(default = "default_sid_auth_base_url")]
    pub auth_base_url: String,
    #[serde(default = "default_sid_audience")]
    pub audience: String,
    /// Application name shown on the consent screen
    #[serde(default = "default_sid_app_name")]
    pub app_name: String,
}

fn default_sid_redirect_uri() -> String {
    "http://localhost:8000/api/auth/sid/callback".to_string()
}

fn default_sid_auth_base_url() -> String {
    "https://auth.sid.ai".to_string()
}

fn default_sid_audience() -> String {
    "https://api.sid.ai/api/v1/".to_string()
}

fn default_sid_app_name() -> String {
    "AgentGPT".to_string()
}

impl Default for SidConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: default_sid_redirect_uri(),
            auth_base_url: default_sid_auth_base_url(),
            audience: default_sid_audience(),
            app_name: default_sid_app_name(),
        }
    }
}

/// A pre-provisioned session: bearer token plus the user it stands for
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub token: String,
    #[serde(flatten)]
    pub user: User,
}

/// Load configuration from a TOML file
pub fn load_config(path: &str) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: AppConfig = toml::from_str(&contents).context("Failed to parse config file")?;
    Ok(config)
}
