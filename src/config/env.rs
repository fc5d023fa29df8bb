use super::AppConfig;
use std::str::FromStr;
use tracing::warn;

/// Overlay `OAUTH_*` environment variables onto a loaded config.
///
/// Secrets normally come from the environment rather than the config file.
pub fn apply_env_overrides(config: &mut AppConfig) {
    apply_overrides(config, |name| std::env::var(name).ok());
}

fn apply_overrides(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("OAUTH_BIND_ADDRESS") {
        config.server.bind_address = v;
    }
    if let Some(v) = lookup("OAUTH_FRONTEND_URL") {
        config.server.frontend_url = v;
    }
    if let Some(v) = lookup("OAUTH_DATABASE_PATH") {
        config.server.database_path = v;
    }
    if let Some(v) = lookup("OAUTH_ENCRYPTION_KEY") {
        config.server.encryption_key = Some(v);
    }
    if let Some(n) = parse_number(&lookup, "OAUTH_STATE_EXPIRY_SECONDS") {
        config.server.state_expiry_seconds = n;
    }
    if let Some(n) = parse_number(&lookup, "OAUTH_HTTP_TIMEOUT_SECONDS") {
        config.server.http_timeout_seconds = n;
    }

    if let Some(v) = lookup("OAUTH_SLACK_CLIENT_ID") {
        config.slack.client_id = v;
    }
    if let Some(v) = lookup("OAUTH_SLACK_CLIENT_SECRET") {
        config.slack.client_secret = v;
    }
    if let Some(v) = lookup("OAUTH_SLACK_REDIRECT_URI") {
        config.slack.redirect_uri = v;
    }

    if let Some(v) = lookup("OAUTH_SID_CLIENT_ID") {
        config.sid.client_id = v;
    }
    if let Some(v) = lookup("OAUTH_SID_CLIENT_SECRET") {
        config.sid.client_secret = v;
    }
    if let Some(v) = lookup("OAUTH_SID_REDIRECT_URI") {
        config.sid.redirect_uri = v;
    }
}

/// Numeric override; unparseable values are logged and skipped.
fn parse_number<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!(variable = name, value = %raw, "Ignoring non-numeric override");
            None
        }
    }
}
