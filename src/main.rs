use anyhow::{anyhow, Context, Result};
use oauth_installers::api::{create_app, OAuthAppState};
use oauth_installers::auth::SessionRegistry;
use oauth_installers::config::{apply_env_overrides, load_config, AppConfig};
use oauth_installers::credentials::{EncryptionService, InstallationStore};
use oauth_installers::installers::InstallerContext;
use oauth_installers::providers::build_http_client;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oauth_installers=info".into()),
        )
        .init();

    info!("OAuth installer service starting...");

    let config_path =
        std::env::var("OAUTH_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let mut config = if std::path::Path::new(&config_path).exists() {
        load_config(&config_path)?
    } else {
        warn!(path = %config_path, "Config file not found, using defaults");
        AppConfig::default()
    };
    apply_env_overrides(&mut config);
    config.validate().context("Invalid configuration")?;

    let encryption_key = config
        .server
        .encryption_key
        .clone()
        .ok_or_else(|| anyhow!("OAUTH_ENCRYPTION_KEY is required (base64-encoded 32-byte key)"))?;
    let encryption =
        Arc::new(EncryptionService::new(&encryption_key).context("Invalid encryption key")?);

    let store = Arc::new(
        InstallationStore::new(&config.server.database_path)
            .context("Failed to initialize installation store")?,
    );
    info!(database = %config.server.database_path, "Installation store initialized");

    let http_client = build_http_client(config.server.http_timeout())?;

    let sessions = Arc::new(SessionRegistry::new());
    for session in &config.sessions {
        sessions.insert(session.token.clone(), session.user.clone());
    }
    info!(count = sessions.count(), "Sessions loaded");

    if config.slack.client_id.is_empty() {
        warn!("Slack client id not configured (OAUTH_SLACK_CLIENT_ID)");
    }
    if config.sid.client_id.is_empty() {
        warn!("SID client id not configured (OAUTH_SID_CLIENT_ID)");
    }

    let bind_address = config.server.bind_address.clone();
    let state = OAuthAppState {
        installers: InstallerContext {
            store,
            encryption,
            config: Arc::new(config),
            http_client,
        },
        sessions,
    };

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    info!(address = %bind_address, "Listening");

    axum::serve(listener, create_app(state))
        .await
        .context("Server error")?;

    Ok(())
}
