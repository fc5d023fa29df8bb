//! OAuth installers: one strategy per provider.
//!
//! Implements the install / callback / uninstall flow:
//! 1. `install` creates (or reuses) a pending installation with a fresh state
//!    and returns the provider's authorization URL
//! 2. The user authorizes on the provider's site
//! 3. The provider redirects to the callback with `code` and `state`
//! 4. `install_callback` consumes the state, exchanges the code and stores
//!    encrypted tokens
//! 5. `uninstall` revokes provider-side and soft-deletes the installation

mod error;
mod sid;
mod slack;

pub use error::InstallError;
pub use sid::SidInstaller;
pub use slack::SlackInstaller;

use crate::auth::User;
use crate::config::AppConfig;
use crate::credentials::{EncryptionService, Installation, InstallationStore, Provider};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::warn;

/// Provider-specific install strategy.
#[async_trait]
pub trait OAuthInstaller: Send + Sync {
    fn provider(&self) -> Provider;

    /// Start an installation and return the provider's authorization URL.
    async fn install(&self, user: &User, redirect_uri: &str) -> Result<String, InstallError>;

    /// Complete an installation from the provider's callback.
    ///
    /// Fails with [`InstallError::Forbidden`] when `state` matches no pending
    /// installation for this provider.
    async fn install_callback(&self, code: &str, state: &str)
        -> Result<Installation, InstallError>;

    /// Revoke and remove the user's installation.
    ///
    /// Returns `false` when there was nothing to uninstall.
    async fn uninstall(&self, user: &User) -> Result<bool, InstallError>;
}

/// Collaborators every installer needs, built once at startup.
#[derive(Clone)]
pub struct InstallerContext {
    pub store: Arc<InstallationStore>,
    pub encryption: Arc<EncryptionService>,
    pub config: Arc<AppConfig>,
    pub http_client: reqwest::Client,
}

impl InstallerContext {
    /// Encrypt and attach an access token.
    pub fn store_access_token(
        &self,
        installation: &mut Installation,
        access_token: &str,
    ) -> Result<(), InstallError> {
        installation.access_token_enc = Some(self.encryption.encrypt(access_token)?);
        Ok(())
    }

    /// Encrypt and attach a refresh token.
    pub fn store_refresh_token(
        &self,
        installation: &mut Installation,
        refresh_token: &str,
    ) -> Result<(), InstallError> {
        installation.refresh_token_enc = Some(self.encryption.encrypt(refresh_token)?);
        Ok(())
    }

    /// Consume a callback state and return its pending installation.
    ///
    /// The state is cleared before any provider call is made, so concurrent
    /// callbacks carrying the same state cannot both proceed.
    ///
    /// # Security
    /// - Unknown, consumed and expired states are all rejected the same way
    /// - A state issued for one provider is rejected on another's callback
    pub fn pending_installation(
        &self,
        provider: Provider,
        state: &str,
    ) -> Result<Installation, InstallError> {
        let issued_after =
            Utc::now() - Duration::seconds(self.config.server.state_expiry_seconds);

        if let Some(installation) = self.store.take_pending(state, provider, issued_after)? {
            return Ok(installation);
        }

        match self.store.get_installation_by_state(state)? {
            None => warn!(provider = %provider, "OAuth callback with unknown state"),
            Some(other) if other.provider != provider => warn!(
                expected = %other.provider,
                actual = %provider,
                "OAuth callback state issued for another provider"
            ),
            Some(other) => {
                warn!(provider = %provider, installation_id = %other.id, "OAuth state expired")
            }
        }
        Err(InstallError::Forbidden)
    }

    /// Persist the tokens of a callback's installation.
    ///
    /// Fails with [`InstallError::Forbidden`] if the installation was removed
    /// while the code exchange was in flight.
    pub fn complete_installation(&self, installation: &mut Installation) -> Result<(), InstallError> {
        if self.store.complete_installation(installation)? {
            return Ok(());
        }

        warn!(
            provider = %installation.provider,
            installation_id = %installation.id,
            "Installation removed before its callback completed"
        );
        Err(InstallError::Forbidden)
    }
}

/// Map a provider name to its installer.
pub fn installer_factory(
    provider: &str,
    ctx: &InstallerContext,
) -> Result<Box<dyn OAuthInstaller>, InstallError> {
    let provider: Provider = provider
        .parse()
        .map_err(|_| InstallError::UnsupportedProvider(provider.to_string()))?;

    Ok(match provider {
        Provider::Slack => Box::new(SlackInstaller::new(ctx.clone())),
        Provider::Sid => Box::new(SidInstaller::new(ctx.clone())),
    })
}
