use super::{InstallError, InstallerContext, OAuthInstaller};
use crate::auth::User;
use crate::credentials::{issue_state, Installation, Provider};
use crate::providers::{SidClient, SidTokenRequest};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

/// Scopes requested at install time
const SID_SCOPES: &[&str] = &["data:query", "offline_access"];

/// Absolute expiry for a token lifetime reported by the provider.
///
/// `None` for negative lifetimes or ones that overflow a timestamp.
fn token_expiration(expires_in: i64) -> Option<DateTime<Utc>> {
    if expires_in < 0 {
        return None;
    }
    Duration::try_seconds(expires_in).and_then(|ttl| Utc::now().checked_add_signed(ttl))
}

/// SID installer (expiring access token plus refresh token).
pub struct SidInstaller {
    ctx: InstallerContext,
    client: SidClient,
}

impl SidInstaller {
    pub fn new(ctx: InstallerContext) -> Self {
        let client = SidClient::new(ctx.http_client.clone(), ctx.config.sid.auth_base_url.clone());
        Self { ctx, client }
    }

    fn authorize_url(&self, state: &str) -> Result<String, InstallError> {
        let sid = &self.ctx.config.sid;
        let scope = SID_SCOPES.join(" ");
        let query = serde_urlencoded::to_string(vec![
            ("client_id", sid.client_id.as_str()),
            ("redirect_uri", sid.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("state", state),
            ("audience", sid.audience.as_str()),
            ("name", sid.app_name.as_str()),
        ])
        .context("Failed to encode SID authorize query")?;

        Ok(format!(
            "{}/oauth/authorize?{}",
            sid.auth_base_url.trim_end_matches('/'),
            query
        ))
    }

    /// Bring back the user's soft-deleted row, if any, with a fresh state.
    fn resurrect(&self, user: &User, redirect_uri: &str) -> Result<Option<Installation>, InstallError> {
        let Some(mut installation) = self.ctx.store.get_deleted_installation(&user.id, Provider::Sid)?
        else {
            return Ok(None);
        };

        installation.delete_date = None;
        installation.redirect_uri = redirect_uri.to_string();
        installation.organization_id = user.organization_id.clone();
        issue_state(&mut installation);
        self.ctx.store.save(&mut installation)?;

        info!(user_id = %user.id, installation_id = %installation.id, "Resurrected SID installation");
        Ok(Some(installation))
    }
}

#[async_trait]
impl OAuthInstaller for SidInstaller {
    fn provider(&self) -> Provider {
        Provider::Sid
    }

    async fn install(&self, user: &User, redirect_uri: &str) -> Result<String, InstallError> {
        let active = self.ctx.store.get_installation_by_user_id(&user.id, Provider::Sid)?;

        let installation = match active {
            Some(_) => self
                .ctx
                .store
                .create_installation(user, Provider::Sid, redirect_uri)?,
            None => match self.resurrect(user, redirect_uri)? {
                Some(installation) => installation,
                None => self
                    .ctx
                    .store
                    .create_installation(user, Provider::Sid, redirect_uri)?,
            },
        };

        info!(user_id = %user.id, installation_id = %installation.id, "SID install started");
        self.authorize_url(installation.state.as_deref().unwrap_or_default())
    }

    async fn install_callback(
        &self,
        code: &str,
        state: &str,
    ) -> Result<Installation, InstallError> {
        let mut installation = self.ctx.pending_installation(Provider::Sid, state)?;

        let sid = &self.ctx.config.sid;
        let response = self
            .client
            .exchange_code(&SidTokenRequest {
                grant_type: "authorization_code",
                client_id: &sid.client_id,
                client_secret: &sid.client_secret,
                redirect_uri: &sid.redirect_uri,
                code,
            })
            .await
            .map_err(|e| InstallError::remote(Provider::Sid, e))?;

        self.ctx
            .store_access_token(&mut installation, &response.access_token)?;
        match response.refresh_token.as_deref() {
            Some(refresh_token) => self.ctx.store_refresh_token(&mut installation, refresh_token)?,
            None => installation.refresh_token_enc = None,
        }
        installation.access_token_expiration = response
            .expires_in
            .map(|seconds| {
                token_expiration(seconds).ok_or_else(|| InstallError::RemoteProvider {
                    provider: Provider::Sid,
                    message: format!("Token response has out-of-range expires_in {}", seconds),
                })
            })
            .transpose()?;
        installation.token_type = response.token_type;
        installation.scope = response.scope.or_else(|| Some(SID_SCOPES.join(" ")));
        self.ctx.complete_installation(&mut installation)?;

        info!(
            user_id = %installation.user_id,
            installation_id = %installation.id,
            has_refresh_token = installation.refresh_token_enc.is_some(),
            "SID install completed"
        );
        Ok(installation)
    }

    async fn uninstall(&self, user: &User) -> Result<bool, InstallError> {
        let Some(mut installation) = self.ctx.store.get_installation_by_user_id(&user.id, Provider::Sid)?
        else {
            return Ok(false);
        };

        if !installation.has_access_token() {
            return Ok(false);
        }

        let revocable = installation
            .refresh_token_enc
            .as_deref()
            .or(installation.access_token_enc.as_deref())
            .map(|enc| self.ctx.encryption.decrypt(enc))
            .transpose()?;

        self.ctx.store.delete(&mut installation)?;
        info!(user_id = %user.id, installation_id = %installation.id, "SID installation removed");

        if let Some(token) = revocable {
            let sid = &self.ctx.config.sid;
            if let Err(e) = self.client.revoke(&sid.client_id, &sid.client_secret, &token).await {
                warn!(
                    user_id = %user.id,
                    installation_id = %installation.id,
                    error = %e,
                    "SID token revocation failed; local installation already removed"
                );
            }
        }

        Ok(true)
    }
}
