use super::{InstallError, InstallerContext, OAuthInstaller};
use crate::auth::{OrganizationRole, User};
use crate::credentials::{Installation, Provider};
use crate::providers::{SlackChannel, SlackClient};
use async_trait::async_trait;
use tracing::{debug, info};

/// Bot scopes requested at install time
const SLACK_SCOPES: &[&str] = &["chat:write"];

/// Slack workspace installer (bot token, non-expiring).
pub struct SlackInstaller {
    ctx: InstallerContext,
    client: SlackClient,
}

impl SlackInstaller {
    pub fn new(ctx: InstallerContext) -> Self {
        let client = SlackClient::new(ctx.http_client.clone(), ctx.config.slack.api_base_url.clone());
        Self { ctx, client }
    }

    /// Build the v2 authorize URL for a pending state.
    fn authorize_url(&self, state: &str) -> String {
        let slack = &self.ctx.config.slack;
        format!(
            "{}?state={}&client_id={}&scope={}&user_scope=&redirect_uri={}",
            slack.authorize_url,
            urlencoding::encode(state),
            urlencoding::encode(&slack.client_id),
            urlencoding::encode(&SLACK_SCOPES.join(",")),
            urlencoding::encode(&slack.redirect_uri)
        )
    }

    /// Public channels of the organization's Slack workspace.
    ///
    /// Fails with `NotFound` when the organization has no Slack installation.
    pub async fn channels(&self, role: &OrganizationRole) -> Result<Vec<SlackChannel>, InstallError> {
        let installation = self
            .ctx
            .store
            .get_installation_by_organization_id(&role.organization_id, Provider::Slack)?
            .ok_or_else(|| {
                InstallError::NotFound(format!(
                    "Slack installation for organization '{}'",
                    role.organization_id
                ))
            })?;

        let encrypted = installation.access_token_enc.as_deref().unwrap_or_default();
        let token = self.ctx.encryption.decrypt(encrypted)?;

        let channels = self
            .client
            .conversations_list(&token)
            .await
            .map_err(|e| InstallError::remote(Provider::Slack, e))?;

        debug!(
            organization_id = %role.organization_id,
            count = channels.len(),
            "Listed Slack channels"
        );
        Ok(channels)
    }
}

#[async_trait]
impl OAuthInstaller for SlackInstaller {
    fn provider(&self) -> Provider {
        Provider::Slack
    }

    async fn install(&self, user: &User, redirect_uri: &str) -> Result<String, InstallError> {
        let installation = self
            .ctx
            .store
            .create_installation(user, Provider::Slack, redirect_uri)?;
        let state = installation.state.as_deref().unwrap_or_default();

        info!(user_id = %user.id, installation_id = %installation.id, "Slack install started");
        Ok(self.authorize_url(state))
    }

    async fn install_callback(
        &self,
        code: &str,
        state: &str,
    ) -> Result<Installation, InstallError> {
        let mut installation = self.ctx.pending_installation(Provider::Slack, state)?;

        let slack = &self.ctx.config.slack;
        let response = self
            .client
            .oauth_v2_access(&slack.client_id, &slack.client_secret, code, &slack.redirect_uri)
            .await
            .map_err(|e| InstallError::remote(Provider::Slack, e))?;

        self.ctx
            .store_access_token(&mut installation, &response.access_token)?;
        installation.token_type = Some(response.token_type);
        installation.scope = Some(response.scope);
        self.ctx.complete_installation(&mut installation)?;

        let team = response.team.unwrap_or_default();
        info!(
            user_id = %installation.user_id,
            installation_id = %installation.id,
            team_id = %team.id,
            team_name = %team.name,
            "Slack install completed"
        );
        Ok(installation)
    }

    async fn uninstall(&self, _user: &User) -> Result<bool, InstallError> {
        Err(InstallError::Unsupported {
            provider: Provider::Slack,
            operation: "uninstall",
        })
    }
}
