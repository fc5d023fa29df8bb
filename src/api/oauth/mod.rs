//! OAuth install endpoints.
//!
//! Implements the authorization code flow for provider integrations:
//! 1. GET /api/auth/:provider → authorization URL for the caller
//! 2. User authorizes on the provider's site
//! 3. Provider redirects to /api/auth/:provider/callback
//! 4. Exchange code for tokens, store encrypted, redirect to the app
//! 5. GET /api/auth/:provider/uninstall revokes and removes the installation


use crate::auth::{AuthError, SessionRegistry, User};
use crate::credentials::Provider;
use crate::installers::{installer_factory, InstallError, InstallerContext, SlackInstaller};
use crate::providers::SlackChannel;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Redirect, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types for OAuth endpoints
#[derive(Debug)]
pub(crate) enum AppError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    ServerError(String),
    BadGateway(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        AppError::Unauthorized(e.to_string())
    }
}

impl From<InstallError> for AppError {
    fn from(e: InstallError) -> Self {
        match e {
            InstallError::Forbidden => AppError::Forbidden(e.to_string()),
            InstallError::NotFound(_) => AppError::NotFound(e.to_string()),
            InstallError::UnsupportedProvider(_) | InstallError::Unsupported { .. } => {
                AppError::BadRequest(e.to_string())
            }
            InstallError::RemoteProvider { provider, message } => {
                error!(provider = %provider, error = %message, "Provider request failed");
                AppError::BadGateway(format!("Provider '{}' request failed", provider))
            }
            InstallError::Internal(err) => {
                error!(error = %format!("{:#}", err), "OAuth request failed");
                AppError::ServerError("Internal server error".to_string())
            }
        }
    }
}

/// Shared application state for the OAuth API
#[derive(Clone)]
pub struct OAuthAppState {
    pub installers: InstallerContext,
    pub sessions: Arc<SessionRegistry>,
}

impl OAuthAppState {
    fn authenticate(&self, headers: &HeaderMap) -> Result<User, AppError> {
        self.sessions.authenticate(headers).map_err(|e| {
            debug!(error = %e, "Rejected unauthenticated request");
            AppError::from(e)
        })
    }
}

/// Query parameters for GET /api/auth/:provider
#[derive(Deserialize)]
pub struct InstallQuery {
    redirect: Option<String>,
}

/// OAuth callback query parameters
#[derive(Deserialize)]
pub struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Response for GET /api/auth/:provider/uninstall
#[derive(Serialize)]
pub struct UninstallResponse {
    pub success: bool,
}

/// Response for GET /api/auth/sid/info
#[derive(Serialize)]
pub struct SidInfoResponse {
    pub connected: bool,
}

/// Create OAuth API router
pub fn create_oauth_router(state: OAuthAppState) -> Router {
    Router::new()
        .route("/api/auth/:provider", get(oauth_install))
        .route("/api/auth/:provider/uninstall", get(oauth_uninstall))
        .route("/api/auth/:provider/callback", get(oauth_callback))
        .route("/api/auth/:provider/info", get(provider_info))
        .with_state(Arc::new(state))
}

/// GET /api/auth/:provider
///
/// Starts an installation and returns the provider's authorization URL.
/// `redirect` is where the user lands after the callback (defaults to the
/// frontend URL).
async fn oauth_install(
    State(state): State<Arc<OAuthAppState>>,
    Path(provider): Path<String>,
    Query(query): Query<InstallQuery>,
    headers: HeaderMap,
) -> Result<Json<String>, AppError> {
    let user = state.authenticate(&headers)?;
    let installer = installer_factory(&provider, &state.installers)?;

    let redirect = query
        .redirect
        .unwrap_or_else(|| state.installers.config.server.frontend_url.clone());

    let url = installer.install(&user, &redirect).await?;

    info!(provider = %provider, user_id = %user.id, "Issued OAuth authorization URL");
    Ok(Json(url))
}

/// GET /api/auth/:provider/uninstall
async fn oauth_uninstall(
    State(state): State<Arc<OAuthAppState>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
) -> Result<Json<UninstallResponse>, AppError> {
    let user = state.authenticate(&headers)?;
    let installer = installer_factory(&provider, &state.installers)?;

    let success = installer.uninstall(&user).await?;

    info!(provider = %provider, user_id = %user.id, success, "OAuth uninstall handled");
    Ok(Json(UninstallResponse { success }))
}

/// GET /api/auth/:provider/callback
///
/// Public endpoint hit by the provider. Exchanges the authorization code and
/// redirects to the URI stored at install time.
///
/// # Security
/// - The state must match a pending installation for this provider
/// - State is single-use (consumed on success)
async fn oauth_callback(
    State(state): State<Arc<OAuthAppState>>,
    Path(provider): Path<String>,
    Query(callback): Query<OAuthCallback>,
) -> Result<Redirect, AppError> {
    debug!(provider = %provider, "OAuth callback received");

    let installer = installer_factory(&provider, &state.installers)?;

    if let Some(error) = callback.error {
        let description = callback
            .error_description
            .unwrap_or_else(|| "Unknown error".to_string());
        warn!(
            provider = %provider,
            error = %error,
            description = %description,
            "OAuth authorization failed"
        );
        return Err(AppError::BadRequest(format!(
            "OAuth authorization failed: {} - {}",
            error, description
        )));
    }

    let code = callback
        .code
        .ok_or_else(|| AppError::BadRequest("Missing 'code' parameter".to_string()))?;
    let csrf_state = callback
        .state
        .ok_or_else(|| AppError::BadRequest("Missing 'state' parameter".to_string()))?;

    let installation = installer.install_callback(&code, &csrf_state).await?;

    info!(
        provider = %provider,
        user_id = %installation.user_id,
        "OAuth flow completed successfully"
    );

    Ok(Redirect::temporary(&installation.redirect_uri))
}

/// GET /api/auth/:provider/info
///
/// - `sid`: `{ "connected": bool }` for the caller
/// - `slack`: public channels of the caller's organization workspace
async fn provider_info(
    State(state): State<Arc<OAuthAppState>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let provider: Provider = provider
        .parse()
        .map_err(|_| InstallError::UnsupportedProvider(provider.clone()))?;
    let user = state.authenticate(&headers)?;

    match provider {
        Provider::Sid => Ok(Json(sid_info(&state, &user)?).into_response()),
        Provider::Slack => Ok(Json(slack_channels(&state, &user).await?).into_response()),
    }
}

fn sid_info(state: &OAuthAppState, user: &User) -> Result<SidInfoResponse, AppError> {
    let connected = state
        .installers
        .store
        .get_installation_by_user_id(&user.id, Provider::Sid)
        .map_err(InstallError::from)?
        .is_some_and(|installation| installation.has_access_token());

    Ok(SidInfoResponse { connected })
}

async fn slack_channels(state: &OAuthAppState, user: &User) -> Result<Vec<SlackChannel>, AppError> {
    let role = user.organization_role().ok_or_else(|| {
        AppError::Forbidden("An organization is required for this endpoint".to_string())
    })?;

    let installer = SlackInstaller::new(state.installers.clone());
    Ok(installer.channels(&role).await?)
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
