use axum::http::HeaderMap;
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;

#[cfg(test)]
mod tests;

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: String,
    /// Organization the user currently acts for
    #[serde(default)]
    pub organization_id: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            organization_id: None,
        }
    }

    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    /// Organization-scoped role, if the user acts for an organization.
    pub fn organization_role(&self) -> Option<OrganizationRole> {
        self.organization_id.as_ref().map(|organization_id| OrganizationRole {
            user_id: self.id.clone(),
            organization_id: organization_id.clone(),
        })
    }
}

/// A user acting on behalf of an organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationRole {
    pub user_id: String,
    pub organization_id: String,
}

/// Maps bearer tokens to users.
///
/// The application's real session backend lives outside this service; this
/// registry is the in-process lookup the router consults.
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, User>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Register a user under a known token (configured sessions)
    pub fn insert(&self, token: impl Into<String>, user: User) {
        self.sessions.insert(token.into(), user);
    }

    pub fn lookup(&self, token: &str) -> Option<User> {
        self.sessions.get(token).map(|u| u.clone())
    }

    /// Resolve the user behind a request's Authorization header
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<User, AuthError> {
        let token = extract_bearer_token(headers).map_err(AuthError::InvalidToken)?;
        self.lookup(&token).ok_or(AuthError::UnknownSession)
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract bearer token from HTTP Authorization header
///
/// Expected format: "Authorization: Bearer <token>"
/// Returns the token string if present and valid.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, TokenError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(TokenError::Missing)?
        .to_str()
        .map_err(|_| TokenError::InvalidFormat)?;

    parse_bearer_token(auth_header)
}

/// Parse bearer token from Authorization header value
fn parse_bearer_token(header_value: &str) -> Result<String, TokenError> {
    let parts: Vec<&str> = header_value.splitn(2, ' ').collect();

    if parts.len() != 2 {
        return Err(TokenError::InvalidFormat);
    }

    if parts[0].to_lowercase() != "bearer" {
        return Err(TokenError::InvalidFormat);
    }

    let token = parts[1].trim();

    if token.is_empty() {
        return Err(TokenError::Empty);
    }

    Ok(token.to_string())
}

/// Token extraction errors
#[derive(Debug, PartialEq, Clone)]
pub enum TokenError {
    /// Authorization header not present
    Missing,
    /// Not "Bearer <token>"
    InvalidFormat,
    /// Token is empty string
    Empty,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Missing => write!(f, "Authorization token not provided"),
            TokenError::InvalidFormat => write!(f, "Invalid authorization token format"),
            TokenError::Empty => write!(f, "Authorization token is empty"),
        }
    }
}

impl std::error::Error for TokenError {}

/// Authentication errors
#[derive(Debug, PartialEq, Clone)]
pub enum AuthError {
    /// Missing or malformed Authorization header
    InvalidToken(TokenError),
    /// Well-formed token with no session behind it
    UnknownSession,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::InvalidToken(e) => write!(f, "Invalid token: {}", e),
            AuthError::UnknownSession => write!(f, "Unknown or expired session"),
        }
    }
}

impl std::error::Error for AuthError {}
