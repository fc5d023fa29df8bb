//! Encrypted OAuth installation storage.
//!
//! An [`Installation`] is the persisted record tracking one user's connection
//! to one external provider. Tokens are only ever held in encrypted form.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       InstallationStore                  │
//! │  - pending rows keyed by state token     │
//! │  - soft delete / resurrection            │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!   (ciphertext in)      (ciphertext out)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       EncryptionService                  │
//! │  - AES-256-GCM, nonce per token          │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use oauth_installers::auth::User;
//! use oauth_installers::credentials::{EncryptionService, InstallationStore, Provider};
//!
//! # fn main() -> anyhow::Result<()> {
//! let encryption = EncryptionService::new(&std::env::var("OAUTH_ENCRYPTION_KEY")?)?;
//! let store = InstallationStore::new("installations.db")?;
//!
//! let user = User::new("alice");
//! let mut installation = store.create_installation(&user, Provider::Sid, "https://app/done")?;
//! installation.access_token_enc = Some(encryption.encrypt("token")?);
//! store.save(&mut installation)?;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

mod encryption;
mod storage;

pub use encryption::{validate_key, EncryptionService};
pub use storage::{generate_state, InstallationStore};
pub(crate) use storage::issue_state;

/// External provider an installation connects to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Slack,
    Sid,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Slack => "slack",
            Provider::Sid => "sid",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a provider name has no installer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownProvider(pub String);

impl fmt::Display for UnknownProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unsupported OAuth provider '{}'", self.0)
    }
}

impl std::error::Error for UnknownProvider {}

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "slack" => Ok(Provider::Slack),
            "sid" => Ok(Provider::Sid),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

/// One user's connection to one provider.
///
/// # Lifecycle
/// 1. Created pending by `install` (fresh `state`, no tokens)
/// 2. Populated by `install_callback` (tokens set, `state` consumed)
/// 3. Soft-deleted by `uninstall` (tokens cleared, `delete_date` set)
/// 4. Optionally resurrected by a later `install` (same `id`)
///
/// # Security
/// - `access_token_enc` and `refresh_token_enc` hold ciphertext only
/// - `state` is single-use and generated from the OS RNG
#[derive(Clone, Debug, PartialEq)]
pub struct Installation {
    /// Stable row identifier (UUID v4), preserved across resurrection
    pub id: String,

    pub user_id: String,

    /// Organization the user belonged to when installing
    pub organization_id: Option<String>,

    pub provider: Provider,

    /// Pending callback token, `None` once consumed
    pub state: Option<String>,

    pub state_created_at: Option<DateTime<Utc>>,

    /// Where to send the user after the callback
    pub redirect_uri: String,

    pub access_token_enc: Option<String>,

    pub refresh_token_enc: Option<String>,

    pub token_type: Option<String>,

    pub scope: Option<String>,

    pub access_token_expiration: Option<DateTime<Utc>>,

    pub create_date: DateTime<Utc>,

    pub update_date: DateTime<Utc>,

    /// Soft-delete marker
    pub delete_date: Option<DateTime<Utc>>,
}

impl Installation {
    /// True when a non-empty access token is stored.
    pub fn has_access_token(&self) -> bool {
        self.access_token_enc
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }
}
