use crate::credentials::Provider;

/// Installer failures
#[derive(Debug)]
pub enum InstallError {
    /// Callback state is unknown, consumed, expired, or belongs to another provider
    Forbidden,
    /// A required installation does not exist
    NotFound(String),
    /// No installer for this provider name
    UnsupportedProvider(String),
    /// The provider has an installer but not this operation
    Unsupported {
        provider: Provider,
        operation: &'static str,
    },
    /// Provider API call failed (network, timeout, non-2xx, malformed body)
    RemoteProvider {
        provider: Provider,
        message: String,
    },
    /// Storage or encryption fault
    Internal(anyhow::Error),
}

impl InstallError {
    pub(crate) fn remote(provider: Provider, err: anyhow::Error) -> Self {
        InstallError::RemoteProvider {
            provider,
            message: format!("{:#}", err),
        }
    }
}

impl std::fmt::Display for InstallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallError::Forbidden => write!(f, "Invalid or expired OAuth state"),
            InstallError::NotFound(what) => write!(f, "Not found: {}", what),
            InstallError::UnsupportedProvider(name) => {
                write!(f, "Unsupported OAuth provider '{}'", name)
            }
            InstallError::Unsupported {
                provider,
                operation,
            } => write!(f, "Operation '{}' is not supported for provider '{}'", operation, provider),
            InstallError::RemoteProvider { provider, message } => {
                write!(f, "Provider '{}' request failed: {}", provider, message)
            }
            InstallError::Internal(e) => write!(f, "Internal error: {:#}", e),
        }
    }
}

impl std::error::Error for InstallError {}

impl From<anyhow::Error> for InstallError {
    fn from(e: anyhow::Error) -> Self {
        InstallError::Internal(e)
    }
}
