//! Error types for credential storage and token refresh

/// Errors from the credential lifecycle.
///
/// All variants are terminal for the current call chain: none of them is
/// retried internally.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("credential store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("credential store write failed: {0}")]
    StoreWriteError(String),

    #[error("token refresh denied: {0}")]
    RefreshDenied(String),
}

impl Error {
    /// Short machine-readable label for logs, metrics and error payloads.
    pub fn label(&self) -> &'static str {
        match self {
            Error::StoreUnavailable(_) => "store_unavailable",
            Error::MissingCredential(_) => "missing_credential",
            Error::StoreWriteError(_) => "store_write_error",
            Error::RefreshDenied(_) => "refresh_denied",
        }
    }

    /// The diagnostic detail without the variant prefix.
    pub fn detail(&self) -> &str {
        match self {
            Error::StoreUnavailable(msg)
            | Error::MissingCredential(msg)
            | Error::StoreWriteError(msg)
            | Error::RefreshDenied(msg) => msg,
        }
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
