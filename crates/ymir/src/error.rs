//! Authentication error types.

use crate::provider::ProviderError;
use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Malformed input, rejected before any remote call
    #[error("Validation error: {0}")]
    Validation(String),

    /// An account already exists for this email
    #[error("Email already registered")]
    EmailAlreadyRegistered { provider: Option<ProviderError> },

    /// Invalid email or password
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(ProviderError),

    /// Sign-in attempted before confirming the email
    #[error("Email not confirmed: {0}")]
    EmailNotConfirmed(ProviderError),

    /// Password rejected by the service's strength policy
    #[error("Weak password: {0}")]
    WeakPassword(ProviderError),

    /// Throttled, locally or remotely
    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited {
        retry_after_ms: u64,
        is_critical: bool,
        provider: Option<ProviderError>,
    },

    /// Session not found
    #[error("Not logged in")]
    NotLoggedIn,

    /// Any other remote failure
    #[error("Auth service error: {0}")]
    Provider(ProviderError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] dashboard_storage::StorageError),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Message suitable for showing to the end user.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Validation(message) => message.clone(),
            AuthError::EmailAlreadyRegistered { .. } => {
                "An account with this email already exists. Use a different email or log in."
                    .to_string()
            }
            AuthError::InvalidCredentials(_) => {
                "Invalid email or password. Please check your credentials and try again."
                    .to_string()
            }
            AuthError::EmailNotConfirmed(_) => {
                "Please confirm your email address before logging in. Check your inbox for the verification link."
                    .to_string()
            }
            AuthError::WeakPassword(_) => {
                "Password is too weak. Use at least 6 characters mixing letters and numbers."
                    .to_string()
            }
            AuthError::RateLimited {
                retry_after_ms,
                is_critical,
                ..
            } => {
                let secs = retry_after_ms.div_ceil(1_000).max(1);
                let mut message = format!(
                    "Too many requests. Please wait {} second{} before trying again.",
                    secs,
                    if secs == 1 { "" } else { "s" }
                );
                if *is_critical {
                    message.push_str(" If this keeps happening, reset your local session.");
                }
                message
            }
            AuthError::NotLoggedIn => "You are not logged in.".to_string(),
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }

    /// The untouched remote error, when there is one.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            AuthError::InvalidCredentials(e)
            | AuthError::EmailNotConfirmed(e)
            | AuthError::WeakPassword(e)
            | AuthError::Provider(e) => Some(e),
            AuthError::EmailAlreadyRegistered { provider }
            | AuthError::RateLimited { provider, .. } => provider.as_ref(),
            _ => None,
        }
    }

    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors include:
    /// - Rate limiting (after the indicated wait)
    /// - Transport failures and 5xx responses from the service
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::RateLimited { .. } => true,
            AuthError::Provider(e) => match e.status {
                Some(status) => status >= 500,
                None => true,
            },
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            _ => false,
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
