//! Remote auth service boundary.
//!
//! `AuthProvider` is the black-box contract the gateway, cache and updater
//! talk to. `SupabaseAuthClient` implements it over the GoTrue REST API and
//! `MockAuthProvider` implements it in memory for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Error code used when an operation needs a session and none is stored.
pub const SESSION_NOT_FOUND_CODE: &str = "session_not_found";

/// Error returned by the remote auth service, kept intact for callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    /// Human-readable message from the service.
    pub message: String,
    /// HTTP status, absent for transport failures.
    pub status: Option<u16>,
    /// Machine-readable error code, when the service sends one.
    pub code: Option<String>,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            code: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// No stored session to act on.
    pub fn session_missing() -> Self {
        Self::new("Auth session missing!")
            .with_status(401)
            .with_code(SESSION_NOT_FOUND_CODE)
    }

    /// Throttling: HTTP 429 or a message that says so.
    pub fn is_rate_limited(&self) -> bool {
        if self.status == Some(429) {
            return true;
        }
        let message = self.message.to_ascii_lowercase();
        message.contains("rate limit") || message.contains("too many requests")
    }

    pub(crate) fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }

    pub(crate) fn message_contains(&self, needle: &str) -> bool {
        self.message.to_ascii_lowercase().contains(needle)
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        let mut error = ProviderError::new(err.to_string());
        error.status = err.status().map(|s| s.as_u16());
        error
    }
}

/// Result type alias for provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// User record as returned by the auth service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_confirmed_at: Option<String>,
    #[serde(default)]
    pub user_metadata: Map<String, Value>,
}

impl AuthUser {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: Some(email.into()),
            email_confirmed_at: None,
            user_metadata: Map::new(),
        }
    }

    /// Confirmed by the service, or explicitly flagged in metadata.
    pub fn is_verified(&self) -> bool {
        self.email_confirmed_at.is_some()
            || matches!(self.user_metadata.get("email_verified"), Some(Value::Bool(true)))
    }
}

/// Authenticated session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds.
    pub expires_at: i64,
    pub user: AuthUser,
}

impl Session {
    /// True when the access token expires within `margin_secs` of `now_secs`.
    pub fn expires_within(&self, now_secs: i64, margin_secs: i64) -> bool {
        self.expires_at <= now_secs + margin_secs
    }
}

/// Result of a remote sign-up. The session is absent until the email is
/// confirmed, unless the project auto-confirms.
#[derive(Debug, Clone, PartialEq)]
pub struct SignUpOutcome {
    pub user: AuthUser,
    pub session: Option<Session>,
}

/// Which sessions a sign-out revokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignOutScope {
    #[default]
    Global,
    Local,
    Others,
}

impl SignOutScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignOutScope::Global => "global",
            SignOutScope::Local => "local",
            SignOutScope::Others => "others",
        }
    }
}

/// Kind of confirmation email to resend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResendKind {
    Signup,
    EmailChange,
}

impl ResendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResendKind::Signup => "signup",
            ResendKind::EmailChange => "email_change",
        }
    }
}

/// Remote auth service.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Register a new account with `metadata` as user metadata.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> ProviderResult<SignUpOutcome>;

    /// Password sign-in. The session becomes the provider's current session.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> ProviderResult<Session>;

    /// Passwordless sign-in. With `should_create_user = false` this doubles
    /// as an existence probe.
    async fn sign_in_with_otp(&self, email: &str, should_create_user: bool) -> ProviderResult<()>;

    /// Dedicated existence check. `None` means the service has no such endpoint.
    async fn check_email_exists(&self, _email: &str) -> ProviderResult<Option<bool>> {
        Ok(None)
    }

    /// Drop the locally held session, then revoke it remotely. The local
    /// copy is gone even when the remote call fails.
    async fn sign_out(&self, scope: SignOutScope) -> ProviderResult<()>;

    /// The current session, refreshed if it is about to expire.
    async fn get_session(&self) -> ProviderResult<Option<Session>>;

    /// Exchange the refresh token for a new session.
    async fn refresh_session(&self) -> ProviderResult<Session>;

    /// Fetch the current user from the service.
    async fn get_user(&self) -> ProviderResult<AuthUser>;

    /// Merge `metadata` into the current user's metadata.
    async fn update_user(&self, metadata: Value) -> ProviderResult<AuthUser>;

    /// Resend a confirmation email.
    async fn resend(&self, kind: ResendKind, email: &str) -> ProviderResult<()>;

    /// Drop any locally held session without contacting the service.
    fn clear_local_session(&self) {}
}
