//! Mapping of remote auth errors onto [`AuthError`].
//!
//! The service reports most conditions only through message text, so the
//! substring checks live here and nowhere else.

use crate::error::AuthError;
use crate::provider::{ProviderError, ProviderResult, SESSION_NOT_FOUND_CODE};

/// Messages the service returns for an OTP probe against an unknown email.
const NOT_FOUND_MARKERS: &[&str] = &[
    "not found",
    "user not found",
    "signups not allowed",
    "no user",
];

/// What an existence probe says about an email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    Exists,
    NotFound,
    /// Throttled; the probe says nothing either way.
    Inconclusive,
}

/// Interpret the result of `sign_in_with_otp(email, should_create_user = false)`.
///
/// The service only creates no user and sends no mail when the account is
/// unknown, so anything other than a not-found style failure means the
/// account exists.
pub fn probe_indicates_account(result: &ProviderResult<()>) -> ProbeVerdict {
    match result {
        Ok(()) => ProbeVerdict::Exists,
        Err(e) if e.is_rate_limited() => ProbeVerdict::Inconclusive,
        Err(e) if e.has_code("user_not_found") || e.has_code("otp_disabled") => {
            ProbeVerdict::NotFound
        }
        Err(e) if NOT_FOUND_MARKERS.iter().any(|m| e.message_contains(m)) => {
            ProbeVerdict::NotFound
        }
        Err(_) => ProbeVerdict::Exists,
    }
}

/// Remote operation an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    SignUp,
    SignIn,
    Other,
}

pub(crate) fn is_duplicate_email(e: &ProviderError) -> bool {
    e.has_code("user_already_exists")
        || e.has_code("email_exists")
        || e.message_contains("already registered")
        || e.message_contains("already been registered")
        || e.message_contains("already exists")
}

fn is_weak_password(e: &ProviderError) -> bool {
    e.has_code("weak_password")
        || e.message_contains("weak password")
        || e.message_contains("password should be")
        || e.message_contains("password is too short")
}

fn is_invalid_credentials(e: &ProviderError) -> bool {
    e.has_code("invalid_credentials")
        || e.message_contains("invalid login credentials")
        || e.message_contains("invalid credentials")
}

fn is_email_not_confirmed(e: &ProviderError) -> bool {
    e.has_code("email_not_confirmed") || e.message_contains("email not confirmed")
}

fn is_session_missing(e: &ProviderError) -> bool {
    e.has_code(SESSION_NOT_FOUND_CODE) || e.message_contains("session missing")
}

/// Classify a non-throttling error. Rate limits are handled by the caller,
/// which owns the tracker.
pub(crate) fn classify(op: Operation, e: ProviderError) -> AuthError {
    match op {
        Operation::SignUp if is_duplicate_email(&e) => {
            AuthError::EmailAlreadyRegistered { provider: Some(e) }
        }
        Operation::SignUp if is_weak_password(&e) => AuthError::WeakPassword(e),
        Operation::SignIn if is_email_not_confirmed(&e) => AuthError::EmailNotConfirmed(e),
        Operation::SignIn if is_invalid_credentials(&e) => AuthError::InvalidCredentials(e),
        _ if is_session_missing(&e) => AuthError::NotLoggedIn,
        _ => AuthError::Provider(e),
    }
}
