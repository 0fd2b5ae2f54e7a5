//! Error types for profile reconciliation.

use thiserror::Error;
use ymir::AuthError;

/// Failures talking to the profile store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Network or transport-level HTTP error from reqwest.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// PostgREST returned a non-success status.
    #[error("Supabase error: {status} - {message}")]
    Supabase { status: u16, message: String },

    /// A row with the same primary key already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// No signed-in session to authorize the request with.
    #[error("No session available for profile store request")]
    Unauthorized,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by [`crate::ProfileReconciler`].
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Profile store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The signed-in user is not the one being reconciled.
    #[error("Signed-in user {actual} does not match requested user {expected}")]
    UserMismatch { expected: String, actual: String },
}

impl ReconcileError {
    /// Message safe to show an end user.
    pub fn user_message(&self) -> String {
        match self {
            ReconcileError::Auth(e) => e.user_message(),
            ReconcileError::Store(_) => {
                "We couldn't save your profile right now. Please try again.".to_string()
            }
            ReconcileError::UserMismatch { .. } => {
                "You are signed in as a different user. Sign in again and retry.".to_string()
            }
        }
    }
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
