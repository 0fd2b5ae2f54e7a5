//! Command errors and how they are shown.

use dashboard_config_and_utils::CoreError;
use dashboard_storage::StorageError;
use profile_reconciler::ReconcileError;
use thiserror::Error;
use ymir::AuthError;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Profile store error: {0}")]
    Store(#[from] profile_reconciler::StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Usage(String),
}

pub type CommandResult<T> = Result<T, CommandError>;

impl CommandError {
    fn auth_error(&self) -> Option<&AuthError> {
        match self {
            CommandError::Auth(e) => Some(e),
            CommandError::Reconcile(ReconcileError::Auth(e)) => Some(e),
            _ => None,
        }
    }

    /// Text printed to the terminal.
    pub fn user_message(&self) -> String {
        match self {
            CommandError::Auth(e) => e.user_message(),
            CommandError::Reconcile(e) => e.user_message(),
            other => other.to_string(),
        }
    }

    /// Whether local auth state should be reset before trying again.
    pub fn recommends_reset(&self) -> bool {
        matches!(
            self.auth_error(),
            Some(AuthError::RateLimited {
                is_critical: true,
                ..
            })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_rate_limit_recommends_reset() {
        let err = CommandError::from(AuthError::RateLimited {
            retry_after_ms: 64_000,
            is_critical: true,
            provider: None,
        });
        assert!(err.recommends_reset());

        let nested = CommandError::from(ReconcileError::Auth(AuthError::RateLimited {
            retry_after_ms: 1_000,
            is_critical: false,
            provider: None,
        }));
        assert!(!nested.recommends_reset());
    }

    #[test]
    fn test_usage_message_is_verbatim() {
        let err = CommandError::Usage("not signed in".to_string());
        assert_eq!(err.user_message(), "not signed in");
    }
}
