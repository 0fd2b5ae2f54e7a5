//! Snapshot of the signed-in user, the shape UI callers consume.

use crate::app::state::AppState;
use profile_reconciler::ProfileView;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize)]
pub struct AuthContext {
    pub is_authenticated: bool,
    pub is_loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub email_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileView>,
}

impl AuthContext {
    /// State before anything has been loaded.
    pub fn loading() -> Self {
        Self {
            is_loading: true,
            ..Default::default()
        }
    }

    /// Load the session and, when signed in, the profile view.
    ///
    /// Failures degrade to a signed-out or profile-less snapshot.
    pub async fn load(state: &AppState) -> Self {
        let mut context = Self::loading();

        let session = match state.gateway.get_session(false).await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Could not load session for auth context");
                None
            }
        };

        if let Some(session) = session {
            context.is_authenticated = true;
            context.user_id = Some(session.user.id.clone());
            context.email = session.user.email.clone();
            context.email_verified = session.user.is_verified();
            context.profile = match state.reconciler.load_profile_view(&session).await {
                Ok(view) => Some(view),
                Err(e) => {
                    warn!(user_id = %session.user.id, error = %e, "Could not load profile");
                    None
                }
            };
        }

        context.is_loading = false;
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashboard_config_and_utils::{Config, Paths};
    use tempfile::tempdir;
    use ymir::{RegistrationPayload, SignUpRequest};

    fn ephemeral_state() -> (AppState, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let state = AppState::build(
            Config::default(),
            &Paths::with_base_dir(dir.path().to_path_buf()),
            true,
        )
        .unwrap();
        (state, dir)
    }

    #[tokio::test]
    async fn test_signed_out_context() {
        let (state, _dir) = ephemeral_state();
        let context = AuthContext::load(&state).await;

        assert!(!context.is_authenticated);
        assert!(!context.is_loading);
        assert!(context.profile.is_none());
    }

    #[tokio::test]
    async fn test_signed_in_context_carries_profile() {
        let (state, _dir) = ephemeral_state();
        let outcome = state
            .gateway
            .sign_up(SignUpRequest {
                email: "ctx@x.com".to_string(),
                password: "secret-pw".to_string(),
                registration: RegistrationPayload {
                    full_name: Some("Ctx User".to_string()),
                    ..Default::default()
                },
                email_prechecked: false,
            })
            .await
            .unwrap();
        state
            .reconciler
            .ensure_profile(&outcome.user)
            .await
            .unwrap();

        let context = AuthContext::load(&state).await;
        assert!(context.is_authenticated);
        assert!(context.email_verified);
        assert_eq!(context.email.as_deref(), Some("ctx@x.com"));
        let profile = context.profile.unwrap().profile.unwrap();
        assert_eq!(profile.full_name.as_deref(), Some("Ctx User"));
    }
}
