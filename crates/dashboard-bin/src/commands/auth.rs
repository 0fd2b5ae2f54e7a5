//! Sign-up, sign-in and session commands.

use crate::app::{AppState, CommandError, CommandResult};
use crate::commands::{print_json, RegistrationArgs};
use profile_reconciler::EnsureOutcome;
use serde_json::json;
use std::time::Duration;
use tracing::info;
use ymir::{Session, SignUpRequest, VerificationStatus};

fn session_summary(session: &Session) -> serde_json::Value {
    json!({
        "user_id": session.user.id,
        "email": session.user.email,
        "email_verified": session.user.is_verified(),
        "expires_at": session.expires_at,
    })
}

pub async fn sign_up(
    state: &AppState,
    email: String,
    password: String,
    registration: RegistrationArgs,
    skip_check: bool,
) -> CommandResult<()> {
    let outcome = state
        .gateway
        .sign_up(SignUpRequest {
            email,
            password,
            registration: registration.into(),
            email_prechecked: skip_check,
        })
        .await?;

    match &outcome.session {
        Some(session) => {
            let ensured = state.reconciler.ensure_profile(&session.user).await?;
            info!(user_id = %session.user.id, outcome = ?ensured, "Signed up and signed in");
            println!("Account created and signed in.");
        }
        None => {
            println!("Account created. Check your inbox to confirm your email, then run `dashboard verify`.");
        }
    }
    print_json(&json!({ "user_id": outcome.user.id, "email": outcome.user.email }))
}

pub async fn sign_in(state: &AppState, email: String, password: String) -> CommandResult<()> {
    let session = state.gateway.sign_in(&email, &password).await?;
    let ensured = state.reconciler.ensure_profile(&session.user).await?;
    if ensured == EnsureOutcome::SkippedUnverified {
        println!("Signed in. Your profile will be created once your email is confirmed.");
    } else {
        println!("Signed in.");
    }
    print_json(&session_summary(&session))
}

pub async fn sign_out(state: &AppState) -> CommandResult<()> {
    let remote_ok = state.gateway.sign_out().await;
    state.verification.mark_signed_out();
    if remote_ok {
        println!("Signed out.");
    } else {
        println!("Signed out locally. The server could not be reached to end the session.");
    }
    Ok(())
}

pub async fn session(state: &AppState, refresh: bool) -> CommandResult<()> {
    let session = if refresh {
        Some(state.gateway.refresh_session().await?)
    } else {
        state.gateway.get_session(false).await?
    };

    match session {
        Some(session) => print_json(&session_summary(&session)),
        None => {
            println!("Not signed in.");
            Ok(())
        }
    }
}

/// Check verification once, or poll until confirmed with `watch`.
pub async fn verify(state: &AppState, watch: bool, interval_secs: u64) -> CommandResult<()> {
    loop {
        let outcome = state.verification.refresh().await;

        match &outcome.status {
            VerificationStatus::NoSession => {
                return Err(CommandError::Usage(
                    "Not signed in. Run `dashboard signin` first.".to_string(),
                ))
            }
            VerificationStatus::AttemptsExhausted => {
                println!("Stopped checking after repeated failures. Run `dashboard reset` and sign in again.");
                return Ok(());
            }
            VerificationStatus::RateLimited {
                backoff_ms,
                is_critical,
            } => {
                println!("Rate limited, next check in {}s.", backoff_ms.div_ceil(1000));
                if *is_critical {
                    println!("If this keeps happening, run `dashboard reset`.");
                }
            }
            _ => {}
        }

        if outcome.verified {
            println!("Email confirmed.");
            if let Some(session) = state.gateway.get_session(false).await? {
                let ensured = state.reconciler.ensure_profile(&session.user).await?;
                info!(user_id = %session.user.id, outcome = ?ensured, "Profile ensured after verification");
            }
            return Ok(());
        }

        if !watch {
            println!("Email not confirmed yet ({:?}).", outcome.status);
            return Ok(());
        }
        tokio::time::sleep(Duration::from_secs(interval_secs.max(1))).await;
    }
}

pub async fn resend(state: &AppState, email: String) -> CommandResult<()> {
    state.gateway.resend_verification_email(&email).await?;
    println!("Confirmation email sent to {}.", email.trim());
    Ok(())
}

pub fn reset(state: &AppState) -> CommandResult<()> {
    state.gateway.reset_auth_state();
    state.verification.mark_signed_out();
    println!("Local auth state cleared. Sign in again to continue.");
    Ok(())
}
