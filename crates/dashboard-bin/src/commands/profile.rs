//! Profile and reconciliation commands.

use crate::app::{AppState, AuthContext, CommandError, CommandResult};
use crate::commands::{print_json, RegistrationArgs};
use profile_reconciler::{EnsureOutcome, ReconciliationSweep};
use serde_json::json;
use std::time::Duration;
use tracing::info;

pub async fn complete(state: &AppState, registration: RegistrationArgs) -> CommandResult<()> {
    let outcome = state
        .reconciler
        .complete_profile(registration.into())
        .await?;
    match outcome {
        EnsureOutcome::Created {
            goals,
            restrictions,
        } => println!(
            "Profile created with {} goal(s) and {} restriction(s).",
            goals, restrictions
        ),
        EnsureOutcome::AlreadyExists => println!("Profile updated."),
        EnsureOutcome::SkippedUnverified => {
            println!("Details saved. The profile will be created once your email is confirmed.")
        }
    }
    Ok(())
}

pub async fn recover(state: &AppState) -> CommandResult<()> {
    let Some(session) = state.gateway.get_session(false).await? else {
        return Err(CommandError::Usage(
            "Not signed in. Run `dashboard signin` first.".to_string(),
        ));
    };

    let report = state.reconciler.recover(&session.user.id).await?;
    print_json(&json!({
        "user_id": report.user_id,
        "created_profile": report.created_profile,
        "skipped_unverified": report.skipped_unverified,
        "backfilled_fields": report.backfilled_fields,
        "restored_goals": report.restored_goals,
        "restored_restrictions": report.restored_restrictions,
    }))
}

pub async fn show(state: &AppState) -> CommandResult<()> {
    print_json(&AuthContext::load(state).await)
}

/// Run one sweep pass, or keep sweeping until Ctrl-C.
pub async fn sweep(state: &AppState, once: bool) -> CommandResult<()> {
    let interval = Duration::from_secs(state.config.sweep_interval_secs.max(1));
    let sweep = ReconciliationSweep::new(state.reconciler.clone(), interval);

    if once {
        match sweep.run_once().await? {
            Some(report) if report.is_noop() => println!("Profile already consistent."),
            Some(report) => println!(
                "Repaired profile for {} ({} field(s), {} goal(s), {} restriction(s)).",
                report.user_id,
                report.backfilled_fields.len(),
                report.restored_goals,
                report.restored_restrictions
            ),
            None => println!("Nothing to sweep: no verified user signed in."),
        }
        return Ok(());
    }

    let handle = sweep.spawn();
    println!(
        "Sweeping every {}s. Press Ctrl-C to stop.",
        interval.as_secs()
    );
    let signal = tokio::signal::ctrl_c().await;
    handle.stop().await;
    if let Err(e) = signal {
        return Err(CommandError::Usage(format!("Could not listen for Ctrl-C: {}", e)));
    }
    info!("Sweep stopped by user");
    Ok(())
}
