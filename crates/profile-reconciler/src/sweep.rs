//! Periodic profile recovery for the signed-in user.

use crate::error::ReconcileResult;
use crate::models::RecoveryReport;
use crate::reconciler::ProfileReconciler;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Background task that re-runs [`ProfileReconciler::recover`] on an interval.
pub struct ReconciliationSweep {
    reconciler: Arc<ProfileReconciler>,
    interval: Duration,
}

impl ReconciliationSweep {
    pub fn new(reconciler: Arc<ProfileReconciler>, interval: Duration) -> Self {
        Self {
            reconciler,
            interval,
        }
    }

    /// One pass. `None` when nobody eligible is signed in.
    pub async fn run_once(&self) -> ReconcileResult<Option<RecoveryReport>> {
        let Some(session) = self.reconciler.gateway().get_session(false).await? else {
            debug!("Sweep skipped, no session");
            return Ok(None);
        };
        if !self.reconciler.may_create_for(&session.user) {
            debug!(user_id = %session.user.id, "Sweep skipped, email not confirmed");
            return Ok(None);
        }

        self.reconciler.recover(&session.user.id).await.map(Some)
    }

    /// Start the loop. The first pass runs immediately.
    pub fn spawn(self) -> SweepHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = self.interval.as_secs(), "Reconciliation sweep started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.run_once().await {
                            Ok(Some(report)) if !report.is_noop() => {
                                info!(user_id = %report.user_id, "Sweep repaired profile");
                            }
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "Sweep pass failed"),
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Reconciliation sweep stopped");
        });

        SweepHandle { shutdown, task }
    }
}

/// Handle to a running sweep. Dropping it also stops the loop.
pub struct SweepHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweepHandle {
    /// Signal the loop and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Sweep task ended abnormally");
        }
    }
}
