//! Email verification polling.
//!
//! The updater is triggered from the outside (page focus, `dashboard verify`)
//! and decides whether a remote refresh is allowed right now. It never makes
//! more than one refresh per cooldown window, backs off on failures, and stops
//! calling the service after [`MAX_REFRESH_ATTEMPTS`] consecutive failures
//! until [`VerificationStatusUpdater::reset_attempts`] is called.
//!
//! ## State Diagram
//!
//! ```text
//!      RefreshDeferred / RefreshFailed / SignedOut / Unconfirmed
//!                     ┌──────────┐
//!                     ▼          │
//! ┌─────────────────────────┐    │
//! │       Unverified        │────┘ (initial)
//! └────────────┬────────────┘
//!              │ Confirmed
//!              ▼
//! ┌─────────────────────────┐
//! │        Verified         │──── SignedOut / Unconfirmed ──► Unverified
//! └─────────────────────────┘
//! ```

use crate::clock::{Clock, SystemClock};
use crate::error::AuthError;
use crate::gateway::AuthGateway;
use crate::rate_limit::OperationClass;
use rust_fsm::*;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Consecutive failed refreshes after which the updater stops calling out.
pub const MAX_REFRESH_ATTEMPTS: u32 = 2;

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub verification_machine(Unverified)

    Unverified => {
        Confirmed => Verified,
        Unconfirmed => Unverified,
        RefreshDeferred => Unverified,
        RefreshFailed => Unverified,
        SignedOut => Unverified
    },
    Verified => {
        Confirmed => Verified,
        Unconfirmed => Unverified,
        SignedOut => Unverified
    }
}

pub use verification_machine::Input as VerificationMachineInput;
pub use verification_machine::State as VerificationMachineState;
pub use verification_machine::StateMachine as VerificationMachine;

/// Timing for verification refreshes.
#[derive(Debug, Clone)]
pub struct VerificationConfig {
    /// Minimum spacing between attempts.
    pub cooldown: Duration,
    pub max_attempts: u32,
    pub attempt_base_delay_ms: u64,
    pub attempt_max_delay_ms: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(30),
            max_attempts: MAX_REFRESH_ATTEMPTS,
            attempt_base_delay_ms: 1_000,
            attempt_max_delay_ms: 120_000,
        }
    }
}

impl VerificationConfig {
    /// Required wait after `attempts` consecutive failures.
    pub fn delay_for_attempts(&self, attempts: u32) -> u64 {
        self.attempt_base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempts))
            .min(self.attempt_max_delay_ms)
    }
}

/// Why a refresh did or did not reach the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStatus {
    /// The current session was already verified.
    AlreadyVerified,
    /// A remote refresh completed.
    Refreshed,
    /// Called again within the cooldown window.
    CoolingDown,
    /// Waiting out attempt backoff or a token-refresh rate limit.
    BackingOff,
    /// Too many consecutive failures; waiting for a manual reset.
    AttemptsExhausted,
    /// The service throttled the refresh.
    RateLimited { backoff_ms: u64, is_critical: bool },
    /// No session to verify.
    NoSession,
    /// Any other failure.
    Failed,
}

/// Result of [`VerificationStatusUpdater::refresh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOutcome {
    /// Best-known verification flag.
    pub verified: bool,
    pub status: VerificationStatus,
}

#[derive(Debug, Default)]
struct RefreshState {
    attempts: u32,
    last_attempt_ms: Option<u64>,
    last_known_verified: bool,
}

pub struct VerificationStatusUpdater {
    gateway: Arc<AuthGateway>,
    clock: Arc<dyn Clock>,
    config: VerificationConfig,
    state: Mutex<RefreshState>,
    fsm: Mutex<VerificationMachine>,
}

impl VerificationStatusUpdater {
    pub fn new(gateway: Arc<AuthGateway>) -> Self {
        Self::with_config(gateway, Arc::new(SystemClock), VerificationConfig::default())
    }

    pub fn with_config(
        gateway: Arc<AuthGateway>,
        clock: Arc<dyn Clock>,
        config: VerificationConfig,
    ) -> Self {
        Self {
            gateway,
            clock,
            config,
            state: Mutex::new(RefreshState::default()),
            fsm: Mutex::new(VerificationMachine::new()),
        }
    }

    fn refresh_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, input: VerificationMachineInput) {
        let mut fsm = self.fsm.lock().unwrap_or_else(|e| e.into_inner());
        let old_state = fsm.state().clone();
        if fsm.consume(&input).is_err() {
            debug!(state = ?old_state, input = ?input, "Ignoring verification input");
            return;
        }
        if *fsm.state() != old_state {
            debug!(old_state = ?old_state, new_state = ?fsm.state(), "Verification state transition");
        }
    }

    /// Current FSM state.
    pub fn state(&self) -> VerificationMachineState {
        self.fsm
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .state()
            .clone()
    }

    /// Last known verification flag.
    pub fn is_verified(&self) -> bool {
        self.refresh_state().last_known_verified
    }

    /// Consecutive failed refreshes.
    pub fn attempts(&self) -> u32 {
        self.refresh_state().attempts
    }

    fn skipped(&self, status: VerificationStatus) -> VerificationOutcome {
        debug!(status = ?status, "Verification refresh skipped");
        self.transition(VerificationMachineInput::RefreshDeferred);
        VerificationOutcome {
            verified: self.is_verified(),
            status,
        }
    }

    /// Check whether the user's email has been confirmed, refreshing the
    /// session if the cooldown and backoff rules allow it.
    pub async fn refresh(&self) -> VerificationOutcome {
        let now = self.clock.now_ms();
        {
            let mut state = self.refresh_state();
            let since_last = state.last_attempt_ms.map(|last| now.saturating_sub(last));

            if since_last.is_some_and(|elapsed| u128::from(elapsed) < self.config.cooldown.as_millis()) {
                drop(state);
                return self.skipped(VerificationStatus::CoolingDown);
            }
            if state.attempts >= self.config.max_attempts {
                drop(state);
                return self.skipped(VerificationStatus::AttemptsExhausted);
            }
            if state.attempts > 0
                && since_last.is_some_and(|elapsed| {
                    elapsed < self.config.delay_for_attempts(state.attempts)
                })
            {
                drop(state);
                return self.skipped(VerificationStatus::BackingOff);
            }
            if self
                .gateway
                .tracker()
                .is_limited(OperationClass::TokenRefresh)
            {
                drop(state);
                return self.skipped(VerificationStatus::BackingOff);
            }

            state.last_attempt_ms = Some(now);
        }

        let before = match self.gateway.get_session(false).await {
            Ok(Some(session)) => session.user.is_verified(),
            Ok(None) => {
                self.refresh_state().last_known_verified = false;
                self.transition(VerificationMachineInput::SignedOut);
                return VerificationOutcome {
                    verified: false,
                    status: VerificationStatus::NoSession,
                };
            }
            Err(e) => return self.record_failure(e, self.is_verified()),
        };

        if before {
            self.record_verified(true);
            return VerificationOutcome {
                verified: true,
                status: VerificationStatus::AlreadyVerified,
            };
        }

        match self.gateway.refresh_session().await {
            Ok(session) => {
                let verified = session.user.is_verified();
                self.record_verified(verified);
                if verified {
                    info!(user_id = %session.user.id, "Email verification confirmed");
                }
                VerificationOutcome {
                    verified,
                    status: VerificationStatus::Refreshed,
                }
            }
            Err(e) => self.record_failure(e, before),
        }
    }

    fn record_verified(&self, verified: bool) {
        {
            let mut state = self.refresh_state();
            state.attempts = 0;
            state.last_known_verified = verified;
        }
        self.transition(if verified {
            VerificationMachineInput::Confirmed
        } else {
            VerificationMachineInput::Unconfirmed
        });
    }

    fn record_failure(&self, error: AuthError, verified: bool) -> VerificationOutcome {
        let attempts = {
            let mut state = self.refresh_state();
            state.attempts = state.attempts.saturating_add(1);
            state.attempts
        };
        self.transition(VerificationMachineInput::RefreshFailed);

        let status = match error {
            AuthError::RateLimited {
                retry_after_ms,
                is_critical,
                ..
            } => {
                debug!(attempts, retry_after_ms, "Verification refresh throttled");
                VerificationStatus::RateLimited {
                    backoff_ms: retry_after_ms,
                    is_critical,
                }
            }
            other => {
                warn!(attempts, error = %other, "Verification refresh failed");
                VerificationStatus::Failed
            }
        };

        VerificationOutcome { verified, status }
    }

    /// Zero the attempt counter and the cooldown stamp.
    pub fn reset_attempts(&self) {
        let mut state = self.refresh_state();
        state.attempts = 0;
        state.last_attempt_ms = None;
    }

    /// Forget everything about the previous user.
    pub fn mark_signed_out(&self) {
        {
            let mut state = self.refresh_state();
            *state = RefreshState::default();
        }
        self.transition(VerificationMachineInput::SignedOut);
    }
}
