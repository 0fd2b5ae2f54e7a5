//! Per-operation rate-limit bookkeeping.
//!
//! Each [`OperationClass`] keeps a consecutive-hit counter. Recording a hit
//! computes an exponential backoff with jitter, capped at a hard ceiling;
//! checking whether a class is limited doubles as lazy expiry.

use crate::clock::{Clock, JitterSource, RandomJitter, SystemClock};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Guarded remote-call category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationClass {
    TokenRefresh,
    AuthRequest,
    General,
}

impl OperationClass {
    pub const ALL: [OperationClass; 3] = [
        OperationClass::TokenRefresh,
        OperationClass::AuthRequest,
        OperationClass::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationClass::TokenRefresh => "token_refresh",
            OperationClass::AuthRequest => "auth_request",
            OperationClass::General => "general",
        }
    }
}

/// Counters for one operation class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitState {
    pub count: u32,
    pub last_hit_ms: Option<u64>,
    pub next_allowed_ms: Option<u64>,
}

/// What a recorded hit means for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffDecision {
    pub backoff_ms: u64,
    /// Enough consecutive hits that a full local reset is worth suggesting.
    pub is_critical: bool,
    pub hit_count: u32,
}

/// Backoff parameters.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base_delay_ms: u64,
    pub growth_factor: u64,
    pub max_delay_ms: u64,
    /// Jitter is drawn from `[0, max_jitter_ms)`.
    pub max_jitter_ms: u64,
    /// Hits further apart than this start a fresh streak.
    pub idle_reset_ms: u64,
    pub critical_threshold: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            growth_factor: 2,
            max_delay_ms: 120_000,
            max_jitter_ms: 1_000,
            idle_reset_ms: 60_000,
            critical_threshold: 5,
        }
    }
}

impl BackoffPolicy {
    /// `min(max_delay - max_jitter, base * growth^hit_count) + jitter`.
    ///
    /// The exponential term is capped before jitter is added, so callers at
    /// the ceiling still spread out while never waiting past `max_delay_ms`.
    pub fn delay_for_hit(&self, hit_count: u32, jitter_ms: u64) -> u64 {
        let factor = self.growth_factor.saturating_pow(hit_count);
        let ceiling = self.max_delay_ms.saturating_sub(self.max_jitter_ms);
        self.base_delay_ms
            .saturating_mul(factor)
            .min(ceiling)
            .saturating_add(jitter_ms.min(self.max_jitter_ms))
    }
}

/// Shared throttling state for every guarded remote call in the process.
pub struct RateLimitTracker {
    policy: BackoffPolicy,
    clock: Arc<dyn Clock>,
    jitter: Arc<dyn JitterSource>,
    states: Mutex<HashMap<OperationClass, RateLimitState>>,
}

impl Default for RateLimitTracker {
    fn default() -> Self {
        Self::new(
            BackoffPolicy::default(),
            Arc::new(SystemClock),
            Arc::new(RandomJitter),
        )
    }
}

impl RateLimitTracker {
    pub fn new(
        policy: BackoffPolicy,
        clock: Arc<dyn Clock>,
        jitter: Arc<dyn JitterSource>,
    ) -> Self {
        Self {
            policy,
            clock,
            jitter,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    fn states(&self) -> MutexGuard<'_, HashMap<OperationClass, RateLimitState>> {
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// True while the class is inside its backoff window. Once the window
    /// has passed the class is reset as a side effect.
    pub fn is_limited(&self, class: OperationClass) -> bool {
        let now = self.clock.now_ms();
        let mut states = self.states();

        let Some(next_allowed) = states.get(&class).and_then(|s| s.next_allowed_ms) else {
            return false;
        };

        if next_allowed > now {
            return true;
        }

        debug!(class = class.as_str(), "Backoff window elapsed, clearing state");
        states.insert(class, RateLimitState::default());
        false
    }

    /// Record a throttling response for `class`.
    pub fn record_hit(&self, class: OperationClass) -> BackoffDecision {
        let now = self.clock.now_ms();
        let mut states = self.states();
        let state = states.entry(class).or_default();

        let idle = state
            .last_hit_ms
            .is_some_and(|last| now.saturating_sub(last) > self.policy.idle_reset_ms);
        if idle {
            state.count = 0;
        }

        state.count = state.count.saturating_add(1);
        state.last_hit_ms = Some(now);

        let jitter = self.jitter.jitter_ms(self.policy.max_jitter_ms);
        let backoff_ms = self.policy.delay_for_hit(state.count, jitter);
        state.next_allowed_ms = Some(now.saturating_add(backoff_ms));

        let decision = BackoffDecision {
            backoff_ms,
            is_critical: state.count >= self.policy.critical_threshold,
            hit_count: state.count,
        };

        if decision.is_critical {
            warn!(
                class = class.as_str(),
                hit_count = decision.hit_count,
                backoff_ms,
                "Repeated rate limiting"
            );
        } else {
            debug!(
                class = class.as_str(),
                hit_count = decision.hit_count,
                backoff_ms,
                "Rate limit hit recorded"
            );
        }

        decision
    }

    /// Remaining wait for `class` in milliseconds (0 when not limited).
    pub fn retry_after_ms(&self, class: OperationClass) -> u64 {
        let now = self.clock.now_ms();
        self.states()
            .get(&class)
            .and_then(|s| s.next_allowed_ms)
            .map(|next| next.saturating_sub(now))
            .unwrap_or(0)
    }

    /// Consecutive hits currently counted for `class`.
    pub fn hit_count(&self, class: OperationClass) -> u32 {
        self.states().get(&class).map(|s| s.count).unwrap_or(0)
    }

    /// Whether the current streak for `class` has reached the critical threshold.
    pub fn is_critical(&self, class: OperationClass) -> bool {
        self.hit_count(class) >= self.policy.critical_threshold
    }

    /// Snapshot of the state for `class`.
    pub fn state(&self, class: OperationClass) -> RateLimitState {
        self.states().get(&class).cloned().unwrap_or_default()
    }

    /// Clear state for `class`.
    pub fn reset(&self, class: OperationClass) {
        self.states().remove(&class);
    }

    /// Clear every class.
    pub fn reset_all(&self) {
        self.states().clear();
    }
}
