//! TTL-bounded session snapshot.
//!
//! One snapshot lives under [`StorageKeys::SESSION_CACHE`]. It is overwritten
//! on every fresh fetch and removed on sign-out or explicit reset. Storage
//! failures never reach the caller.

use crate::clock::{Clock, SystemClock};
use crate::provider::{AuthProvider, ProviderResult, Session};
use dashboard_storage::{SecureStorage, StorageKeys};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default snapshot lifetime.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(5 * 60);

/// Persisted session plus the time it was captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session: Session,
    pub captured_at_ms: u64,
}

pub struct SessionCache {
    storage: Arc<dyn SecureStorage>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl SessionCache {
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self::with_clock(storage, Arc::new(SystemClock), DEFAULT_SESSION_TTL)
    }

    pub fn with_clock(storage: Arc<dyn SecureStorage>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            storage,
            clock,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached session while fresh, otherwise fetch from `provider`
    /// and cache the result. `bypass` always fetches.
    pub async fn read(
        &self,
        provider: &dyn AuthProvider,
        bypass: bool,
    ) -> ProviderResult<Option<Session>> {
        if !bypass {
            if let Some(snapshot) = self.peek() {
                debug!(user_id = %snapshot.session.user.id, "Session served from cache");
                return Ok(Some(snapshot.session));
            }
        }

        let fetched = provider.get_session().await?;
        match &fetched {
            Some(session) => self.store(session),
            None => self.invalidate(),
        }
        Ok(fetched)
    }

    /// The snapshot if present and younger than the TTL.
    pub fn peek(&self) -> Option<SessionSnapshot> {
        let raw = match self.storage.get(StorageKeys::SESSION_CACHE) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read session cache");
                return None;
            }
        };

        let snapshot: SessionSnapshot = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable session cache");
                self.invalidate();
                return None;
            }
        };

        let age_ms = self.clock.now_ms().saturating_sub(snapshot.captured_at_ms);
        if u128::from(age_ms) < self.ttl.as_millis() {
            Some(snapshot)
        } else {
            None
        }
    }

    /// Overwrite the snapshot with `session`, stamped now.
    pub fn store(&self, session: &Session) {
        let snapshot = SessionSnapshot {
            session: session.clone(),
            captured_at_ms: self.clock.now_ms(),
        };

        let encoded = match serde_json::to_string(&snapshot) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "Failed to serialize session snapshot");
                return;
            }
        };

        if let Err(e) = self.storage.set(StorageKeys::SESSION_CACHE, &encoded) {
            warn!(error = %e, "Failed to write session cache");
        }
    }

    /// Remove the snapshot.
    pub fn invalidate(&self) {
        if let Err(e) = self.storage.delete(StorageKeys::SESSION_CACHE) {
            warn!(error = %e, "Failed to clear session cache");
        }
    }
}
