//! Authentication façade.
//!
//! Every entry point validates locally, consults the [`RateLimitTracker`],
//! talks to the [`AuthProvider`] and maps failures onto [`AuthError`]. Remote
//! failures are logged and returned, never panicked on.

use crate::classify::{classify, probe_indicates_account, Operation, ProbeVerdict};
use crate::error::{AuthError, AuthResult};
use crate::provider::{
    AuthProvider, AuthUser, ProviderError, ResendKind, Session, SignOutScope, SignUpOutcome,
};
use crate::rate_limit::{OperationClass, RateLimitTracker};
use crate::registration::RegistrationPayload;
use crate::session_cache::SessionCache;
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

static EMAIL_RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

/// `local@domain.tld` shape check.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE
        .get_or_init(|| Regex::new(EMAIL_PATTERN))
        .as_ref()
        .is_ok_and(|re| re.is_match(email))
}

fn validate_email(email: &str) -> AuthResult<String> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AuthError::Validation("Email is required.".to_string()));
    }
    if !is_valid_email(email) {
        return Err(AuthError::Validation(
            "Please enter a valid email address.".to_string(),
        ));
    }
    Ok(email.to_string())
}

fn validate_password(password: &str) -> AuthResult<()> {
    if password.is_empty() {
        return Err(AuthError::Validation("Password is required.".to_string()));
    }
    Ok(())
}

/// Sign-up form submission.
#[derive(Debug, Clone, Default)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub registration: RegistrationPayload,
    /// The caller already ran the existence check.
    pub email_prechecked: bool,
}

pub struct AuthGateway {
    provider: Arc<dyn AuthProvider>,
    cache: Arc<SessionCache>,
    tracker: Arc<RateLimitTracker>,
}

impl AuthGateway {
    pub fn new(
        provider: Arc<dyn AuthProvider>,
        cache: Arc<SessionCache>,
        tracker: Arc<RateLimitTracker>,
    ) -> Self {
        Self {
            provider,
            cache,
            tracker,
        }
    }

    pub fn provider(&self) -> &Arc<dyn AuthProvider> {
        &self.provider
    }

    pub fn cache(&self) -> &Arc<SessionCache> {
        &self.cache
    }

    pub fn tracker(&self) -> &Arc<RateLimitTracker> {
        &self.tracker
    }

    /// Refuse locally while `class` is backing off.
    fn guard(&self, class: OperationClass) -> AuthResult<()> {
        if !self.tracker.is_limited(class) {
            return Ok(());
        }
        let retry_after_ms = self.tracker.retry_after_ms(class);
        debug!(class = class.as_str(), retry_after_ms, "Call blocked by local backoff");
        Err(AuthError::RateLimited {
            retry_after_ms,
            is_critical: self.tracker.is_critical(class),
            provider: None,
        })
    }

    fn throttled(&self, class: OperationClass, error: ProviderError) -> AuthError {
        let decision = self.tracker.record_hit(class);
        warn!(
            class = class.as_str(),
            backoff_ms = decision.backoff_ms,
            hit_count = decision.hit_count,
            error = %error,
            "Auth service throttled request"
        );
        AuthError::RateLimited {
            retry_after_ms: decision.backoff_ms,
            is_critical: decision.is_critical,
            provider: Some(error),
        }
    }

    fn map_error(&self, class: OperationClass, op: Operation, error: ProviderError) -> AuthError {
        if error.is_rate_limited() {
            return self.throttled(class, error);
        }
        let mapped = classify(op, error);
        debug!(error = %mapped, "Auth call failed");
        mapped
    }

    /// Drop the cached snapshot and any locally held session.
    fn clear_local_artifacts(&self) {
        self.cache.invalidate();
        self.provider.clear_local_session();
    }

    /// Whether an account exists for `email`.
    ///
    /// Uses the service's dedicated check when it has one, otherwise a
    /// passwordless sign-in probe that never creates a user. A throttled
    /// probe is recorded and treated as "unknown", which lets sign-up proceed.
    pub async fn email_exists(&self, email: &str) -> AuthResult<bool> {
        match self.provider.check_email_exists(email).await {
            Ok(Some(exists)) => return Ok(exists),
            Ok(None) => {}
            Err(e) if e.is_rate_limited() => {
                return Err(self.throttled(OperationClass::AuthRequest, e))
            }
            Err(e) => warn!(error = %e, "Email check endpoint failed, falling back to probe"),
        }

        let probe = self.provider.sign_in_with_otp(email, false).await;
        match probe_indicates_account(&probe) {
            ProbeVerdict::Exists => Ok(true),
            ProbeVerdict::NotFound => Ok(false),
            ProbeVerdict::Inconclusive => {
                if let Err(e) = probe {
                    self.tracker.record_hit(OperationClass::AuthRequest);
                    warn!(error = %e, "Existence probe throttled, proceeding without it");
                }
                Ok(false)
            }
        }
    }

    pub async fn sign_up(&self, request: SignUpRequest) -> AuthResult<SignUpOutcome> {
        let email = validate_email(&request.email)?;
        validate_password(&request.password)?;
        self.guard(OperationClass::AuthRequest)?;

        if !request.email_prechecked && self.email_exists(&email).await? {
            info!(email = %email, "Sign-up blocked, account already exists");
            return Err(AuthError::EmailAlreadyRegistered { provider: None });
        }

        let metadata = request.registration.to_metadata();

        self.cache.invalidate();
        if let Err(e) = self.provider.sign_out(SignOutScope::Local).await {
            debug!(error = %e, "Ignoring failed sign-out of lingering session");
        }

        let outcome = self
            .provider
            .sign_up(&email, &request.password, metadata)
            .await
            .map_err(|e| self.map_error(OperationClass::AuthRequest, Operation::SignUp, e))?;

        if let Some(session) = outcome.session.as_ref() {
            self.cache.store(session);
        }

        info!(
            user_id = %outcome.user.id,
            awaiting_confirmation = outcome.session.is_none(),
            "Sign-up succeeded"
        );
        Ok(outcome)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Session> {
        let email = validate_email(email)?;
        validate_password(password)?;
        self.guard(OperationClass::AuthRequest)?;

        self.clear_local_artifacts();

        let session = self
            .provider
            .sign_in_with_password(&email, password)
            .await
            .map_err(|e| self.map_error(OperationClass::AuthRequest, Operation::SignIn, e))?;

        self.cache.store(&session);
        info!(user_id = %session.user.id, "Sign-in succeeded");
        Ok(session)
    }

    /// Local state is cleared before the remote call, so a failing service
    /// never leaves a stale session behind. The provider drops its stored
    /// session itself, after reading the token it needs for revocation.
    /// Returns false if the remote sign-out failed.
    pub async fn sign_out(&self) -> bool {
        self.cache.invalidate();

        match self.provider.sign_out(SignOutScope::Global).await {
            Ok(()) => {
                info!("Signed out");
                true
            }
            Err(e) => {
                warn!(error = %e, "Remote sign-out failed, local session already cleared");
                false
            }
        }
    }

    /// Current session, served from the cache while fresh.
    pub async fn get_session(&self, bypass_cache: bool) -> AuthResult<Option<Session>> {
        if !bypass_cache {
            if let Some(snapshot) = self.cache.peek() {
                return Ok(Some(snapshot.session));
            }
        }

        self.guard(OperationClass::TokenRefresh)?;
        self.cache
            .read(self.provider.as_ref(), true)
            .await
            .map_err(|e| self.map_error(OperationClass::TokenRefresh, Operation::Other, e))
    }

    /// Exchange the refresh token and update the cache.
    pub async fn refresh_session(&self) -> AuthResult<Session> {
        self.guard(OperationClass::TokenRefresh)?;

        let session = self
            .provider
            .refresh_session()
            .await
            .map_err(|e| self.map_error(OperationClass::TokenRefresh, Operation::Other, e))?;

        self.cache.store(&session);
        debug!(user_id = %session.user.id, "Session refreshed");
        Ok(session)
    }

    /// Fetch the user straight from the service, skipping the cache.
    pub async fn current_user(&self) -> AuthResult<AuthUser> {
        self.guard(OperationClass::General)?;
        self.provider
            .get_user()
            .await
            .map_err(|e| self.map_error(OperationClass::General, Operation::Other, e))
    }

    /// Merge `metadata` into the remote user record.
    pub async fn update_user_metadata(&self, metadata: Value) -> AuthResult<AuthUser> {
        self.guard(OperationClass::General)?;
        let user = self
            .provider
            .update_user(metadata)
            .await
            .map_err(|e| self.map_error(OperationClass::General, Operation::Other, e))?;

        // The cached snapshot now carries stale metadata.
        self.cache.invalidate();
        Ok(user)
    }

    pub async fn resend_verification_email(&self, email: &str) -> AuthResult<()> {
        let email = validate_email(email)?;
        self.guard(OperationClass::AuthRequest)?;

        self.provider
            .resend(ResendKind::Signup, &email)
            .await
            .map_err(|e| self.map_error(OperationClass::AuthRequest, Operation::Other, e))?;

        info!(email = %email, "Verification email resent");
        Ok(())
    }

    /// Manual recovery: drop the cache, every backoff and the stored session.
    pub fn reset_auth_state(&self) {
        self.clear_local_artifacts();
        self.tracker.reset_all();
        info!("Local auth state reset");
    }
}
