//! In-memory auth service for tests and offline runs.

use crate::provider::{
    AuthProvider, AuthUser, ProviderError, ProviderResult, ResendKind, Session, SignOutScope,
    SignUpOutcome,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Provider entry points, for call counting and injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockCall {
    SignUp,
    SignInWithPassword,
    SignInWithOtp,
    CheckEmailExists,
    SignOut,
    GetSession,
    RefreshSession,
    GetUser,
    UpdateUser,
    Resend,
}

struct MockAccount {
    user: AuthUser,
    password: String,
}

#[derive(Default)]
struct MockState {
    accounts: HashMap<String, MockAccount>,
    current: Option<Session>,
    failures: HashMap<MockCall, VecDeque<ProviderError>>,
    calls: HashMap<MockCall, u32>,
    resent: Vec<(ResendKind, String)>,
    revoked: Vec<Session>,
}

/// Mock auth service.
///
/// Accounts, the current session and failures are all configurable; every
/// call is counted.
pub struct MockAuthProvider {
    state: Mutex<MockState>,
    email_check_endpoint: bool,
    auto_confirm: bool,
    sequence: AtomicU64,
}

impl Default for MockAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAuthProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            email_check_endpoint: false,
            auto_confirm: false,
            sequence: AtomicU64::new(1),
        }
    }

    /// Expose a dedicated email-existence endpoint.
    pub fn with_email_check_endpoint(mut self) -> Self {
        self.email_check_endpoint = true;
        self
    }

    /// Confirm emails at sign-up and return a session straight away.
    pub fn with_auto_confirm(mut self) -> Self {
        self.auto_confirm = true;
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_id(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }

    /// Count the call and pop an injected failure, if any.
    fn enter(&self, call: MockCall) -> ProviderResult<MutexGuard<'_, MockState>> {
        let mut state = self.state();
        *state.calls.entry(call).or_insert(0) += 1;
        if let Some(err) = state.failures.get_mut(&call).and_then(|q| q.pop_front()) {
            return Err(err);
        }
        Ok(state)
    }

    /// A session for `user` that expires in an hour.
    pub fn session_for(user: AuthUser) -> Session {
        Session {
            access_token: format!("access-{}", user.id),
            refresh_token: format!("refresh-{}", user.id),
            expires_at: chrono::Utc::now().timestamp() + 3_600,
            user,
        }
    }

    fn issue_session(&self, user: AuthUser) -> Session {
        let n = self.next_id();
        Session {
            access_token: format!("access-{}-{}", user.id, n),
            refresh_token: format!("refresh-{}-{}", user.id, n),
            expires_at: chrono::Utc::now().timestamp() + 3_600,
            user,
        }
    }

    /// Register an existing account.
    pub fn add_account(&self, user: AuthUser, password: &str) {
        let email = user.email.clone().unwrap_or_default().to_ascii_lowercase();
        self.state().accounts.insert(
            email,
            MockAccount {
                user,
                password: password.to_string(),
            },
        );
    }

    /// Mark the account's email confirmed, as if the link had been clicked.
    pub fn confirm_email(&self, email: &str) {
        if let Some(account) = self.state().accounts.get_mut(&email.to_ascii_lowercase()) {
            account.user.email_confirmed_at = Some(chrono::Utc::now().to_rfc3339());
        }
    }

    /// Latest account record for `email`.
    pub fn account(&self, email: &str) -> Option<AuthUser> {
        self.state()
            .accounts
            .get(&email.to_ascii_lowercase())
            .map(|a| a.user.clone())
    }

    pub fn set_current_session(&self, session: Option<Session>) {
        self.state().current = session;
    }

    pub fn current_session(&self) -> Option<Session> {
        self.state().current.clone()
    }

    /// Fail the next call to `call` with `err`. Failures queue up.
    pub fn fail_next(&self, call: MockCall, err: ProviderError) {
        self.state().failures.entry(call).or_default().push_back(err);
    }

    pub fn fail_next_get_session(&self, err: ProviderError) {
        self.fail_next(MockCall::GetSession, err);
    }

    pub fn calls(&self, call: MockCall) -> u32 {
        self.state().calls.get(&call).copied().unwrap_or(0)
    }

    pub fn get_session_calls(&self) -> u32 {
        self.calls(MockCall::GetSession)
    }

    /// Sessions revoked remotely so far.
    pub fn revoked(&self) -> Vec<Session> {
        self.state().revoked.clone()
    }

    /// Confirmation emails sent so far.
    pub fn resent(&self) -> Vec<(ResendKind, String)> {
        self.state().resent.clone()
    }

    fn latest_user(state: &MockState, session: &Session) -> AuthUser {
        session
            .user
            .email
            .as_ref()
            .and_then(|email| state.accounts.get(&email.to_ascii_lowercase()))
            .map(|a| a.user.clone())
            .unwrap_or_else(|| session.user.clone())
    }
}

#[async_trait]
impl AuthProvider for MockAuthProvider {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> ProviderResult<SignUpOutcome> {
        let mut state = self.enter(MockCall::SignUp)?;
        let key = email.to_ascii_lowercase();

        if state.accounts.contains_key(&key) {
            return Err(ProviderError::new("User already registered")
                .with_status(422)
                .with_code("user_already_exists"));
        }
        if password.len() < 6 {
            return Err(ProviderError::new("Password should be at least 6 characters.")
                .with_status(422)
                .with_code("weak_password"));
        }

        let mut user = AuthUser::new(Uuid::new_v4().to_string(), email);
        if let Value::Object(map) = metadata {
            user.user_metadata = map;
        }
        if self.auto_confirm {
            user.email_confirmed_at = Some(chrono::Utc::now().to_rfc3339());
        }

        state.accounts.insert(
            key,
            MockAccount {
                user: user.clone(),
                password: password.to_string(),
            },
        );

        let session = if self.auto_confirm {
            let session = self.issue_session(user.clone());
            state.current = Some(session.clone());
            Some(session)
        } else {
            None
        };

        Ok(SignUpOutcome { user, session })
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> ProviderResult<Session> {
        let mut state = self.enter(MockCall::SignInWithPassword)?;

        let user = match state.accounts.get(&email.to_ascii_lowercase()) {
            Some(account) if account.password == password => account.user.clone(),
            _ => {
                return Err(ProviderError::new("Invalid login credentials")
                    .with_status(400)
                    .with_code("invalid_credentials"))
            }
        };

        if user.email_confirmed_at.is_none() {
            return Err(ProviderError::new("Email not confirmed")
                .with_status(400)
                .with_code("email_not_confirmed"));
        }

        let session = self.issue_session(user);
        state.current = Some(session.clone());
        Ok(session)
    }

    async fn sign_in_with_otp(&self, email: &str, should_create_user: bool) -> ProviderResult<()> {
        let state = self.enter(MockCall::SignInWithOtp)?;
        if !should_create_user && !state.accounts.contains_key(&email.to_ascii_lowercase()) {
            return Err(ProviderError::new("Signups not allowed for otp")
                .with_status(422)
                .with_code("otp_disabled"));
        }
        Ok(())
    }

    async fn check_email_exists(&self, email: &str) -> ProviderResult<Option<bool>> {
        let state = self.enter(MockCall::CheckEmailExists)?;
        if !self.email_check_endpoint {
            return Ok(None);
        }
        Ok(Some(state.accounts.contains_key(&email.to_ascii_lowercase())))
    }

    async fn sign_out(&self, _scope: SignOutScope) -> ProviderResult<()> {
        let mut state = self.state();
        *state.calls.entry(MockCall::SignOut).or_insert(0) += 1;

        // Like the real client: nothing held locally means nothing to revoke.
        let Some(session) = state.current.take() else {
            return Ok(());
        };
        if let Some(err) = state
            .failures
            .get_mut(&MockCall::SignOut)
            .and_then(|q| q.pop_front())
        {
            return Err(err);
        }
        state.revoked.push(session);
        Ok(())
    }

    async fn get_session(&self) -> ProviderResult<Option<Session>> {
        let state = self.enter(MockCall::GetSession)?;
        Ok(state.current.clone())
    }

    async fn refresh_session(&self) -> ProviderResult<Session> {
        let mut state = self.enter(MockCall::RefreshSession)?;
        let Some(current) = state.current.clone() else {
            return Err(ProviderError::session_missing());
        };

        let user = Self::latest_user(&state, &current);
        let session = self.issue_session(user);
        state.current = Some(session.clone());
        Ok(session)
    }

    async fn get_user(&self) -> ProviderResult<AuthUser> {
        let state = self.enter(MockCall::GetUser)?;
        let Some(current) = state.current.as_ref() else {
            return Err(ProviderError::session_missing());
        };
        Ok(Self::latest_user(&state, current))
    }

    async fn update_user(&self, metadata: Value) -> ProviderResult<AuthUser> {
        let mut state = self.enter(MockCall::UpdateUser)?;
        let Some(current) = state.current.clone() else {
            return Err(ProviderError::session_missing());
        };

        let mut user = Self::latest_user(&state, &current);
        if let Value::Object(map) = metadata {
            user.user_metadata.extend(map);
        }

        if let Some(email) = user.email.as_ref() {
            if let Some(account) = state.accounts.get_mut(&email.to_ascii_lowercase()) {
                account.user = user.clone();
            }
        }
        if let Some(session) = state.current.as_mut() {
            session.user = user.clone();
        }
        Ok(user)
    }

    async fn resend(&self, kind: ResendKind, email: &str) -> ProviderResult<()> {
        let mut state = self.enter(MockCall::Resend)?;
        state.resent.push((kind, email.to_string()));
        Ok(())
    }

    fn clear_local_session(&self) {
        self.state().current = None;
    }
}
