//! Authentication core for the Studydash client.
//!
//! This crate provides:
//! - `AuthGateway`: sign-up, sign-in, sign-out and session retrieval
//! - `RateLimitTracker`: per-operation exponential backoff bookkeeping
//! - `SessionCache`: TTL-bounded persisted session snapshot
//! - `VerificationStatusUpdater`: FSM-driven email verification polling
//! - `SupabaseAuthClient`: GoTrue REST implementation of `AuthProvider`

mod classify;
mod clock;
mod error;
mod gateway;
mod mock;
mod provider;
mod rate_limit;
mod registration;
mod session_cache;
mod supabase_auth;
mod verification;

pub use classify::{probe_indicates_account, ProbeVerdict};
pub use clock::{Clock, FixedJitter, JitterSource, ManualClock, RandomJitter, SystemClock};
pub use error::{AuthError, AuthResult};
pub use gateway::{is_valid_email, AuthGateway, SignUpRequest};
pub use mock::{MockAuthProvider, MockCall};
pub use provider::{
    AuthProvider, AuthUser, ProviderError, ProviderResult, ResendKind, Session, SignOutScope,
    SignUpOutcome,
};
pub use rate_limit::{
    BackoffDecision, BackoffPolicy, OperationClass, RateLimitState, RateLimitTracker,
};
pub use registration::{
    normalize_strings, normalize_tags, wrap_tags, RegistrationPayload, Tag, REGISTRATION_DATA_KEY,
};
pub use session_cache::{SessionCache, SessionSnapshot, DEFAULT_SESSION_TTL};
pub use supabase_auth::SupabaseAuthClient;
pub use verification::{
    verification_machine, VerificationConfig, VerificationMachine, VerificationMachineInput,
    VerificationMachineState, VerificationOutcome, VerificationStatus, VerificationStatusUpdater,
    MAX_REFRESH_ATTEMPTS,
};
