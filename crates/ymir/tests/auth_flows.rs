//! End-to-end auth flows against the in-memory provider.

use dashboard_storage::{FileStorage, MemoryStorage, SecureStorage};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use ymir::{
    AuthError, AuthGateway, AuthUser, BackoffPolicy, FixedJitter, ManualClock, MockAuthProvider,
    MockCall, OperationClass, ProviderError, RateLimitTracker, RegistrationPayload,
    SessionCache, SignUpRequest, VerificationConfig, VerificationStatus,
    VerificationStatusUpdater, DEFAULT_SESSION_TTL,
};

struct World {
    gateway: Arc<AuthGateway>,
    provider: Arc<MockAuthProvider>,
    clock: Arc<ManualClock>,
}

fn world_with(provider: MockAuthProvider, storage: Arc<dyn SecureStorage>) -> World {
    let provider = Arc::new(provider);
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let cache = Arc::new(SessionCache::with_clock(
        storage,
        clock.clone(),
        DEFAULT_SESSION_TTL,
    ));
    let tracker = Arc::new(RateLimitTracker::new(
        BackoffPolicy::default(),
        clock.clone(),
        Arc::new(FixedJitter(0)),
    ));
    let gateway = Arc::new(AuthGateway::new(provider.clone(), cache, tracker));
    World {
        gateway,
        provider,
        clock,
    }
}

fn world() -> World {
    world_with(MockAuthProvider::new(), Arc::new(MemoryStorage::new()))
}

fn request(email: &str) -> SignUpRequest {
    SignUpRequest {
        email: email.to_string(),
        password: "correct-horse".to_string(),
        registration: RegistrationPayload {
            full_name: Some("New User".to_string()),
            health_goals: vec!["run a 10k".to_string()],
            dietary_restrictions: vec!["vegetarian".to_string()],
            ..Default::default()
        },
        email_prechecked: false,
    }
}

#[tokio::test]
async fn sign_up_of_unknown_email_proceeds_after_probe() {
    let w = world();

    let outcome = w.gateway.sign_up(request("new@x.com")).await.unwrap();

    assert_eq!(w.provider.calls(MockCall::SignInWithOtp), 1);
    assert_eq!(w.provider.calls(MockCall::SignUp), 1);
    assert_eq!(outcome.user.email.as_deref(), Some("new@x.com"));
    assert!(outcome.session.is_none());

    let stored = w.provider.account("new@x.com").unwrap();
    assert_eq!(
        stored.user_metadata["registration_data"]["health_goals"],
        json!([{ "value": "run a 10k" }])
    );
}

#[tokio::test]
async fn sign_up_of_existing_email_never_reaches_sign_up() {
    let w = world();
    w.provider
        .add_account(AuthUser::new("u-1", "taken@x.com"), "hunter22");

    let err = w.gateway.sign_up(request("taken@x.com")).await.unwrap_err();

    assert!(matches!(err, AuthError::EmailAlreadyRegistered { .. }));
    assert_eq!(w.provider.calls(MockCall::SignUp), 0);
}

#[tokio::test]
async fn auto_confirmed_sign_up_caches_the_session() {
    let w = world_with(
        MockAuthProvider::new().with_auto_confirm(),
        Arc::new(MemoryStorage::new()),
    );

    let outcome = w.gateway.sign_up(request("fast@x.com")).await.unwrap();
    assert!(outcome.session.is_some());

    let session = w.gateway.get_session(false).await.unwrap().unwrap();
    assert_eq!(session.user.email.as_deref(), Some("fast@x.com"));
    assert_eq!(w.provider.get_session_calls(), 0);
}

#[tokio::test]
async fn verification_refresh_is_limited_by_cooldown() {
    let w = world();
    let user = AuthUser::new("u-2", "pending@x.com");
    w.provider.add_account(user.clone(), "hunter22");
    w.provider
        .set_current_session(Some(MockAuthProvider::session_for(user)));

    let updater = VerificationStatusUpdater::with_config(
        w.gateway.clone(),
        w.clock.clone(),
        VerificationConfig::default(),
    );

    let statuses = [
        updater.refresh().await.status,
        updater.refresh().await.status,
        updater.refresh().await.status,
    ];

    assert_eq!(statuses[0], VerificationStatus::Refreshed);
    assert_eq!(statuses[1], VerificationStatus::CoolingDown);
    assert_eq!(statuses[2], VerificationStatus::CoolingDown);
    assert_eq!(w.provider.calls(MockCall::RefreshSession), 1);

    w.provider.confirm_email("pending@x.com");
    w.clock.advance(Duration::from_secs(30).as_millis() as u64);
    let outcome = updater.refresh().await;
    assert!(outcome.verified);
}

#[tokio::test]
async fn throttling_within_one_window_escalates_to_critical() {
    let w = world();
    let tracker = w.gateway.tracker().clone();

    w.provider.fail_next(
        MockCall::SignInWithPassword,
        ProviderError::new("Too many requests").with_status(429),
    );
    let first = w
        .gateway
        .sign_in("busy@x.com", "hunter22")
        .await
        .unwrap_err();
    assert!(matches!(
        first,
        AuthError::RateLimited {
            is_critical: false,
            ..
        }
    ));

    // Other components keep hitting the limit inside the same window.
    let mut previous = 0;
    for _ in 0..4 {
        let decision = tracker.record_hit(OperationClass::AuthRequest);
        assert!(decision.backoff_ms >= previous);
        previous = decision.backoff_ms;
        w.clock.advance(500);
    }
    assert!(tracker.is_critical(OperationClass::AuthRequest));

    let blocked = w
        .gateway
        .sign_in("busy@x.com", "hunter22")
        .await
        .unwrap_err();
    assert!(matches!(
        blocked,
        AuthError::RateLimited {
            is_critical: true,
            provider: None,
            ..
        }
    ));
    assert_eq!(w.provider.calls(MockCall::SignInWithPassword), 1);

    w.gateway.reset_auth_state();
    assert_eq!(tracker.hit_count(OperationClass::AuthRequest), 0);
    assert!(matches!(
        w.gateway.sign_in("busy@x.com", "hunter22").await,
        Err(AuthError::InvalidCredentials(_))
    ));
}

#[tokio::test]
async fn expired_backoff_starts_a_fresh_streak() {
    let w = world();
    let tracker = w.gateway.tracker().clone();

    for _ in 0..3 {
        tracker.record_hit(OperationClass::TokenRefresh);
    }
    w.clock.advance(tracker.retry_after_ms(OperationClass::TokenRefresh));

    w.provider.fail_next_get_session(ProviderError::new("rate limit").with_status(429));
    let err = w.gateway.get_session(true).await.unwrap_err();
    let AuthError::RateLimited { retry_after_ms, .. } = err else {
        panic!("expected rate limit, got {err:?}");
    };
    assert_eq!(retry_after_ms, 2_000);
    assert_eq!(tracker.hit_count(OperationClass::TokenRefresh), 1);
}

#[tokio::test]
async fn session_cache_survives_restart_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage.json");

    let user = AuthUser::new("u-3", "disk@x.com");
    let session = MockAuthProvider::session_for(user.clone());

    {
        let w = world_with(
            MockAuthProvider::new(),
            Arc::new(FileStorage::open(&path).unwrap()),
        );
        w.provider.set_current_session(Some(session.clone()));
        w.gateway.get_session(false).await.unwrap();
        assert_eq!(w.provider.get_session_calls(), 1);
    }

    let w = world_with(
        MockAuthProvider::new(),
        Arc::new(FileStorage::open(&path).unwrap()),
    );
    let cached = w.gateway.get_session(false).await.unwrap().unwrap();
    assert_eq!(cached.user.id, "u-3");
    assert_eq!(w.provider.get_session_calls(), 0);

    w.gateway.get_session(true).await.unwrap();
    assert_eq!(w.provider.get_session_calls(), 1);
}
