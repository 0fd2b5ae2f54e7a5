//! Sign-up through profile creation, the way the dashboard drives it.

use dashboard_storage::MemoryStorage;
use profile_reconciler::{
    EnsureOutcome, MemoryProfileStore, ProfileReconciler, StoreOp, TagKind,
};
use std::sync::Arc;
use ymir::{
    AuthGateway, MockAuthProvider, RateLimitTracker, RegistrationPayload, SessionCache,
    SignUpRequest,
};

fn registration() -> RegistrationPayload {
    RegistrationPayload {
        full_name: Some("Grace Hopper".to_string()),
        birth_date: Some("1906-12-09".to_string()),
        height: Some(165.0),
        activity_level: Some("active".to_string()),
        health_goals: vec!["build strength".to_string(), " build strength ".to_string()],
        dietary_restrictions: vec!["lactose free".to_string()],
        ..Default::default()
    }
}

fn setup() -> (
    Arc<AuthGateway>,
    Arc<MockAuthProvider>,
    Arc<MemoryProfileStore>,
    ProfileReconciler,
) {
    let provider = Arc::new(MockAuthProvider::new());
    let gateway = Arc::new(AuthGateway::new(
        provider.clone(),
        Arc::new(SessionCache::new(Arc::new(MemoryStorage::new()))),
        Arc::new(RateLimitTracker::default()),
    ));
    let store = Arc::new(MemoryProfileStore::new());
    let reconciler = ProfileReconciler::new(gateway.clone(), store.clone());
    (gateway, provider, store, reconciler)
}

#[tokio::test]
async fn profile_appears_only_after_confirmation() {
    let (gateway, provider, store, reconciler) = setup();

    gateway
        .sign_up(SignUpRequest {
            email: "grace@navy.mil".to_string(),
            password: "cobol-1959".to_string(),
            registration: registration(),
            email_prechecked: false,
        })
        .await
        .unwrap();

    // Unconfirmed: no profile is written.
    let user = provider.account("grace@navy.mil").unwrap();
    assert_eq!(
        reconciler.ensure_profile(&user).await.unwrap(),
        EnsureOutcome::SkippedUnverified
    );
    assert_eq!(store.profile_count(), 0);

    provider.confirm_email("grace@navy.mil");
    let session = gateway.sign_in("grace@navy.mil", "cobol-1959").await.unwrap();

    let first = reconciler.ensure_profile(&session.user).await.unwrap();
    let second = reconciler.ensure_profile(&session.user).await.unwrap();
    assert_eq!(
        first,
        EnsureOutcome::Created {
            goals: 1,
            restrictions: 1
        }
    );
    assert_eq!(second, EnsureOutcome::AlreadyExists);
    assert_eq!(store.calls(StoreOp::InsertProfile), 1);

    let profile = store.profile(&session.user.id).unwrap();
    assert_eq!(profile.full_name.as_deref(), Some("Grace Hopper"));
    assert_eq!(profile.birth_date.as_deref(), Some("1906-12-09"));
    assert_eq!(profile.height, Some(165.0));

    assert_eq!(
        reconciler.extract_goals(&session.user.id).await.unwrap(),
        vec!["build strength"]
    );
    assert_eq!(
        reconciler.extract_restrictions(&session.user.id).await.unwrap(),
        vec!["lactose free"]
    );

    let view = reconciler.load_profile_view(&session).await.unwrap();
    assert_eq!(view.email.as_deref(), Some("grace@navy.mil"));
}

#[tokio::test]
async fn recovery_restores_wiped_tags() {
    let (gateway, provider, store, reconciler) = setup();
    gateway
        .sign_up(SignUpRequest {
            email: "grace@navy.mil".to_string(),
            password: "cobol-1959".to_string(),
            registration: registration(),
            email_prechecked: true,
        })
        .await
        .unwrap();
    provider.confirm_email("grace@navy.mil");
    let session = gateway.sign_in("grace@navy.mil", "cobol-1959").await.unwrap();
    reconciler.ensure_profile(&session.user).await.unwrap();

    store.put_tags(TagKind::Goal, &session.user.id, &[]);
    let report = reconciler.recover(&session.user.id).await.unwrap();

    assert_eq!(report.restored_goals, 1);
    assert_eq!(report.restored_restrictions, 0);
    assert!(report.backfilled_fields.is_empty());
    assert_eq!(store.tags(TagKind::Goal, &session.user.id), vec!["build strength"]);
}
