//! Gateway flows against a stubbed Supabase auth server.

use chrono::Utc;
use dashboard_storage::{MemoryStorage, SecureStorage, StorageKeys};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use ymir::{
    AuthGateway, AuthUser, BackoffPolicy, FixedJitter, RateLimitTracker, RegistrationPayload,
    Session, SessionCache, SignUpRequest, SupabaseAuthClient, SystemClock,
};

struct Stack {
    gateway: AuthGateway,
    storage: Arc<MemoryStorage>,
}

fn stack(server: &MockServer) -> Stack {
    let storage = Arc::new(MemoryStorage::new());
    let client = SupabaseAuthClient::new(&server.uri(), "anon-key", storage.clone()).unwrap();
    let cache = Arc::new(SessionCache::new(storage.clone()));
    let tracker = Arc::new(RateLimitTracker::new(
        BackoffPolicy::default(),
        Arc::new(SystemClock),
        Arc::new(FixedJitter(0)),
    ));
    Stack {
        gateway: AuthGateway::new(Arc::new(client), cache, tracker),
        storage,
    }
}

fn store_session(storage: &MemoryStorage, access_token: &str) -> Session {
    let session = Session {
        access_token: access_token.to_string(),
        refresh_token: "rt-stored".to_string(),
        expires_at: Utc::now().timestamp() + 3_600,
        user: AuthUser::new("u-1", "a@b.co"),
    };
    storage
        .set(
            StorageKeys::SUPABASE_SESSION,
            &serde_json::to_string(&session).unwrap(),
        )
        .unwrap();
    session
}

#[tokio::test]
async fn sign_out_revokes_the_stored_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .and(query_param("scope", "global"))
        .and(header("authorization", "Bearer at-live"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let s = stack(&server);
    let session = store_session(&s.storage, "at-live");
    s.gateway.cache().store(&session);

    assert!(s.gateway.sign_out().await);
    assert!(s.gateway.cache().peek().is_none());
    assert!(!s.storage.has(StorageKeys::SUPABASE_SESSION).unwrap());
}

#[tokio::test]
async fn failed_remote_sign_out_still_drops_local_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "msg": "down" })))
        .expect(1)
        .mount(&server)
        .await;

    let s = stack(&server);
    store_session(&s.storage, "at-live");

    assert!(!s.gateway.sign_out().await);
    assert!(!s.storage.has(StorageKeys::SUPABASE_SESSION).unwrap());
}

#[tokio::test]
async fn sign_up_revokes_a_lingering_session_first() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .and(query_param("scope", "local"))
        .and(header("authorization", "Bearer at-old"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "u-2",
            "email": "new@x.com",
            "email_confirmed_at": null,
            "user_metadata": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let s = stack(&server);
    store_session(&s.storage, "at-old");

    let outcome = s
        .gateway
        .sign_up(SignUpRequest {
            email: "new@x.com".to_string(),
            password: "pw123456".to_string(),
            registration: RegistrationPayload::default(),
            email_prechecked: true,
        })
        .await
        .unwrap();

    assert_eq!(outcome.user.id, "u-2");
    assert!(outcome.session.is_none());
    assert!(!s.storage.has(StorageKeys::SUPABASE_SESSION).unwrap());
}
