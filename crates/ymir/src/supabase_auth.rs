//! Supabase GoTrue REST client.
//!
//! Implements [`AuthProvider`] against `/auth/v1/*`. The current session is
//! persisted in [`SecureStorage`] under [`StorageKeys::SUPABASE_SESSION`] so it
//! survives restarts, the same way the browser SDK keeps it in local storage.

use crate::error::{AuthError, AuthResult};
use crate::provider::{
    AuthProvider, AuthUser, ProviderError, ProviderResult, ResendKind, Session, SignOutScope,
    SignUpOutcome,
};
use async_trait::async_trait;
use chrono::Utc;
use dashboard_storage::{SecureStorage, StorageKeys};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Refresh this many seconds before the access token expires.
const EXPIRY_MARGIN_SECS: i64 = 10;

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Token grant response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .unwrap_or_else(|| Utc::now().timestamp() + self.expires_in.unwrap_or(3_600));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

/// GoTrue error payload. Field names vary between server versions.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
}

fn parse_error(status: StatusCode, body: &str) -> ProviderError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .msg
        .or(parsed.message)
        .or(parsed.error_description)
        .or_else(|| parsed.error.clone())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        });

    let mut error = ProviderError::new(message).with_status(status.as_u16());
    if let Some(code) = parsed.error_code {
        error = error.with_code(code);
    }
    error
}

/// Supabase auth client.
#[derive(Clone)]
pub struct SupabaseAuthClient {
    http_client: Client,
    supabase_url: String,
    publishable_key: String,
    storage: Arc<dyn SecureStorage>,
}

impl SupabaseAuthClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `supabase_url` - The Supabase project URL (e.g., `https://xyz.supabase.co`)
    /// * `publishable_key` - The project's publishable (anon) key
    /// * `storage` - Where the current session is persisted
    pub fn new(
        supabase_url: &str,
        publishable_key: &str,
        storage: Arc<dyn SecureStorage>,
    ) -> AuthResult<Self> {
        Url::parse(supabase_url)?;
        if publishable_key.trim().is_empty() {
            return Err(AuthError::Config(
                "Supabase publishable key is empty".to_string(),
            ));
        }

        let http_client = Client::builder()
            .user_agent(concat!("studydash/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http_client,
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            publishable_key: publishable_key.to_string(),
            storage,
        })
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.supabase_url, path)
    }

    /// Session persisted by the last sign-in or refresh.
    pub fn stored_session(&self) -> Option<Session> {
        let raw = match self.storage.get(StorageKeys::SUPABASE_SESSION) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "Failed to read stored session");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "Stored session is unreadable, ignoring");
                None
            }
        }
    }

    fn persist_session(&self, session: &Session) {
        let result = serde_json::to_string(session)
            .map_err(|e| e.to_string())
            .and_then(|encoded| {
                self.storage
                    .set(StorageKeys::SUPABASE_SESSION, &encoded)
                    .map_err(|e| e.to_string())
            });

        if let Err(e) = result {
            warn!(error = %e, "Failed to persist session");
        }
    }

    fn remove_stored_session(&self) {
        if let Err(e) = self.storage.delete(StorageKeys::SUPABASE_SESSION) {
            warn!(error = %e, "Failed to remove stored session");
        }
    }

    fn update_stored_user(&self, user: &AuthUser) {
        if let Some(mut session) = self.stored_session() {
            if session.user.id == user.id {
                session.user = user.clone();
                self.persist_session(&session);
            }
        }
    }

    fn require_session(&self) -> ProviderResult<Session> {
        self.stored_session()
            .ok_or_else(ProviderError::session_missing)
    }

    /// Send the request with the project key and map non-2xx responses.
    async fn execute(&self, request: RequestBuilder, operation: &str) -> ProviderResult<Response> {
        let response = request
            .header("apikey", &self.publishable_key)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let body_summary = summarize_response_body(&body);
        warn!(
            operation,
            status = %status,
            body_summary = %body_summary,
            "Auth request failed"
        );
        Err(parse_error(status, &body))
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuthClient {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> ProviderResult<SignUpOutcome> {
        debug!(email = %email, "Signing up");

        let response = self
            .execute(
                self.http_client.post(self.auth_url("signup")).json(&json!({
                    "email": email,
                    "password": password,
                    "data": metadata,
                })),
                "signup",
            )
            .await?;

        let body: Value = response.json().await?;

        if body.get("access_token").is_some() {
            let token: TokenResponse = serde_json::from_value(body)
                .map_err(|e| ProviderError::new(format!("Malformed signup response: {e}")))?;
            let session = token.into_session();
            self.persist_session(&session);
            info!(user_id = %session.user.id, "Signed up with immediate session");
            return Ok(SignUpOutcome {
                user: session.user.clone(),
                session: Some(session),
            });
        }

        let user_value = if body.get("user").is_some_and(Value::is_object) {
            body["user"].clone()
        } else {
            body
        };
        let user: AuthUser = serde_json::from_value(user_value)
            .map_err(|e| ProviderError::new(format!("Malformed signup response: {e}")))?;

        info!(user_id = %user.id, "Signed up, awaiting email confirmation");
        Ok(SignUpOutcome {
            user,
            session: None,
        })
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> ProviderResult<Session> {
        debug!(email = %email, "Attempting email/password login");

        let response = self
            .execute(
                self.http_client
                    .post(self.auth_url("token?grant_type=password"))
                    .json(&json!({
                        "email": email,
                        "password": password,
                    })),
                "password_grant",
            )
            .await?;

        let session = response.json::<TokenResponse>().await?.into_session();
        self.persist_session(&session);
        info!(user_id = %session.user.id, "Login successful");
        Ok(session)
    }

    async fn sign_in_with_otp(&self, email: &str, should_create_user: bool) -> ProviderResult<()> {
        self.execute(
            self.http_client.post(self.auth_url("otp")).json(&json!({
                "email": email,
                "create_user": should_create_user,
            })),
            "otp",
        )
        .await?;
        Ok(())
    }

    async fn sign_out(&self, scope: SignOutScope) -> ProviderResult<()> {
        let Some(session) = self.stored_session() else {
            debug!("Sign-out with no stored session");
            return Ok(());
        };
        self.remove_stored_session();

        let result = self
            .execute(
                self.http_client
                    .post(self.auth_url(&format!("logout?scope={}", scope.as_str())))
                    .bearer_auth(&session.access_token),
                "logout",
            )
            .await;

        match result {
            Ok(_) => {
                info!(user_id = %session.user.id, "Signed out");
                Ok(())
            }
            // The session is already gone server-side.
            Err(e) if matches!(e.status, Some(401) | Some(403) | Some(404)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn get_session(&self) -> ProviderResult<Option<Session>> {
        let Some(session) = self.stored_session() else {
            return Ok(None);
        };

        if session.expires_within(Utc::now().timestamp(), EXPIRY_MARGIN_SECS) {
            debug!(user_id = %session.user.id, "Stored session expiring, refreshing");
            return self.refresh_session().await.map(Some);
        }

        Ok(Some(session))
    }

    async fn refresh_session(&self) -> ProviderResult<Session> {
        let current = self.require_session()?;

        let result = self
            .execute(
                self.http_client
                    .post(self.auth_url("token?grant_type=refresh_token"))
                    .json(&json!({ "refresh_token": current.refresh_token })),
                "refresh_token_grant",
            )
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                if matches!(e.status, Some(400) | Some(401)) && !e.is_rate_limited() {
                    warn!(user_id = %current.user.id, "Refresh token rejected, dropping session");
                    self.remove_stored_session();
                }
                return Err(e);
            }
        };

        let session = response.json::<TokenResponse>().await?.into_session();
        self.persist_session(&session);
        info!(user_id = %session.user.id, "Token refreshed successfully");
        Ok(session)
    }

    async fn get_user(&self) -> ProviderResult<AuthUser> {
        let session = self.require_session()?;

        let response = self
            .execute(
                self.http_client
                    .get(self.auth_url("user"))
                    .bearer_auth(&session.access_token),
                "get_user",
            )
            .await?;

        let user: AuthUser = response.json().await?;
        self.update_stored_user(&user);
        Ok(user)
    }

    async fn update_user(&self, metadata: Value) -> ProviderResult<AuthUser> {
        let session = self.require_session()?;

        let response = self
            .execute(
                self.http_client
                    .put(self.auth_url("user"))
                    .bearer_auth(&session.access_token)
                    .json(&json!({ "data": metadata })),
                "update_user",
            )
            .await?;

        let user: AuthUser = response.json().await?;
        self.update_stored_user(&user);
        debug!(user_id = %user.id, "Updated user metadata");
        Ok(user)
    }

    async fn resend(&self, kind: ResendKind, email: &str) -> ProviderResult<()> {
        self.execute(
            self.http_client.post(self.auth_url("resend")).json(&json!({
                "type": kind.as_str(),
                "email": email,
            })),
            "resend",
        )
        .await?;
        Ok(())
    }

    fn clear_local_session(&self) {
        self.remove_stored_session();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashboard_storage::MemoryStorage;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY: &str = "anon-key";

    fn user_json(id: &str, confirmed: bool) -> Value {
        json!({
            "id": id,
            "email": "a@b.co",
            "email_confirmed_at": if confirmed { json!("2024-05-01T10:00:00Z") } else { Value::Null },
            "user_metadata": { "full_name": "Ada" }
        })
    }

    fn token_json(access: &str, refresh: &str) -> Value {
        json!({
            "access_token": access,
            "refresh_token": refresh,
            "expires_in": 3600,
            "token_type": "bearer",
            "user": user_json("u-1", true)
        })
    }

    fn client(server: &MockServer) -> (SupabaseAuthClient, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let client = SupabaseAuthClient::new(&server.uri(), KEY, storage.clone()).unwrap();
        (client, storage)
    }

    fn stored(access: &str, expires_at: i64) -> Session {
        Session {
            access_token: access.to_string(),
            refresh_token: "stored-refresh".to_string(),
            expires_at,
            user: serde_json::from_value(user_json("u-1", false)).unwrap(),
        }
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let storage = Arc::new(MemoryStorage::new());
        assert!(matches!(
            SupabaseAuthClient::new("not a url", KEY, storage.clone()),
            Err(AuthError::InvalidUrl(_))
        ));
        assert!(matches!(
            SupabaseAuthClient::new("https://x.supabase.co", " ", storage),
            Err(AuthError::Config(_))
        ));
    }

    #[test]
    fn test_parse_error_variants() {
        let e = parse_error(
            StatusCode::BAD_REQUEST,
            r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#,
        );
        assert_eq!(e.message, "Invalid login credentials");
        assert_eq!(e.status, Some(400));
        assert_eq!(e.code.as_deref(), Some("invalid_credentials"));

        let legacy = parse_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"Invalid Refresh Token"}"#,
        );
        assert_eq!(legacy.message, "Invalid Refresh Token");

        let opaque = parse_error(StatusCode::TOO_MANY_REQUESTS, "<html>");
        assert_eq!(opaque.message, "Too Many Requests");
        assert!(opaque.is_rate_limited());
    }

    #[tokio::test]
    async fn test_sign_in_persists_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .and(header("apikey", KEY))
            .and(body_json(json!({ "email": "a@b.co", "password": "pw123456" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_json("at-1", "rt-1")))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _) = client(&server);
        let session = client.sign_in_with_password("a@b.co", "pw123456").await.unwrap();

        assert_eq!(session.access_token, "at-1");
        assert!(session.user.is_verified());
        assert_eq!(client.stored_session(), Some(session));
    }

    #[tokio::test]
    async fn test_sign_in_error_carries_status_and_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "code": 400,
                "error_code": "invalid_credentials",
                "msg": "Invalid login credentials"
            })))
            .mount(&server)
            .await;

        let (client, _) = client(&server);
        let err = client.sign_in_with_password("a@b.co", "nope").await.unwrap_err();

        assert_eq!(err.status, Some(400));
        assert_eq!(err.code.as_deref(), Some("invalid_credentials"));
        assert!(client.stored_session().is_none());
    }

    #[tokio::test]
    async fn test_sign_up_without_confirmation_returns_user_only() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/signup"))
            .and(body_json(json!({
                "email": "new@x.com",
                "password": "pw123456",
                "data": { "full_name": "Ada" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_json("u-9", false)))
            .expect(1)
            .mount(&server)
            .await;

        let (client, storage) = client(&server);
        let outcome = client
            .sign_up("new@x.com", "pw123456", json!({ "full_name": "Ada" }))
            .await
            .unwrap();

        assert_eq!(outcome.user.id, "u-9");
        assert!(outcome.session.is_none());
        assert!(!storage.has(StorageKeys::SUPABASE_SESSION).unwrap());
    }

    #[tokio::test]
    async fn test_sign_up_with_auto_confirm_persists_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/signup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_json("at-2", "rt-2")))
            .mount(&server)
            .await;

        let (client, _) = client(&server);
        let outcome = client.sign_up("a@b.co", "pw123456", json!({})).await.unwrap();

        assert_eq!(outcome.session.as_ref().map(|s| s.access_token.as_str()), Some("at-2"));
        assert!(client.stored_session().is_some());
    }

    #[tokio::test]
    async fn test_otp_probe_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/otp"))
            .and(body_json(json!({ "email": "a@b.co", "create_user": false })))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "code": 422,
                "error_code": "otp_disabled",
                "msg": "Signups not allowed for otp"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _) = client(&server);
        let err = client.sign_in_with_otp("a@b.co", false).await.unwrap_err();
        assert_eq!(err.status, Some(422));
        assert_eq!(err.message, "Signups not allowed for otp");
    }

    #[tokio::test]
    async fn test_get_session_returns_fresh_stored_session_without_request() {
        let server = MockServer::start().await;
        let (client, storage) = client(&server);

        let session = stored("at-stored", Utc::now().timestamp() + 3_600);
        storage
            .set(StorageKeys::SUPABASE_SESSION, &serde_json::to_string(&session).unwrap())
            .unwrap();

        assert_eq!(client.get_session().await.unwrap(), Some(session));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_session_refreshes_expired_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "refresh_token"))
            .and(body_json(json!({ "refresh_token": "stored-refresh" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_json("at-new", "rt-new")))
            .expect(1)
            .mount(&server)
            .await;

        let (client, storage) = client(&server);
        let expired = stored("at-old", Utc::now().timestamp() - 5);
        storage
            .set(StorageKeys::SUPABASE_SESSION, &serde_json::to_string(&expired).unwrap())
            .unwrap();

        let session = client.get_session().await.unwrap().unwrap();
        assert_eq!(session.access_token, "at-new");
        assert_eq!(client.stored_session().unwrap().refresh_token, "rt-new");
    }

    #[tokio::test]
    async fn test_rejected_refresh_drops_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error_code": "refresh_token_not_found",
                "msg": "Invalid Refresh Token: Refresh Token Not Found"
            })))
            .mount(&server)
            .await;

        let (client, storage) = client(&server);
        let session = stored("at-old", Utc::now().timestamp() + 3_600);
        storage
            .set(StorageKeys::SUPABASE_SESSION, &serde_json::to_string(&session).unwrap())
            .unwrap();

        assert!(client.refresh_session().await.is_err());
        assert!(client.stored_session().is_none());
    }

    #[tokio::test]
    async fn test_throttled_refresh_keeps_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "msg": "Request rate limit reached"
            })))
            .mount(&server)
            .await;

        let (client, storage) = client(&server);
        let session = stored("at-old", Utc::now().timestamp() + 3_600);
        storage
            .set(StorageKeys::SUPABASE_SESSION, &serde_json::to_string(&session).unwrap())
            .unwrap();

        let err = client.refresh_session().await.unwrap_err();
        assert!(err.is_rate_limited());
        assert!(client.stored_session().is_some());
    }

    #[tokio::test]
    async fn test_refresh_without_session_is_session_missing() {
        let server = MockServer::start().await;
        let (client, _) = client(&server);

        let err = client.refresh_session().await.unwrap_err();
        assert_eq!(err, ProviderError::session_missing());
    }

    #[tokio::test]
    async fn test_sign_out_sends_bearer_and_clears_storage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/logout"))
            .and(query_param("scope", "local"))
            .and(header("authorization", "Bearer at-stored"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let (client, storage) = client(&server);
        let session = stored("at-stored", Utc::now().timestamp() + 3_600);
        storage
            .set(StorageKeys::SUPABASE_SESSION, &serde_json::to_string(&session).unwrap())
            .unwrap();

        client.sign_out(SignOutScope::Local).await.unwrap();
        assert!(!storage.has(StorageKeys::SUPABASE_SESSION).unwrap());
    }

    #[tokio::test]
    async fn test_sign_out_ignores_already_revoked_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/logout"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "msg": "invalid JWT" })))
            .mount(&server)
            .await;

        let (client, storage) = client(&server);
        let session = stored("at-stored", Utc::now().timestamp() + 3_600);
        storage
            .set(StorageKeys::SUPABASE_SESSION, &serde_json::to_string(&session).unwrap())
            .unwrap();

        assert!(client.sign_out(SignOutScope::Global).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_user_sends_data_and_updates_stored_user() {
        let server = MockServer::start().await;
        let mut updated = user_json("u-1", false);
        updated["user_metadata"]["email_verified"] = json!(true);

        Mock::given(method("PUT"))
            .and(path("/auth/v1/user"))
            .and(header("authorization", "Bearer at-stored"))
            .and(body_json(json!({ "data": { "email_verified": true } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(updated))
            .expect(1)
            .mount(&server)
            .await;

        let (client, storage) = client(&server);
        let session = stored("at-stored", Utc::now().timestamp() + 3_600);
        storage
            .set(StorageKeys::SUPABASE_SESSION, &serde_json::to_string(&session).unwrap())
            .unwrap();

        let user = client
            .update_user(json!({ "email_verified": true }))
            .await
            .unwrap();
        assert!(user.is_verified());
        assert!(client.stored_session().unwrap().user.is_verified());
    }

    #[tokio::test]
    async fn test_get_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("authorization", "Bearer at-stored"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_json("u-1", true)))
            .expect(1)
            .mount(&server)
            .await;

        let (client, storage) = client(&server);
        let session = stored("at-stored", Utc::now().timestamp() + 3_600);
        storage
            .set(StorageKeys::SUPABASE_SESSION, &serde_json::to_string(&session).unwrap())
            .unwrap();

        let user = client.get_user().await.unwrap();
        assert!(user.is_verified());
    }

    #[tokio::test]
    async fn test_resend_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/resend"))
            .and(body_json(json!({ "type": "signup", "email": "a@b.co" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _) = client(&server);
        client.resend(ResendKind::Signup, "a@b.co").await.unwrap();
    }
}
