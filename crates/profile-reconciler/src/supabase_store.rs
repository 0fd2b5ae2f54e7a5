//! PostgREST-backed profile store.

use crate::error::{StoreError, StoreResult};
use crate::models::{Profile, ProfilePatch, TagKind};
use crate::store::ProfileStore;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;
use ymir::AuthProvider;

/// Supabase REST client for `profiles` and the tag tables.
///
/// Requests are authorized with the signed-in user's access token, taken
/// from the auth provider on every call so refreshed tokens are picked up.
#[derive(Clone)]
pub struct SupabaseProfileStore {
    http_client: Client,
    api_url: String,
    publishable_key: String,
    auth: Arc<dyn AuthProvider>,
}

impl SupabaseProfileStore {
    /// Create a new store.
    ///
    /// # Arguments
    /// * `api_url` - The Supabase project URL (e.g., `https://xyz.supabase.co`)
    /// * `publishable_key` - The project's publishable (anon) key
    /// * `auth` - Source of the current access token
    pub fn new(
        api_url: &str,
        publishable_key: &str,
        auth: Arc<dyn AuthProvider>,
    ) -> StoreResult<Self> {
        Url::parse(api_url).map_err(|e| StoreError::Config(format!("invalid API URL: {e}")))?;
        if publishable_key.trim().is_empty() {
            return Err(StoreError::Config("publishable key is empty".to_string()));
        }

        Ok(Self {
            http_client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            publishable_key: publishable_key.to_string(),
            auth,
        })
    }

    /// Build the REST API URL for a table.
    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.api_url, table)
    }

    async fn access_token(&self) -> StoreResult<String> {
        match self.auth.get_session().await {
            Ok(Some(session)) => Ok(session.access_token),
            Ok(None) => Err(StoreError::Unauthorized),
            Err(e) => {
                debug!(error = %e, "Could not load session for profile store");
                Err(StoreError::Unauthorized)
            }
        }
    }

    async fn authorized(&self, request: RequestBuilder) -> StoreResult<RequestBuilder> {
        let token = self.access_token().await?;
        Ok(request
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", token)))
    }

    async fn send(&self, request: RequestBuilder, operation: &str) -> StoreResult<Response> {
        let response = self.authorized(request).await?.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        warn!(operation, status = status.as_u16(), "Profile store request failed");

        if status == StatusCode::CONFLICT {
            return Err(StoreError::Conflict(body));
        }
        Err(StoreError::Supabase {
            status: status.as_u16(),
            message: body,
        })
    }

    async fn insert_rows<T: Serialize + ?Sized>(&self, table: &str, rows: &T) -> StoreResult<()> {
        let request = self
            .http_client
            .post(self.rest_url(table))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=minimal")
            .json(rows);
        self.send(request, table).await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for SupabaseProfileStore {
    async fn fetch_profile(&self, user_id: &str) -> StoreResult<Option<Profile>> {
        let request = self
            .http_client
            .get(self.rest_url("profiles"))
            .query(&[("id", format!("eq.{}", user_id)), ("select", "*".to_string())]);

        let rows: Vec<Profile> = self.send(request, "fetch_profile").await?.json().await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_profile(&self, profile: &Profile) -> StoreResult<()> {
        debug!(user_id = %profile.id, "Inserting profile");
        self.insert_rows("profiles", profile).await
    }

    async fn update_profile(&self, user_id: &str, patch: &ProfilePatch) -> StoreResult<()> {
        debug!(user_id, fields = ?patch.field_names(), "Updating profile");
        let request = self
            .http_client
            .patch(self.rest_url("profiles"))
            .query(&[("id", format!("eq.{}", user_id))])
            .header("Content-Type", "application/json")
            .header("Prefer", "return=minimal")
            .json(patch);
        self.send(request, "update_profile").await?;
        Ok(())
    }

    async fn delete_tags(&self, kind: TagKind, user_id: &str) -> StoreResult<()> {
        let request = self
            .http_client
            .delete(self.rest_url(kind.table()))
            .query(&[("user_id", format!("eq.{}", user_id))]);
        self.send(request, "delete_tags").await?;
        Ok(())
    }

    async fn insert_tags(&self, kind: TagKind, user_id: &str, tags: &[String]) -> StoreResult<()> {
        if tags.is_empty() {
            return Ok(());
        }
        let rows: Vec<Value> = tags
            .iter()
            .map(|tag| {
                let mut row = Map::new();
                row.insert("user_id".to_string(), Value::from(user_id));
                row.insert(kind.column().to_string(), Value::from(tag.as_str()));
                Value::Object(row)
            })
            .collect();
        debug!(user_id, table = kind.table(), count = rows.len(), "Inserting tags");
        self.insert_rows(kind.table(), &rows).await
    }

    async fn list_tags(&self, kind: TagKind, user_id: &str) -> StoreResult<Vec<String>> {
        let request = self.http_client.get(self.rest_url(kind.table())).query(&[
            ("user_id", format!("eq.{}", user_id)),
            ("select", kind.column().to_string()),
        ]);

        let rows: Vec<Value> = self.send(request, "list_tags").await?.json().await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get(kind.column()).and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }
}

impl std::fmt::Debug for SupabaseProfileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseProfileStore")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use ymir::{AuthUser, MockAuthProvider};

    fn signed_in() -> Arc<MockAuthProvider> {
        let provider = Arc::new(MockAuthProvider::new());
        let user = AuthUser::new("u-1", "a@b.co");
        provider.set_current_session(Some(MockAuthProvider::session_for(user)));
        provider
    }

    fn store(server: &MockServer, auth: Arc<MockAuthProvider>) -> SupabaseProfileStore {
        SupabaseProfileStore::new(&server.uri(), "anon-key", auth).unwrap()
    }

    #[test]
    fn test_rest_url() {
        let store = SupabaseProfileStore::new(
            "https://test.supabase.co/",
            "anon-key",
            Arc::new(MockAuthProvider::new()),
        )
        .unwrap();
        assert_eq!(
            store.rest_url("profiles"),
            "https://test.supabase.co/rest/v1/profiles"
        );
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let auth: Arc<dyn AuthProvider> = Arc::new(MockAuthProvider::new());
        assert!(SupabaseProfileStore::new("nope", "k", auth.clone()).is_err());
        assert!(SupabaseProfileStore::new("https://x.supabase.co", " ", auth).is_err());
    }

    #[tokio::test]
    async fn test_fetch_profile_sends_filter_and_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .and(query_param("id", "eq.u-1"))
            .and(header("apikey", "anon-key"))
            .and(header("Authorization", "Bearer access-u-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "u-1", "full_name": "Ada", "height": 170.0, "created_at": "2024-01-01T00:00:00Z" }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let profile = store(&server, signed_in())
            .fetch_profile("u-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.full_name.as_deref(), Some("Ada"));
        assert_eq!(profile.height, Some(170.0));
        assert_eq!(profile.phone, None);
    }

    #[tokio::test]
    async fn test_fetch_missing_profile() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        assert!(store(&server, signed_in())
            .fetch_profile("u-1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_insert_conflict_maps_to_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/profiles"))
            .and(header("Prefer", "return=minimal"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "code": "23505",
                "message": "duplicate key value violates unique constraint"
            })))
            .mount(&server)
            .await;

        let err = store(&server, signed_in())
            .insert_profile(&Profile::new("u-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_insert_tags_row_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/user_dietary_restrictions"))
            .and(body_json(json!([
                { "user_id": "u-1", "restriction": "vegan" },
                { "user_id": "u-1", "restriction": "halal" }
            ])))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        store(&server, signed_in())
            .insert_tags(
                TagKind::Restriction,
                "u-1",
                &["vegan".to_string(), "halal".to_string()],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_list_tags_keeps_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/user_health_goals"))
            .and(query_param("user_id", "eq.u-1"))
            .and(query_param("select", "goal"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "goal": "sleep" },
                { "goal": "run" }
            ])))
            .mount(&server)
            .await;

        let tags = store(&server, signed_in())
            .list_tags(TagKind::Goal, "u-1")
            .await
            .unwrap();
        assert_eq!(tags, vec!["sleep", "run"]);
    }

    #[tokio::test]
    async fn test_update_and_delete_filters() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/profiles"))
            .and(query_param("id", "eq.u-1"))
            .and(body_json(json!({ "gender": "f" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/user_health_goals"))
            .and(query_param("user_id", "eq.u-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let store = store(&server, signed_in());
        let patch = ProfilePatch {
            gender: Some("f".to_string()),
            ..Default::default()
        };
        store.update_profile("u-1", &patch).await.unwrap();
        store.delete_tags(TagKind::Goal, "u-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_requires_session() {
        let server = MockServer::start().await;
        let err = store(&server, Arc::new(MockAuthProvider::new()))
            .fetch_profile("u-1")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unauthorized));
    }

    #[tokio::test]
    async fn test_server_error_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
            .mount(&server)
            .await;

        let err = store(&server, signed_in())
            .delete_tags(TagKind::Restriction, "u-1")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Supabase { status: 403, .. }));
    }
}
