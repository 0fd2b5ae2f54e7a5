//! Profile store boundary.

use crate::error::StoreResult;
use crate::models::{Profile, ProfilePatch, TagKind};
use async_trait::async_trait;

/// Relational store holding profiles and their tag tables.
///
/// There are no transactions; callers that need "replace" semantics use
/// [`ProfileStore::replace_tags`], which deletes and then inserts.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn fetch_profile(&self, user_id: &str) -> StoreResult<Option<Profile>>;

    /// Fails with `StoreError::Conflict` when the id already exists.
    async fn insert_profile(&self, profile: &Profile) -> StoreResult<()>;

    async fn update_profile(&self, user_id: &str, patch: &ProfilePatch) -> StoreResult<()>;

    async fn delete_tags(&self, kind: TagKind, user_id: &str) -> StoreResult<()>;

    async fn insert_tags(&self, kind: TagKind, user_id: &str, tags: &[String]) -> StoreResult<()>;

    /// Tags in stored order.
    async fn list_tags(&self, kind: TagKind, user_id: &str) -> StoreResult<Vec<String>>;

    /// Replace the whole tag set for `user_id`.
    async fn replace_tags(&self, kind: TagKind, user_id: &str, tags: &[String]) -> StoreResult<()> {
        self.delete_tags(kind, user_id).await?;
        if tags.is_empty() {
            return Ok(());
        }
        self.insert_tags(kind, user_id, tags).await
    }
}
