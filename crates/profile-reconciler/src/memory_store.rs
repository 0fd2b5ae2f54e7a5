//! In-memory profile store for tests and offline runs.

use crate::error::{StoreError, StoreResult};
use crate::models::{Profile, ProfilePatch, TagKind};
use crate::store::ProfileStore;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Store operations, for call counting and injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    FetchProfile,
    InsertProfile,
    UpdateProfile,
    DeleteTags,
    InsertTags,
    ListTags,
}

#[derive(Default)]
struct StoreState {
    profiles: HashMap<String, Profile>,
    tags: HashMap<(TagKind, String), Vec<String>>,
    failures: HashMap<StoreOp, VecDeque<StoreError>>,
    calls: HashMap<StoreOp, u32>,
}

#[derive(Default)]
pub struct MemoryProfileStore {
    state: Mutex<StoreState>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self, op: StoreOp) -> StoreResult<MutexGuard<'_, StoreState>> {
        let mut state = self.state();
        *state.calls.entry(op).or_insert(0) += 1;
        if let Some(err) = state.failures.get_mut(&op).and_then(|q| q.pop_front()) {
            return Err(err);
        }
        Ok(state)
    }

    /// Seed a profile row directly.
    pub fn put_profile(&self, profile: Profile) {
        self.state().profiles.insert(profile.id.clone(), profile);
    }

    /// Seed a tag set directly.
    pub fn put_tags(&self, kind: TagKind, user_id: &str, tags: &[&str]) {
        self.state().tags.insert(
            (kind, user_id.to_string()),
            tags.iter().map(|t| t.to_string()).collect(),
        );
    }

    pub fn profile(&self, user_id: &str) -> Option<Profile> {
        self.state().profiles.get(user_id).cloned()
    }

    pub fn tags(&self, kind: TagKind, user_id: &str) -> Vec<String> {
        self.state()
            .tags
            .get(&(kind, user_id.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn profile_count(&self) -> usize {
        self.state().profiles.len()
    }

    /// Fail the next `op` with `err`. Failures queue up.
    pub fn fail_next(&self, op: StoreOp, err: StoreError) {
        self.state().failures.entry(op).or_default().push_back(err);
    }

    pub fn calls(&self, op: StoreOp) -> u32 {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn fetch_profile(&self, user_id: &str) -> StoreResult<Option<Profile>> {
        let state = self.enter(StoreOp::FetchProfile)?;
        Ok(state.profiles.get(user_id).cloned())
    }

    async fn insert_profile(&self, profile: &Profile) -> StoreResult<()> {
        let mut state = self.enter(StoreOp::InsertProfile)?;
        if state.profiles.contains_key(&profile.id) {
            return Err(StoreError::Conflict(format!(
                "duplicate key value violates unique constraint \"profiles_pkey\" ({})",
                profile.id
            )));
        }
        let mut row = profile.clone();
        let now = chrono::Utc::now().to_rfc3339();
        row.created_at.get_or_insert_with(|| now.clone());
        row.updated_at.get_or_insert(now);
        state.profiles.insert(row.id.clone(), row);
        Ok(())
    }

    async fn update_profile(&self, user_id: &str, patch: &ProfilePatch) -> StoreResult<()> {
        let mut state = self.enter(StoreOp::UpdateProfile)?;
        // PostgREST PATCH on a missing row matches nothing and succeeds.
        if let Some(profile) = state.profiles.get_mut(user_id) {
            profile.apply(patch);
        }
        Ok(())
    }

    async fn delete_tags(&self, kind: TagKind, user_id: &str) -> StoreResult<()> {
        let mut state = self.enter(StoreOp::DeleteTags)?;
        state.tags.remove(&(kind, user_id.to_string()));
        Ok(())
    }

    async fn insert_tags(&self, kind: TagKind, user_id: &str, tags: &[String]) -> StoreResult<()> {
        let mut state = self.enter(StoreOp::InsertTags)?;
        state
            .tags
            .entry((kind, user_id.to_string()))
            .or_default()
            .extend(tags.iter().cloned());
        Ok(())
    }

    async fn list_tags(&self, kind: TagKind, user_id: &str) -> StoreResult<Vec<String>> {
        let state = self.enter(StoreOp::ListTags)?;
        Ok(state
            .tags
            .get(&(kind, user_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_conflicts_on_existing_id() {
        let store = MemoryProfileStore::new();
        store.insert_profile(&Profile::new("u-1")).await.unwrap();

        let err = store.insert_profile(&Profile::new("u-1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.profile("u-1").unwrap().created_at.is_some());
    }

    #[tokio::test]
    async fn test_replace_tags_is_wholesale() {
        let store = MemoryProfileStore::new();
        store.put_tags(TagKind::Goal, "u-1", &["old"]);

        store
            .replace_tags(TagKind::Goal, "u-1", &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(store.tags(TagKind::Goal, "u-1"), vec!["a", "b"]);

        store.replace_tags(TagKind::Goal, "u-1", &[]).await.unwrap();
        assert!(store.tags(TagKind::Goal, "u-1").is_empty());
        assert_eq!(store.calls(StoreOp::InsertTags), 1);
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed_once() {
        let store = MemoryProfileStore::new();
        store.fail_next(StoreOp::ListTags, StoreError::Unauthorized);

        assert!(store.list_tags(TagKind::Restriction, "u-1").await.is_err());
        assert!(store.list_tags(TagKind::Restriction, "u-1").await.is_ok());
        assert_eq!(store.calls(StoreOp::ListTags), 2);
    }
}
