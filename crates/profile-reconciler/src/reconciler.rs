//! Metadata to profile reconciliation.
//!
//! Sign-up stores everything the user typed in auth metadata. The profile row
//! and its tag tables are derived from that metadata afterwards, once the
//! email is confirmed, and [`ProfileReconciler::recover`] repairs profiles
//! that were created before some of the data arrived.

use crate::error::{ReconcileError, ReconcileResult, StoreError};
use crate::metadata::MetadataView;
use crate::models::{
    EnsureOutcome, Profile, ProfileCompletion, ProfilePatch, ProfileView, RecoveryReport, TagKind,
};
use crate::store::ProfileStore;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use ymir::{
    normalize_strings, wrap_tags, AuthGateway, AuthUser, Session, REGISTRATION_DATA_KEY,
};

pub struct ProfileReconciler {
    gateway: Arc<AuthGateway>,
    store: Arc<dyn ProfileStore>,
    allow_unverified: bool,
}

impl ProfileReconciler {
    pub fn new(gateway: Arc<AuthGateway>, store: Arc<dyn ProfileStore>) -> Self {
        Self {
            gateway,
            store,
            allow_unverified: false,
        }
    }

    /// Local-development override: create profiles for unconfirmed emails.
    pub fn with_allow_unverified(mut self, allow: bool) -> Self {
        self.allow_unverified = allow;
        self
    }

    pub fn gateway(&self) -> &Arc<AuthGateway> {
        &self.gateway
    }

    pub fn store(&self) -> &Arc<dyn ProfileStore> {
        &self.store
    }

    /// Whether profiles may be created for `user` right now.
    pub fn may_create_for(&self, user: &AuthUser) -> bool {
        self.allow_unverified || user.is_verified()
    }

    /// Replace a tag set, logging instead of failing. Returns how many were
    /// written.
    async fn write_tags(&self, kind: TagKind, user_id: &str, tags: &[String]) -> usize {
        match self.store.replace_tags(kind, user_id, tags).await {
            Ok(()) => tags.len(),
            Err(e) => {
                warn!(user_id, table = kind.table(), error = %e, "Failed to write tags");
                0
            }
        }
    }

    /// Create the profile for `user` if it does not exist yet.
    pub async fn ensure_profile(&self, user: &AuthUser) -> ReconcileResult<EnsureOutcome> {
        if self.store.fetch_profile(&user.id).await?.is_some() {
            debug!(user_id = %user.id, "Profile already exists");
            return Ok(EnsureOutcome::AlreadyExists);
        }

        if !self.may_create_for(user) {
            info!(user_id = %user.id, "Email not confirmed, deferring profile creation");
            return Ok(EnsureOutcome::SkippedUnverified);
        }

        let view = MetadataView::new(&user.user_metadata);
        match self.store.insert_profile(&view.to_profile(&user.id)).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                debug!(user_id = %user.id, "Profile created concurrently");
                return Ok(EnsureOutcome::AlreadyExists);
            }
            Err(e) => return Err(e.into()),
        }

        let goals = self
            .write_tags(TagKind::Goal, &user.id, &view.tags_for(TagKind::Goal))
            .await;
        let restrictions = self
            .write_tags(
                TagKind::Restriction,
                &user.id,
                &view.tags_for(TagKind::Restriction),
            )
            .await;

        info!(user_id = %user.id, goals, restrictions, "Profile created");
        Ok(EnsureOutcome::Created {
            goals,
            restrictions,
        })
    }

    /// Store the completion form in metadata, mark the email verified and
    /// make sure the profile reflects it.
    pub async fn complete_profile(
        &self,
        completion: ProfileCompletion,
    ) -> ReconcileResult<EnsureOutcome> {
        let user = self.gateway.current_user().await?;

        let goals = normalize_strings(&completion.health_goals);
        let restrictions = normalize_strings(&completion.dietary_restrictions);

        let mut metadata = completion.identity_fields();
        metadata.insert("health_goals".to_string(), wrap_tags(&goals));
        metadata.insert("dietary_restrictions".to_string(), wrap_tags(&restrictions));
        metadata.insert("email_verified".to_string(), Value::Bool(true));
        if let Some(registration) = completion.to_metadata().get(REGISTRATION_DATA_KEY) {
            metadata.insert(REGISTRATION_DATA_KEY.to_string(), registration.clone());
        }

        let updated = self
            .gateway
            .update_user_metadata(Value::Object(metadata))
            .await?;

        let outcome = self.ensure_profile(&updated).await?;
        if outcome == EnsureOutcome::AlreadyExists {
            let view = MetadataView::new(&updated.user_metadata);
            let provided = Profile::new(&updated.id).missing_from(&view.to_profile(&updated.id));
            self.update_profile(&updated.id, provided).await?;
            if !goals.is_empty() {
                self.write_tags(TagKind::Goal, &updated.id, &goals).await;
            }
            if !restrictions.is_empty() {
                self.write_tags(TagKind::Restriction, &updated.id, &restrictions)
                    .await;
            }
        }

        info!(user_id = %updated.id, outcome = ?outcome, "Profile completed");
        Ok(outcome)
    }

    /// Repair the profile of the signed-in user from their metadata.
    ///
    /// Missing profiles are created and empty fields are backfilled; existing
    /// profile fields are never overwritten. Tag sets that differ from the
    /// metadata are replaced wholesale. A set is kept only when the metadata
    /// has no tags of that kind.
    pub async fn recover(&self, user_id: &str) -> ReconcileResult<RecoveryReport> {
        let user = self.gateway.current_user().await?;
        if user.id != user_id {
            return Err(ReconcileError::UserMismatch {
                expected: user_id.to_string(),
                actual: user.id,
            });
        }

        let mut report = RecoveryReport {
            user_id: user_id.to_string(),
            ..Default::default()
        };

        let Some(profile) = self.store.fetch_profile(user_id).await? else {
            match self.ensure_profile(&user).await? {
                EnsureOutcome::Created {
                    goals,
                    restrictions,
                } => {
                    report.created_profile = true;
                    report.restored_goals = goals;
                    report.restored_restrictions = restrictions;
                }
                EnsureOutcome::SkippedUnverified => report.skipped_unverified = true,
                EnsureOutcome::AlreadyExists => {}
            }
            return Ok(report);
        };

        let view = MetadataView::new(&user.user_metadata);
        let mut patch = profile.missing_from(&view.to_profile(user_id));
        if !patch.is_empty() {
            report.backfilled_fields = patch
                .field_names()
                .into_iter()
                .map(str::to_string)
                .collect();
            patch.updated_at = Some(Utc::now().to_rfc3339());
            self.store.update_profile(user_id, &patch).await?;
        }

        report.restored_goals = self.restore_tags(&view, TagKind::Goal, user_id).await;
        report.restored_restrictions = self
            .restore_tags(&view, TagKind::Restriction, user_id)
            .await;

        if report.is_noop() {
            debug!(user_id, "Profile already consistent with metadata");
        } else {
            info!(
                user_id,
                backfilled = ?report.backfilled_fields,
                goals = report.restored_goals,
                restrictions = report.restored_restrictions,
                "Profile recovered from metadata"
            );
        }
        Ok(report)
    }

    async fn restore_tags(&self, view: &MetadataView<'_>, kind: TagKind, user_id: &str) -> usize {
        let tags = view.tags_for(kind);
        if tags.is_empty() {
            return 0;
        }

        match self.store.list_tags(kind, user_id).await {
            Ok(existing) if existing == tags => return 0,
            Ok(_) => {}
            Err(e) => {
                warn!(user_id, table = kind.table(), error = %e, "Failed to read tags");
                return 0;
            }
        }

        match self.store.replace_tags(kind, user_id, &tags).await {
            Ok(()) => tags.len(),
            Err(e) => {
                warn!(user_id, table = kind.table(), error = %e, "Failed to restore tags");
                0
            }
        }
    }

    /// Health goals in stored order.
    pub async fn extract_goals(&self, user_id: &str) -> ReconcileResult<Vec<String>> {
        Ok(self.store.list_tags(TagKind::Goal, user_id).await?)
    }

    /// Dietary restrictions in stored order.
    pub async fn extract_restrictions(&self, user_id: &str) -> ReconcileResult<Vec<String>> {
        Ok(self.store.list_tags(TagKind::Restriction, user_id).await?)
    }

    /// Apply an explicit edit. Empty patches are a no-op.
    pub async fn update_profile(&self, user_id: &str, mut patch: ProfilePatch) -> ReconcileResult<()> {
        if patch.is_empty() {
            return Ok(());
        }
        patch.updated_at = Some(Utc::now().to_rfc3339());
        self.store.update_profile(user_id, &patch).await?;
        debug!(user_id, fields = ?patch.field_names(), "Profile updated");
        Ok(())
    }

    /// Profile, tags and session email for display.
    pub async fn load_profile_view(&self, session: &Session) -> ReconcileResult<ProfileView> {
        let user_id = session.user.id.as_str();
        let profile = self.store.fetch_profile(user_id).await?;

        let (goals, restrictions) = if profile.is_some() {
            let goals = self.extract_goals(user_id).await.unwrap_or_else(|e| {
                warn!(user_id, error = %e, "Failed to load goals");
                Vec::new()
            });
            let restrictions = self.extract_restrictions(user_id).await.unwrap_or_else(|e| {
                warn!(user_id, error = %e, "Failed to load restrictions");
                Vec::new()
            });
            (goals, restrictions)
        } else {
            (Vec::new(), Vec::new())
        };

        Ok(ProfileView {
            user_id: user_id.to_string(),
            email: session.user.email.clone(),
            profile,
            goals,
            restrictions,
        })
    }
}
