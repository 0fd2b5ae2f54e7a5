//! Profile records and reconciliation results.

use serde::{Deserialize, Serialize};
use ymir::RegistrationPayload;

/// Which child table a tag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    Goal,
    Restriction,
}

impl TagKind {
    pub fn table(&self) -> &'static str {
        match self {
            TagKind::Goal => "user_health_goals",
            TagKind::Restriction => "user_dietary_restrictions",
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            TagKind::Goal => "goal",
            TagKind::Restriction => "restriction",
        }
    }
}

/// A row of the `profiles` table. The email is never stored here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub profession: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub activity_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Profile {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Patch that fills only this profile's empty fields from `source`.
    pub fn missing_from(&self, source: &Profile) -> ProfilePatch {
        fn fill<T: Clone>(current: &Option<T>, candidate: &Option<T>) -> Option<T> {
            match current {
                Some(_) => None,
                None => candidate.clone(),
            }
        }

        ProfilePatch {
            full_name: fill(&self.full_name, &source.full_name),
            birth_date: fill(&self.birth_date, &source.birth_date),
            phone: fill(&self.phone, &source.phone),
            profession: fill(&self.profession, &source.profession),
            gender: fill(&self.gender, &source.gender),
            height: fill(&self.height, &source.height),
            weight: fill(&self.weight, &source.weight),
            activity_level: fill(&self.activity_level, &source.activity_level),
            updated_at: None,
        }
    }

    /// Apply every set field of `patch`.
    pub fn apply(&mut self, patch: &ProfilePatch) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if let Some(value) = patch.$field.clone() {
                    self.$field = Some(value);
                })*
            };
        }
        take!(
            full_name,
            birth_date,
            phone,
            profession,
            gender,
            height,
            weight,
            activity_level,
            updated_at
        );
    }
}

/// Partial update of a profile. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profession: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl ProfilePatch {
    /// Names of the profile fields this patch sets, `updated_at` excluded.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        macro_rules! named {
            ($($field:ident),*) => {
                $(if self.$field.is_some() {
                    names.push(stringify!($field));
                })*
            };
        }
        named!(
            full_name,
            birth_date,
            phone,
            profession,
            gender,
            height,
            weight,
            activity_level
        );
        names
    }

    pub fn is_empty(&self) -> bool {
        self.field_names().is_empty()
    }
}

/// Input of the profile-completion form.
pub type ProfileCompletion = RegistrationPayload;

/// What [`crate::ProfileReconciler::ensure_profile`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    AlreadyExists,
    Created { goals: usize, restrictions: usize },
    /// The email is unconfirmed; nothing was written.
    SkippedUnverified,
}

/// Summary of a recovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub user_id: String,
    pub created_profile: bool,
    pub skipped_unverified: bool,
    pub backfilled_fields: Vec<String>,
    pub restored_goals: usize,
    pub restored_restrictions: usize,
}

impl RecoveryReport {
    /// Whether the pass changed nothing.
    pub fn is_noop(&self) -> bool {
        !self.created_profile
            && self.backfilled_fields.is_empty()
            && self.restored_goals == 0
            && self.restored_restrictions == 0
    }
}

/// Profile as shown to the signed-in user.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileView {
    pub user_id: String,
    /// Taken from the session, never from the store.
    pub email: Option<String>,
    pub profile: Option<Profile>,
    pub goals: Vec<String>,
    pub restrictions: Vec<String>,
}
