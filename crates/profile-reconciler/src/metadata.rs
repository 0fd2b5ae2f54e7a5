//! Read side of auth user metadata.
//!
//! Older clients wrote identity fields at the top level, newer ones nest them
//! under `registration_data`, and tag lists have gone by several names. Every
//! lookup here checks the top level first, then `registration_data`.

use crate::models::{Profile, TagKind};
use serde_json::{Map, Value};
use ymir::{normalize_tags, REGISTRATION_DATA_KEY};

/// Accepted keys for health goals, in priority order.
pub const GOAL_KEYS: &[&str] = &["health_goals", "healthGoals", "goals"];

/// Accepted keys for dietary restrictions, in priority order.
pub const RESTRICTION_KEYS: &[&str] = &["dietary_restrictions", "dietaryRestrictions", "restrictions"];

/// Borrowed view over a user's metadata object.
#[derive(Debug, Clone, Copy)]
pub struct MetadataView<'a> {
    metadata: &'a Map<String, Value>,
}

impl<'a> MetadataView<'a> {
    pub fn new(metadata: &'a Map<String, Value>) -> Self {
        Self { metadata }
    }

    fn registration(&self) -> Option<&'a Map<String, Value>> {
        self.metadata
            .get(REGISTRATION_DATA_KEY)
            .and_then(Value::as_object)
    }

    /// First non-null value for `key`.
    pub fn field(&self, key: &str) -> Option<&'a Value> {
        let present = |map: &'a Map<String, Value>| map.get(key).filter(|v| !v.is_null());
        present(self.metadata).or_else(|| self.registration().and_then(present))
    }

    /// Field as trimmed non-empty text. Numbers are rendered as text.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.field(key)? {
            Value::String(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Field as a number. Numeric strings are accepted.
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.field(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// First non-empty normalized tag list among `keys`; the top level is
    /// searched completely before `registration_data`.
    pub fn tags(&self, keys: &[&str]) -> Vec<String> {
        let scopes = std::iter::once(self.metadata).chain(self.registration());
        for scope in scopes {
            for key in keys {
                if let Some(raw) = scope.get(*key) {
                    let tags = normalize_tags(raw);
                    if !tags.is_empty() {
                        return tags;
                    }
                }
            }
        }
        Vec::new()
    }

    pub fn tags_for(&self, kind: TagKind) -> Vec<String> {
        match kind {
            TagKind::Goal => self.tags(GOAL_KEYS),
            TagKind::Restriction => self.tags(RESTRICTION_KEYS),
        }
    }

    /// Profile row built from the identity fields.
    pub fn to_profile(&self, user_id: &str) -> Profile {
        Profile {
            id: user_id.to_string(),
            full_name: self.text("full_name"),
            birth_date: self.text("birth_date"),
            phone: self.text("phone"),
            profession: self.text("profession"),
            gender: self.text("gender"),
            height: self.number("height"),
            weight: self.number("weight"),
            activity_level: self.text("activity_level"),
            created_at: None,
            updated_at: None,
        }
    }
}
