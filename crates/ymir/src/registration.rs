//! Registration payload and tag normalization.
//!
//! Tags arrive as bare strings, `{ "value": ... }` objects, or `null`,
//! depending on which client version wrote them. Everything funnels through
//! [`normalize_tags`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Metadata key holding the nested registration form.
pub const REGISTRATION_DATA_KEY: &str = "registration_data";

/// A single goal or restriction entry as stored in metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Tag {
    Plain(String),
    Wrapped {
        #[serde(default)]
        value: Option<String>,
    },
}

impl Tag {
    /// Trimmed, non-empty tag text.
    pub fn value(&self) -> Option<&str> {
        let raw = match self {
            Tag::Plain(s) => s.as_str(),
            Tag::Wrapped { value } => value.as_deref()?,
        };
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

/// Normalize a metadata array into distinct tag strings, first-seen order.
///
/// Non-array input yields nothing; `null` and other unexpected entries are
/// dropped.
pub fn normalize_tags(raw: &Value) -> Vec<String> {
    let Some(items) = raw.as_array() else {
        return Vec::new();
    };

    // Only strings and objects can be tags; arrays would otherwise match the
    // wrapped variant positionally.
    let tags = items.iter().filter_map(|item| match item {
        Value::String(_) | Value::Object(_) => serde_json::from_value::<Tag>(item.clone()).ok(),
        _ => None,
    });
    dedup(tags.filter_map(|tag| tag.value().map(str::to_string)))
}

/// Trim, drop empties and de-duplicate caller-supplied strings.
pub fn normalize_strings<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    dedup(
        values
            .into_iter()
            .map(|v| v.as_ref().trim().to_string())
            .filter(|v| !v.is_empty()),
    )
}

fn dedup(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

/// `[{ "value": tag }, ...]`, the canonical stored shape.
pub fn wrap_tags(tags: &[String]) -> Value {
    Value::Array(tags.iter().map(|t| json!({ "value": t })).collect())
}

/// Data captured by the sign-up form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationPayload {
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
    #[serde(default)]
    pub health_goals: Vec<String>,
    #[serde(default)]
    pub dietary_restrictions: Vec<String>,
}

impl RegistrationPayload {
    /// Identity fields as a JSON object, omitting unset ones.
    pub fn identity_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        let mut put = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                fields.insert(key.to_string(), value);
            }
        };

        put("full_name", self.full_name.clone().map(Value::from));
        put("birth_date", self.birth_date.clone().map(Value::from));
        put("phone", self.phone.clone().map(Value::from));
        put("profession", self.profession.clone().map(Value::from));
        put("gender", self.gender.clone().map(Value::from));
        put("height", self.height.map(Value::from));
        put("weight", self.weight.map(Value::from));
        put("activity_level", self.activity_level.clone().map(Value::from));
        fields
    }

    /// Canonical user metadata: everything nested under `registration_data`,
    /// with `full_name` mirrored at the top level.
    pub fn to_metadata(&self) -> Value {
        let mut registration = self.identity_fields();
        registration.insert(
            "health_goals".to_string(),
            wrap_tags(&normalize_strings(&self.health_goals)),
        );
        registration.insert(
            "dietary_restrictions".to_string(),
            wrap_tags(&normalize_strings(&self.dietary_restrictions)),
        );

        let mut metadata = Map::new();
        if let Some(name) = self.full_name.as_ref() {
            metadata.insert("full_name".to_string(), Value::from(name.clone()));
        }
        metadata.insert(REGISTRATION_DATA_KEY.to_string(), Value::Object(registration));
        Value::Object(metadata)
    }
}
