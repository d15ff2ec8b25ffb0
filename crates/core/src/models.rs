//! Registry resources as this service reads them.
//!
//! Fields the pipeline validates are `Option`s so that a missing field surfaces as a specific
//! diagnostic from the stage that needs it, rather than as an opaque deserialisation failure.
//! Unknown fields are ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::CASE_EVENT_CREATED_BY;

/// Access code registry record.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IacRecord {
    #[serde(default)]
    pub code: Option<String>,
    /// Registries have sent booleans, `"1"` style strings, or nothing at all.
    #[serde(default)]
    pub active: Option<Value>,
    #[serde(default)]
    pub case_id: Option<String>,
}

impl IacRecord {
    /// Whether the code can still be redeemed. Follows JSON truthiness; a missing flag is inactive.
    pub fn is_active(&self) -> bool {
        self.active.as_ref().is_some_and(truthy)
    }
}

pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseGroup {
    #[serde(default)]
    pub collection_exercise_id: Option<String>,
    #[serde(default)]
    pub sample_unit_ref: Option<String>,
    #[serde(default)]
    pub case_group_status: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub case_ref: Option<String>,
    #[serde(default)]
    pub sample_unit_id: Option<String>,
    #[serde(default)]
    pub sample_unit_type: Option<String>,
    #[serde(default)]
    pub collection_instrument_id: Option<String>,
    #[serde(default)]
    pub case_group: Option<CaseGroup>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Classifiers {
    #[serde(default)]
    pub eq_id: Option<String>,
    #[serde(default)]
    pub form_type: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct CollectionInstrument {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub instrument_type: Option<String>,
    #[serde(default)]
    pub classifiers: Option<Classifiers>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionExercise {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub exercise_ref: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ExerciseEvent {
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Sample registry envelope; `attributes` maps upper-snake names to values.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SampleAttributes {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub attributes: Option<Map<String, Value>>,
}

/// Audit event posted to the case registry.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseEvent {
    pub description: String,
    pub category: String,
    pub created_by: String,
}

impl CaseEvent {
    pub fn new(category: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            category: category.into(),
            created_by: CASE_EVENT_CREATED_BY.into(),
        }
    }
}
