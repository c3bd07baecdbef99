use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::normalize;
use crate::record::PatientRecord;

/// Demographic constraints extracted from a query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemographicConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,

    /// `"<min>-<max>"`, `"<min>+"` or a bare age
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_range: Option<String>,
}

impl DemographicConstraints {
    pub fn is_empty(&self) -> bool {
        self.gender.is_none() && self.age_range.is_none()
    }

    fn from_value(value: &JsonValue) -> Self {
        let field = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| value.get(*k))
                .filter_map(normalize::scalar_text)
                .map(|s| s.trim().to_string())
                .find(|s| !s.is_empty())
        };
        Self {
            gender: field(&["gender"]),
            age_range: field(&["ageRange", "age_range"]),
        }
    }
}

fn demographics<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<DemographicConstraints, D::Error> {
    let value = JsonValue::deserialize(deserializer)?;
    Ok(DemographicConstraints::from_value(&value))
}

/// Structured form of a free-text clinical query.
///
/// Decoding never fails on individual fields: a missing or mistyped field
/// takes its empty default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSpecification {
    #[serde(default, deserialize_with = "normalize::string_list")]
    pub required_terms: Vec<String>,

    #[serde(default, deserialize_with = "normalize::string_list")]
    pub optional_terms: Vec<String>,

    #[serde(default, deserialize_with = "normalize::string_list")]
    pub synonyms: Vec<String>,

    #[serde(default, deserialize_with = "normalize::string_list")]
    pub implied_conditions: Vec<String>,

    #[serde(default, deserialize_with = "demographics")]
    pub demographics: DemographicConstraints,

    #[serde(default, deserialize_with = "normalize::text")]
    pub medical_context: String,

    #[serde(default, deserialize_with = "normalize::text")]
    pub original_query: String,
}

impl SearchSpecification {
    /// Minimal specification used whenever the query cannot be structured
    pub fn fallback(query: &str) -> Self {
        Self {
            medical_context: query.to_string(),
            original_query: query.to_string(),
            ..Default::default()
        }
    }

    /// Bind the specification to the query it was derived from.
    ///
    /// The original query always wins over whatever the model echoed, and
    /// an empty medical context falls back to the query.
    pub fn anchored_to(mut self, query: &str) -> Self {
        self.original_query = query.to_string();
        if self.medical_context.trim().is_empty() {
            self.medical_context = query.to_string();
        }
        self
    }

    /// Required terms, synonyms and implied conditions, in that order
    pub fn combined_terms(&self) -> impl Iterator<Item = &str> {
        self.required_terms
            .iter()
            .chain(&self.synonyms)
            .chain(&self.implied_conditions)
            .map(String::as_str)
    }
}

/// A patient record scored against one search request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    #[serde(flatten)]
    pub record: PatientRecord,
    pub relevance_score: u8,
    pub relevance_reason: String,
}

impl RankedCandidate {
    pub fn new(record: PatientRecord, relevance_score: u8, reason: impl Into<String>) -> Self {
        Self {
            record,
            relevance_score: relevance_score.min(100),
            relevance_reason: reason.into(),
        }
    }
}

/// Body of a successful `POST /api/search`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<RankedCandidate>,
    #[serde(rename = "totalFound")]
    pub total_found: usize,
    pub query: String,
}

impl SearchResponse {
    pub fn new(query: impl Into<String>, results: Vec<RankedCandidate>) -> Self {
        Self {
            total_found: results.len(),
            results,
            query: query.into(),
        }
    }
}
