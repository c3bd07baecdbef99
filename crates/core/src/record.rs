use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use crate::error::RecordError;
use crate::normalize;

/// Placeholder for unknown name, age or gender
pub const NOT_AVAILABLE: &str = "N/A";

fn not_available() -> String {
    NOT_AVAILABLE.to_string()
}

/// A persisted patient document, keyed by `patient_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    #[serde(deserialize_with = "normalize::text")]
    pub patient_id: String,

    #[serde(default = "not_available", deserialize_with = "normalize::demographic")]
    pub name: String,

    #[serde(default = "not_available", deserialize_with = "normalize::demographic")]
    pub age: String,

    #[serde(default = "not_available", deserialize_with = "normalize::demographic")]
    pub gender: String,

    #[serde(default, deserialize_with = "normalize::text")]
    pub summary: String,

    #[serde(default, deserialize_with = "normalize::keywords")]
    pub keywords: Vec<String>,

    #[serde(default, deserialize_with = "normalize::prescriptions")]
    pub prescriptions: Vec<Prescription>,

    #[serde(default, deserialize_with = "normalize::timeline")]
    pub timeline: Vec<String>,

    #[serde(default, deserialize_with = "normalize::text")]
    pub note: String,

    #[serde(default, deserialize_with = "normalize::text")]
    pub conversation: String,
}

impl PatientRecord {
    /// Create an empty record holding only the source texts
    pub fn new(
        patient_id: impl Into<String>,
        note: impl Into<String>,
        conversation: impl Into<String>,
    ) -> Self {
        Self {
            patient_id: patient_id.into(),
            name: not_available(),
            age: not_available(),
            gender: not_available(),
            summary: String::new(),
            keywords: Vec::new(),
            prescriptions: Vec::new(),
            timeline: Vec::new(),
            note: note.into(),
            conversation: conversation.into(),
        }
    }

    /// Age as a number, or `None` when the stored value is not numeric.
    pub fn numeric_age(&self) -> Option<u32> {
        normalize::leading_number(&self.age)
    }

    /// Keywords in their comma-separated display form
    pub fn keywords_text(&self) -> String {
        self.keywords.join(", ")
    }

    pub fn prescriptions_text(&self) -> String {
        self.prescriptions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn timeline_text(&self) -> String {
        self.timeline.join("; ")
    }
}

/// A medication mentioned in the note or conversation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prescription {
    #[serde(default, deserialize_with = "normalize::text")]
    pub drug: String,
    #[serde(default, deserialize_with = "normalize::text")]
    pub dose: String,
    #[serde(default, deserialize_with = "normalize::text")]
    pub route: String,
    #[serde(default, deserialize_with = "normalize::text")]
    pub status: String,
}

impl Prescription {
    /// Parse a `Drug: X, Dose: Y, Route: Z, Status: S` line.
    ///
    /// Lines without a `Drug:` label are kept whole as the drug name.
    pub fn parse_line(line: &str) -> Self {
        let mut prescription = Prescription::default();
        let mut labelled = false;

        for part in line.split(',') {
            let Some((label, value)) = part.split_once(':') else {
                continue;
            };
            let value = value.trim().to_string();
            match label.trim().to_ascii_lowercase().as_str() {
                "drug" => {
                    prescription.drug = value;
                    labelled = true;
                }
                "dose" | "dosage" => prescription.dose = value,
                "route" => prescription.route = value,
                "status" => prescription.status = value,
                _ => {}
            }
        }

        if !labelled {
            prescription.drug = line.trim().to_string();
        }
        prescription
    }
}

impl fmt::Display for Prescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let or_na = |s: &str| {
            if s.is_empty() {
                NOT_AVAILABLE.to_string()
            } else {
                s.to_string()
            }
        };
        write!(
            f,
            "Drug: {}, Dose: {}, Route: {}, Status: {}",
            or_na(&self.drug),
            or_na(&self.dose),
            or_na(&self.route),
            or_na(&self.status)
        )
    }
}

/// Fields that may be updated independently after a record is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordField {
    Summary,
    Keywords,
    Timeline,
    Prescriptions,
    Note,
    Conversation,
    Name,
    Age,
    Gender,
}

impl RecordField {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordField::Summary => "summary",
            RecordField::Keywords => "keywords",
            RecordField::Timeline => "timeline",
            RecordField::Prescriptions => "prescriptions",
            RecordField::Note => "note",
            RecordField::Conversation => "conversation",
            RecordField::Name => "name",
            RecordField::Age => "age",
            RecordField::Gender => "gender",
        }
    }
}

impl FromStr for RecordField {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "summary" => Ok(RecordField::Summary),
            "keywords" => Ok(RecordField::Keywords),
            "timeline" => Ok(RecordField::Timeline),
            "prescriptions" => Ok(RecordField::Prescriptions),
            "note" => Ok(RecordField::Note),
            "conversation" => Ok(RecordField::Conversation),
            "name" => Ok(RecordField::Name),
            "age" => Ok(RecordField::Age),
            "gender" => Ok(RecordField::Gender),
            other => Err(RecordError::UnknownField(other.to_string())),
        }
    }
}

impl fmt::Display for RecordField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated single-field update
#[derive(Debug, Clone, PartialEq)]
pub enum RecordPatch {
    Text(RecordField, String),
    Keywords(Vec<String>),
    Timeline(Vec<String>),
    Prescriptions(Vec<Prescription>),
}

impl RecordPatch {
    /// Validate a `{"<field>": value}` request body.
    ///
    /// Text fields require a string. List fields accept either a string in
    /// their legacy encoding or a JSON array.
    pub fn from_body(field: RecordField, body: &JsonValue) -> Result<Self, RecordError> {
        let value = body
            .get(field.as_str())
            .ok_or_else(|| RecordError::MissingField(field.as_str().to_string()))?;

        let invalid = |expected| RecordError::InvalidValue {
            field: field.as_str().to_string(),
            expected,
        };

        match field {
            RecordField::Keywords | RecordField::Timeline | RecordField::Prescriptions => {
                if !(value.is_string() || value.is_array()) {
                    return Err(invalid("a string or an array"));
                }
                Ok(match field {
                    RecordField::Keywords => {
                        RecordPatch::Keywords(normalize::keywords_from_value(value))
                    }
                    RecordField::Timeline => {
                        RecordPatch::Timeline(normalize::timeline_from_value(value))
                    }
                    _ => RecordPatch::Prescriptions(normalize::prescriptions_from_value(value)),
                })
            }
            _ => value
                .as_str()
                .map(|s| RecordPatch::Text(field, s.to_string()))
                .ok_or_else(|| invalid("a string")),
        }
    }

    pub fn field(&self) -> RecordField {
        match self {
            RecordPatch::Text(field, _) => *field,
            RecordPatch::Keywords(_) => RecordField::Keywords,
            RecordPatch::Timeline(_) => RecordField::Timeline,
            RecordPatch::Prescriptions(_) => RecordField::Prescriptions,
        }
    }

    /// Canonical JSON value stored for this field
    pub fn to_json(&self) -> JsonValue {
        match self {
            RecordPatch::Text(_, text) => json!(text),
            RecordPatch::Keywords(items) | RecordPatch::Timeline(items) => json!(items),
            RecordPatch::Prescriptions(items) => json!(items),
        }
    }

    pub fn apply(self, record: &mut PatientRecord) {
        match self {
            RecordPatch::Text(field, text) => match field {
                RecordField::Summary => record.summary = text,
                RecordField::Note => record.note = text,
                RecordField::Conversation => record.conversation = text,
                RecordField::Name => record.name = text,
                RecordField::Age => record.age = text,
                RecordField::Gender => record.gender = text,
                RecordField::Keywords => record.keywords = normalize::split_keywords(&text),
                RecordField::Timeline => record.timeline = normalize::split_timeline(&text),
                RecordField::Prescriptions => {
                    record.prescriptions = normalize::split_prescriptions(&text)
                }
            },
            RecordPatch::Keywords(items) => record.keywords = items,
            RecordPatch::Timeline(items) => record.timeline = items,
            RecordPatch::Prescriptions(items) => record.prescriptions = items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_document_is_normalized_on_read() {
        let doc = json!({
            "patient_id": 1042,
            "age": 67,
            "gender": "",
            "summary": null,
            "keywords": "heart failure, edema",
            "timeline": "Admitted\nDiuresed",
            "prescriptions": "Drug: Furosemide, Dose: 40 mg, Route: IV, Status: added by doctor",
            "note": "67 y/o with dyspnea"
        });
        let record: PatientRecord = serde_json::from_value(doc).unwrap();

        assert_eq!(record.patient_id, "1042");
        assert_eq!(record.name, NOT_AVAILABLE);
        assert_eq!(record.age, "67");
        assert_eq!(record.gender, NOT_AVAILABLE);
        assert_eq!(record.summary, "");
        assert_eq!(record.keywords, vec!["heart failure", "edema"]);
        assert_eq!(record.timeline, vec!["Admitted", "Diuresed"]);
        assert_eq!(record.prescriptions[0].drug, "Furosemide");
        assert_eq!(record.conversation, "");
        assert_eq!(record.numeric_age(), Some(67));
    }

    #[test]
    fn canonical_form_survives_serialization() {
        let mut record = PatientRecord::new("p-1", "note", "conversation");
        record.keywords = vec!["asthma".into()];
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["keywords"], json!(["asthma"]));
        assert_eq!(value["prescriptions"], json!([]));

        let back: PatientRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn non_numeric_age_has_no_numeric_value() {
        let record = PatientRecord::new("p-2", "", "");
        assert_eq!(record.numeric_age(), None);
    }

    #[test]
    fn prescription_display_fills_missing_parts() {
        let p = Prescription {
            drug: "Insulin".into(),
            route: "subcutaneous".into(),
            ..Default::default()
        };
        assert_eq!(
            p.to_string(),
            "Drug: Insulin, Dose: N/A, Route: subcutaneous, Status: N/A"
        );
    }

    #[test]
    fn patch_validation() {
        let field: RecordField = "summary".parse().unwrap();
        let patch = RecordPatch::from_body(field, &json!({"summary": "Stable."})).unwrap();
        assert_eq!(patch, RecordPatch::Text(RecordField::Summary, "Stable.".into()));

        assert_eq!(
            RecordPatch::from_body(field, &json!({"summary": 3})),
            Err(RecordError::InvalidValue {
                field: "summary".into(),
                expected: "a string"
            })
        );
        assert_eq!(
            RecordPatch::from_body(field, &json!({})),
            Err(RecordError::MissingField("summary".into()))
        );
        assert_eq!(
            "patient_id".parse::<RecordField>(),
            Err(RecordError::UnknownField("patient_id".into()))
        );
    }

    #[test]
    fn list_patch_accepts_string_or_array() {
        let from_string =
            RecordPatch::from_body(RecordField::Keywords, &json!({"keywords": "copd, asthma"}))
                .unwrap();
        let from_array =
            RecordPatch::from_body(RecordField::Keywords, &json!({"keywords": ["copd", "asthma"]}))
                .unwrap();
        assert_eq!(from_string, from_array);
        assert_eq!(from_string.to_json(), json!(["copd", "asthma"]));

        let mut record = PatientRecord::new("p-3", "", "");
        from_string.apply(&mut record);
        assert_eq!(record.keywords, vec!["copd", "asthma"]);
    }
}
