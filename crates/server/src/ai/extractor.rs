//! Clinical artifact extraction from a note and a doctor-patient conversation

use std::future::Future;

use clinai_core::normalize;
use clinai_core::{NOT_AVAILABLE, PatientRecord, Prescription};
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::json::{extract_array, extract_object};
use super::{AiError, CompletionService, GenerationOptions};

/// Most keywords kept per record
pub const MAX_KEYWORDS: usize = 7;

const SUMMARY_PROMPT: &str = "You are a clinical summarization assistant.
Summarize the patient's case in one paragraph (max 4 sentences). Return only the paragraph.";

const TIMELINE_PROMPT: &str = "You are a medical reasoning assistant. Extract the chronological list of key clinical events.
Each event must be a concise string. Return a JSON array of strings.";

const KEYWORDS_PROMPT: &str = "Identify up to 7 key disease or condition keywords describing this case.
Return a JSON array of strings.";

const PRESCRIPTIONS_PROMPT: &str = r#"You are a medical assistant. Extract all mentioned medications and provide:
- "drug": drug name
- "route": route (oral, IV, etc.)
- "dose": dosage
- "status": one of ["added by doctor", "continued", "discontinued", "mentioned"]
Return a JSON array of objects with exactly these keys. Return [] when no medication is mentioned."#;

const DEMOGRAPHICS_PROMPT: &str = r#"Extract the patient's demographics from the clinical text.
Return a JSON object {"name": string, "age": string, "gender": string}.
Use "N/A" for anything that is not stated. Give age in years as digits only."#;

const SUMMARY_OPTIONS: GenerationOptions = GenerationOptions::text(0.0, 512);
const LIST_OPTIONS: GenerationOptions = GenerationOptions::json(0.0, 1024);
const PRESCRIPTION_OPTIONS: GenerationOptions = GenerationOptions::json(0.0, 2048);
const DEMOGRAPHICS_OPTIONS: GenerationOptions = GenerationOptions::json(0.0, 256);

/// Artifacts derived from a note and conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClinicalArtifacts {
    pub summary: String,
    pub timeline: Vec<String>,
    pub keywords: Vec<String>,
    pub prescriptions: Vec<Prescription>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientDemographics {
    pub name: String,
    pub age: String,
    pub gender: String,
}

impl Default for PatientDemographics {
    fn default() -> Self {
        Self {
            name: NOT_AVAILABLE.to_string(),
            age: NOT_AVAILABLE.to_string(),
            gender: NOT_AVAILABLE.to_string(),
        }
    }
}

fn prompt(instructions: &str, note: &str, conversation: &str) -> String {
    format!("{instructions}\n\n### NOTE\n{note}\n\n### CONVERSATION\n{conversation}")
}

/// Derive summary, timeline, keywords and prescriptions concurrently.
///
/// Each field is best-effort: a failed call or unparseable reply leaves
/// that field empty.
pub async fn derive_artifacts(
    llm: &dyn CompletionService,
    note: &str,
    conversation: &str,
) -> ClinicalArtifacts {
    let (summary, timeline, keywords, prescriptions) = tokio::join!(
        best_effort("summary", summary(llm, note, conversation)),
        best_effort("timeline", timeline(llm, note, conversation)),
        best_effort("keywords", keywords(llm, note, conversation)),
        best_effort("prescriptions", prescriptions(llm, note, conversation)),
    );

    ClinicalArtifacts {
        summary,
        timeline,
        keywords,
        prescriptions,
    }
}

pub async fn extract_demographics(
    llm: &dyn CompletionService,
    note: &str,
    conversation: &str,
) -> PatientDemographics {
    best_effort("demographics", demographics(llm, note, conversation)).await
}

/// Run the full extraction and assemble the record to persist
pub async fn build_record(
    llm: &dyn CompletionService,
    patient_id: &str,
    note: &str,
    conversation: &str,
) -> PatientRecord {
    let (artifacts, demographics) = tokio::join!(
        derive_artifacts(llm, note, conversation),
        extract_demographics(llm, note, conversation),
    );

    let mut record = PatientRecord::new(patient_id, note, conversation);
    record.name = demographics.name;
    record.age = demographics.age;
    record.gender = demographics.gender;
    record.summary = artifacts.summary;
    record.keywords = artifacts.keywords;
    record.timeline = artifacts.timeline;
    record.prescriptions = artifacts.prescriptions;
    record
}

async fn best_effort<T: Default>(
    field: &'static str,
    extraction: impl Future<Output = Result<T, AiError>>,
) -> T {
    match extraction.await {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(field, error = %e, "Extraction failed, using default");
            T::default()
        }
    }
}

async fn summary(
    llm: &dyn CompletionService,
    note: &str,
    conversation: &str,
) -> Result<String, AiError> {
    let reply = llm
        .generate(&prompt(SUMMARY_PROMPT, note, conversation), &SUMMARY_OPTIONS)
        .await?;
    // Some models quote the paragraph as a JSON string
    match serde_json::from_str::<JsonValue>(reply.trim()) {
        Ok(JsonValue::String(text)) => Ok(text.trim().to_string()),
        _ => Ok(reply.trim().to_string()),
    }
}

async fn timeline(
    llm: &dyn CompletionService,
    note: &str,
    conversation: &str,
) -> Result<Vec<String>, AiError> {
    let reply = llm
        .generate(&prompt(TIMELINE_PROMPT, note, conversation), &LIST_OPTIONS)
        .await?;
    Ok(normalize::string_list_from_value(&extract_array(&reply)?))
}

async fn keywords(
    llm: &dyn CompletionService,
    note: &str,
    conversation: &str,
) -> Result<Vec<String>, AiError> {
    let reply = llm
        .generate(&prompt(KEYWORDS_PROMPT, note, conversation), &LIST_OPTIONS)
        .await?;
    let mut keywords = normalize::string_list_from_value(&extract_array(&reply)?);
    keywords.truncate(MAX_KEYWORDS);
    Ok(keywords)
}

async fn prescriptions(
    llm: &dyn CompletionService,
    note: &str,
    conversation: &str,
) -> Result<Vec<Prescription>, AiError> {
    let reply = llm
        .generate(
            &prompt(PRESCRIPTIONS_PROMPT, note, conversation),
            &PRESCRIPTION_OPTIONS,
        )
        .await?;
    Ok(normalize::prescriptions_from_value(&extract_array(&reply)?))
}

async fn demographics(
    llm: &dyn CompletionService,
    note: &str,
    conversation: &str,
) -> Result<PatientDemographics, AiError> {
    let reply = llm
        .generate(
            &prompt(DEMOGRAPHICS_PROMPT, note, conversation),
            &DEMOGRAPHICS_OPTIONS,
        )
        .await?;
    let value = extract_object(&reply)?;
    let field = |key: &str| {
        value
            .get(key)
            .and_then(normalize::scalar_text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    };

    Ok(PatientDemographics {
        name: field("name"),
        age: field("age"),
        gender: field("gender"),
    })
}
