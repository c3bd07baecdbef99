//! Relevance ranking of matched candidates

use clinai_core::{PatientRecord, RankedCandidate, SearchSpecification};
use serde_json::Value as JsonValue;

use crate::ai::json::extract_array;
use crate::ai::{AiError, CompletionService, GenerationOptions};

/// Most results returned per search
pub const MAX_RESULTS: usize = 5;

/// Results scoring below this are dropped unless nothing reaches it
pub const MIN_RELEVANCE: u8 = 60;

/// Candidate sets this small are ranked without the LLM
pub const SMALL_SET: usize = 3;

const DIRECT_MATCH_REASON: &str = "Direct keyword match";
const POSITIONAL_REASON: &str = "Ranked by match order";
const UNSCORED_REASON: &str = "Not scored";
const NO_REASON: &str = "No reason given";

const OPTIONS: GenerationOptions = GenerationOptions::json(0.1, 2048);

/// Score, sort and trim `candidates` for `query`
pub async fn rank(
    llm: &dyn CompletionService,
    query: &str,
    spec: &SearchSpecification,
    candidates: Vec<PatientRecord>,
) -> Vec<RankedCandidate> {
    if candidates.is_empty() {
        return Vec::new();
    }

    if candidates.len() <= SMALL_SET {
        return finalize(positional(candidates, 95, 75, DIRECT_MATCH_REASON));
    }

    let scored = match request_scores(llm, query, spec, &candidates).await {
        Ok(entries) if entries.len() == candidates.len() => apply_scores(candidates, &entries),
        Ok(entries) => {
            tracing::warn!(
                expected = candidates.len(),
                received = entries.len(),
                "Ranking reply length mismatch, using positional scores"
            );
            metrics::counter!("search_fallbacks_total", "stage" => "ranker").increment(1);
            positional(candidates, 90, 40, POSITIONAL_REASON)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Ranking failed, using positional scores");
            metrics::counter!("search_fallbacks_total", "stage" => "ranker").increment(1);
            positional(candidates, 85, 40, POSITIONAL_REASON)
        }
    };

    finalize(scored)
}

/// `start - 5 * index`, floored at `floor`
fn positional(
    candidates: Vec<PatientRecord>,
    start: u8,
    floor: u8,
    reason: &str,
) -> Vec<RankedCandidate> {
    candidates
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let step = u8::try_from(i.saturating_mul(5)).unwrap_or(u8::MAX);
            let score = start.saturating_sub(step).max(floor);
            RankedCandidate::new(record, score, reason)
        })
        .collect()
}

/// Stable sort by descending score, keep relevant results, cap the count
fn finalize(mut ranked: Vec<RankedCandidate>) -> Vec<RankedCandidate> {
    ranked.sort_by(|a, b| b.relevance_score.cmp(&a.relevance_score));

    if ranked.iter().any(|c| c.relevance_score >= MIN_RELEVANCE) {
        ranked.retain(|c| c.relevance_score >= MIN_RELEVANCE);
    } else {
        ranked.truncate(1);
    }
    ranked.truncate(MAX_RESULTS);
    ranked
}

/// One element of the model's scoring reply
#[derive(Debug, Clone, PartialEq)]
struct ScoreEntry {
    candidate_index: Option<usize>,
    relevance_score: u8,
    reason: String,
}

impl ScoreEntry {
    fn from_value(value: &JsonValue) -> Self {
        let number = |key: &str| {
            value.get(key).and_then(|v| match v {
                JsonValue::Number(n) => n.as_f64(),
                JsonValue::String(s) => s.trim().parse().ok(),
                _ => None,
            })
        };

        Self {
            candidate_index: number("candidateIndex")
                .filter(|i| *i >= 0.0 && i.fract() == 0.0)
                .map(|i| i as usize),
            relevance_score: number("relevanceScore")
                .map(|s| s.round().clamp(0.0, 100.0) as u8)
                .unwrap_or(0),
            reason: value
                .get("reason")
                .and_then(JsonValue::as_str)
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .unwrap_or(NO_REASON)
                .to_string(),
        }
    }
}

fn apply_scores(candidates: Vec<PatientRecord>, entries: &[ScoreEntry]) -> Vec<RankedCandidate> {
    let mut scores: Vec<Option<(u8, &str)>> = vec![None; candidates.len()];
    for entry in entries {
        match entry.candidate_index {
            Some(i) if i < scores.len() => {
                scores[i] = Some((entry.relevance_score, entry.reason.as_str()));
            }
            _ => tracing::debug!(?entry, "Ignoring score for unknown candidate"),
        }
    }

    candidates
        .into_iter()
        .zip(scores)
        .map(|(record, score)| {
            let (score, reason) = score.unwrap_or((0, UNSCORED_REASON));
            RankedCandidate::new(record, score, reason)
        })
        .collect()
}

async fn request_scores(
    llm: &dyn CompletionService,
    query: &str,
    spec: &SearchSpecification,
    candidates: &[PatientRecord],
) -> Result<Vec<ScoreEntry>, AiError> {
    let prompt = build_prompt(query, spec, candidates);
    let reply = llm.generate(&prompt, &OPTIONS).await?;

    match extract_array(&reply)? {
        JsonValue::Array(items) => Ok(items.iter().map(ScoreEntry::from_value).collect()),
        _ => Err(AiError::InvalidJson("expected an array".to_string())),
    }
}

fn build_prompt(query: &str, spec: &SearchSpecification, candidates: &[PatientRecord]) -> String {
    let profiles: Vec<String> = candidates
        .iter()
        .enumerate()
        .map(|(i, record)| profile(i, record))
        .collect();

    let context = serde_json::to_string(spec).unwrap_or_default();

    format!(
        r#"You are a clinical search ranking assistant. Score how relevant each patient is to the doctor's query.

Query: "{query}"
Structured query: {context}

Patients:
{patients}

Scoring bands:
- 90-100: near-perfect match on condition and demographics
- 80-89: strong match
- 70-79: moderate match
- 60-69: partial match
- 40-59: weak match
- 0-39: irrelevant

Return ONLY a JSON array with one entry per patient, in any order:
[{{"candidateIndex": <patient index>, "relevanceScore": <0-100>, "reason": "<one short sentence>"}}]"#,
        patients = profiles.join("\n\n"),
    )
}

fn profile(index: usize, record: &PatientRecord) -> String {
    format!(
        "[{index}] Patient {id}: {name}, age {age}, gender {gender}\n\
         Keywords: {keywords}\n\
         Summary: {summary}\n\
         Prescriptions: {prescriptions}\n\
         Timeline: {timeline}",
        id = record.patient_id,
        name = record.name,
        age = record.age,
        gender = record.gender,
        keywords = excerpt(&record.keywords_text(), 200),
        summary = excerpt(&record.summary, 300),
        prescriptions = excerpt(&record.prescriptions_text(), 200),
        timeline = excerpt(&record.timeline_text(), 200),
    )
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
