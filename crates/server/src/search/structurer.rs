//! Free-text query to structured search specification

use clinai_core::SearchSpecification;

use crate::ai::json::extract_object;
use crate::ai::{AiError, CompletionService, GenerationOptions};

const PROMPT: &str = r#"You are a clinical search assistant. Convert the doctor's free-text query into medical search terms.

Return ONLY a JSON object with these keys:
- "requiredTerms": array of medical concepts the matching records must relate to
- "optionalTerms": array of related concepts that would make a record more relevant
- "synonyms": array of synonyms and abbreviations of the required terms
- "impliedConditions": array of conditions implied by the query
- "demographics": object with optional "gender" ("male" or "female") and "ageRange" ("<min>-<max>" or "<min>+")
- "medicalContext": one sentence interpreting the query clinically
- "originalQuery": the query verbatim

Examples:
- "chest pain in elderly male" → {"requiredTerms": ["chest pain"], "synonyms": ["angina"], "impliedConditions": ["coronary artery disease"], "demographics": {"gender": "male", "ageRange": "65+"}}
- "young women with asthma" → {"requiredTerms": ["asthma"], "demographics": {"gender": "female", "ageRange": "18-35"}}

Only include demographics that the query states or clearly implies.

Query: "#;

const OPTIONS: GenerationOptions = GenerationOptions::json(0.1, 1024);

/// Structure `query` with the LLM. Never fails: any call or parse error
/// yields [`SearchSpecification::fallback`].
pub async fn structure(llm: &dyn CompletionService, query: &str) -> SearchSpecification {
    match request_specification(llm, query).await {
        Ok(spec) => spec.anchored_to(query),
        Err(e) => {
            tracing::warn!(query, error = %e, "Query structuring failed, using fallback");
            metrics::counter!("search_fallbacks_total", "stage" => "structurer").increment(1);
            SearchSpecification::fallback(query)
        }
    }
}

async fn request_specification(
    llm: &dyn CompletionService,
    query: &str,
) -> Result<SearchSpecification, AiError> {
    let prompt = format!("{PROMPT}{query}");
    let reply = llm.generate(&prompt, &OPTIONS).await?;
    let value = extract_object(&reply)?;
    serde_json::from_value(value).map_err(|e| AiError::InvalidJson(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::ScriptedLlm;

    #[tokio::test]
    async fn parses_model_reply() {
        let llm = ScriptedLlm::replying(
            r#"```json
{"requiredTerms": ["chest pain"], "demographics": {"gender": "male", "ageRange": "65+"}}
```"#,
        );
        let spec = structure(&llm, "chest pain in elderly male").await;

        assert_eq!(spec.required_terms, vec!["chest pain"]);
        assert_eq!(spec.demographics.gender.as_deref(), Some("male"));
        assert_eq!(spec.demographics.age_range.as_deref(), Some("65+"));
        assert_eq!(spec.original_query, "chest pain in elderly male");
        assert_eq!(spec.medical_context, "chest pain in elderly male");
        assert!(
            llm.last_prompt()
                .unwrap()
                .ends_with("Query: chest pain in elderly male")
        );
    }

    #[tokio::test]
    async fn failed_call_yields_fallback() {
        let llm = ScriptedLlm::failing();
        let spec = structure(&llm, "sepsis after surgery").await;
        assert_eq!(spec, SearchSpecification::fallback("sepsis after surgery"));
    }

    #[tokio::test]
    async fn unparseable_reply_yields_fallback() {
        let llm = ScriptedLlm::replying("Sorry, I can't help with that.");
        let spec = structure(&llm, "copd").await;
        assert_eq!(spec.original_query, "copd");
        assert_eq!(spec.medical_context, "copd");
        assert_eq!(spec.combined_terms().count(), 0);
    }

    #[tokio::test]
    async fn mistyped_fields_take_defaults() {
        let llm = ScriptedLlm::replying(
            r#"{"requiredTerms": "diabetes", "synonyms": 7, "demographics": []}"#,
        );
        let spec = structure(&llm, "diabetics").await;
        assert_eq!(spec.required_terms, vec!["diabetes"]);
        assert_eq!(spec.synonyms, vec!["7"]);
        assert!(spec.demographics.is_empty());
    }
}
