//! Semantic search: structure the query, match candidates, rank them

pub mod matcher;
pub mod ranker;
pub mod structurer;

use std::sync::Arc;

use clinai_core::RankedCandidate;

use crate::ai::CompletionService;
use crate::db::RecordStore;

/// Candidates fetched from the store per search unless configured otherwise
pub const DEFAULT_MAX_CANDIDATES: usize = 20;

/// Runs one search request through structurer, matcher and ranker in turn
pub struct SearchPipeline {
    store: Arc<dyn RecordStore>,
    llm: Arc<dyn CompletionService>,
    max_candidates: usize,
}

impl SearchPipeline {
    pub fn new(store: Arc<dyn RecordStore>, llm: Arc<dyn CompletionService>) -> Self {
        Self {
            store,
            llm,
            max_candidates: DEFAULT_MAX_CANDIDATES,
        }
    }

    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates.max(1);
        self
    }

    /// Search for records relevant to `query`.
    ///
    /// Never fails: LLM and store errors degrade to fallbacks, so the worst
    /// case is an empty result list.
    pub async fn run(&self, query: &str) -> Vec<RankedCandidate> {
        let spec = structurer::structure(self.llm.as_ref(), query).await;
        tracing::info!(
            query,
            required_terms = ?spec.required_terms,
            demographics = ?spec.demographics,
            "Structured search query"
        );

        let candidates =
            matcher::find_candidates(self.store.as_ref(), &spec, self.max_candidates).await;
        tracing::info!(query, candidates = candidates.len(), "Matched candidates");

        let ranked = ranker::rank(self.llm.as_ref(), query, &spec, candidates).await;
        tracing::info!(query, results = ranked.len(), "Ranked search results");
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::ScriptedLlm;
    use crate::db::MemoryRecordStore;
    use clinai_core::PatientRecord;

    fn record(id: &str, keywords: &[&str], gender: &str, age: &str) -> PatientRecord {
        let mut record = PatientRecord::new(id, "", "");
        record.keywords = keywords.iter().map(|k| k.to_string()).collect();
        record.gender = gender.into();
        record.age = age.into();
        record
    }

    #[tokio::test]
    async fn chest_pain_in_elderly_male() {
        let store = MemoryRecordStore::with_records([
            record("a", &["chest pain", "hypertension"], "male", "70"),
            record("b", &["chest pain"], "male", "50"),
            record("c", &["Chest Pain"], "Male", "81"),
            record("d", &["migraine"], "male", "75"),
        ]);
        let llm = ScriptedLlm::replying(
            r#"{"requiredTerms": ["chest pain"], "demographics": {"gender": "male", "ageRange": "65+"}}"#,
        );
        let pipeline = SearchPipeline::new(Arc::new(store), Arc::new(llm));

        let results = pipeline.run("chest pain in elderly male").await;
        let ids: Vec<_> = results.iter().map(|r| r.record.patient_id.as_str()).collect();
        let scores: Vec<_> = results.iter().map(|r| r.relevance_score).collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert_eq!(scores, vec![95, 90]);
    }

    #[tokio::test]
    async fn respects_candidate_cap() {
        let store = MemoryRecordStore::with_records(
            (0..10).map(|i| record(&i.to_string(), &["asthma"], "female", "30")),
        );
        let llm = ScriptedLlm::failing();
        let pipeline =
            SearchPipeline::new(Arc::new(store), Arc::new(llm)).with_max_candidates(2);

        let results = pipeline.run("asthma").await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].record.patient_id, "9");
    }
}
