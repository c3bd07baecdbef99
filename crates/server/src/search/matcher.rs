//! Candidate lookup from a structured search specification

use clinai_core::{PatientRecord, SearchSpecification};

use crate::db::{AgeBound, KeywordMatch, RecordFilter, RecordStore};

/// Terms this short or shorter are dropped as noise
const MIN_TERM_LEN: usize = 2;

/// Translate `spec` into a store filter.
///
/// Keyword terms come from required terms, synonyms and implied conditions.
/// When none survive the noise filter the medical context, then the original
/// query, is matched instead, and as a last resort any record with keywords.
pub fn build_filter(spec: &SearchSpecification) -> RecordFilter {
    let terms: Vec<String> = spec
        .combined_terms()
        .map(str::trim)
        .filter(|t| t.chars().count() > MIN_TERM_LEN)
        .map(str::to_string)
        .collect();

    let keywords = if !terms.is_empty() {
        KeywordMatch::AnyOf(terms)
    } else {
        [&spec.medical_context, &spec.original_query]
            .into_iter()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .map(|s| KeywordMatch::AnyOf(vec![s.to_string()]))
            .unwrap_or(KeywordMatch::Present)
    };

    let gender = spec
        .demographics
        .gender
        .as_deref()
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string);

    let age = spec.demographics.age_range.as_deref().and_then(|range| {
        let bound = AgeBound::parse(range);
        if bound.is_none() {
            tracing::warn!(age_range = range, "Ignoring unparseable age range");
        }
        bound
    });

    RecordFilter {
        keywords,
        gender,
        age,
    }
}

/// Fetch up to `max_candidates` records matching `spec`.
///
/// Store failures are logged and reported as no candidates.
pub async fn find_candidates(
    store: &dyn RecordStore,
    spec: &SearchSpecification,
    max_candidates: usize,
) -> Vec<PatientRecord> {
    let filter = build_filter(spec);
    tracing::debug!(?filter, "Built record filter");

    match store.find(&filter, max_candidates).await {
        Ok(records) => records,
        Err(e) => {
            tracing::error!(error = %e, "Candidate lookup failed");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryRecordStore;
    use clinai_core::DemographicConstraints;

    fn spec(required: &[&str], gender: Option<&str>, age: Option<&str>) -> SearchSpecification {
        SearchSpecification {
            required_terms: required.iter().map(|t| t.to_string()).collect(),
            demographics: DemographicConstraints {
                gender: gender.map(str::to_string),
                age_range: age.map(str::to_string),
            },
            ..SearchSpecification::fallback("query text")
        }
    }

    #[test]
    fn short_terms_are_dropped() {
        let mut s = spec(&["mi", "  ", "chest pain"], None, None);
        s.synonyms = vec!["cp".into(), "angina".into()];
        s.implied_conditions = vec!["cad".into()];
        s.optional_terms = vec!["ignored".into()];

        assert_eq!(
            build_filter(&s).keywords,
            KeywordMatch::AnyOf(vec!["chest pain".into(), "angina".into(), "cad".into()])
        );
    }

    #[test]
    fn falls_back_to_context_then_query() {
        let mut s = spec(&["mi"], None, None);
        s.medical_context = "Acute myocardial infarction".into();
        assert_eq!(
            build_filter(&s).keywords,
            KeywordMatch::AnyOf(vec!["Acute myocardial infarction".into()])
        );

        s.medical_context = " ".into();
        assert_eq!(
            build_filter(&s).keywords,
            KeywordMatch::AnyOf(vec!["query text".into()])
        );

        s.original_query = String::new();
        assert_eq!(build_filter(&s).keywords, KeywordMatch::Present);
    }

    #[test]
    fn demographic_constraints() {
        let filter = build_filter(&spec(&["copd"], Some("female"), Some("30-45")));
        assert_eq!(filter.gender.as_deref(), Some("female"));
        assert_eq!(filter.age, Some(AgeBound::Between { min: 30, max: 45 }));

        let filter = build_filter(&spec(&["copd"], Some(""), Some("65+")));
        assert_eq!(filter.gender, None);
        assert_eq!(filter.age.map(|a| a.bounds()), Some((65, None)));

        let filter = build_filter(&spec(&["copd"], None, Some("elderly")));
        assert_eq!(filter.age, None);
    }

    #[tokio::test]
    async fn store_failure_yields_no_candidates() {
        let store = MemoryRecordStore::new();
        store.close();
        let found = find_candidates(&store, &spec(&["copd"], None, None), 20).await;
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn raw_query_matches_keywords() {
        let mut record = PatientRecord::new("1", "", "");
        record.keywords = vec!["Query text".into()];
        let store = MemoryRecordStore::with_records([record]);

        let spec = SearchSpecification::fallback("query text");
        let found = find_candidates(&store, &spec, 20).await;
        assert_eq!(found.len(), 1);
    }
}
