//! Store-agnostic record filter
//!
//! Built by the candidate matcher, evaluated directly by the in-memory store
//! and translated into parameterized SQL by the PostgreSQL store. Both paths
//! implement the same semantics.

use clinai_core::PatientRecord;
use tokio_postgres::types::ToSql;

/// Keywords joined as text, whichever encoding the row uses
const KEYWORDS_TEXT: &str = "(CASE jsonb_typeof(data->'keywords') \
     WHEN 'array' THEN array_to_string(ARRAY(SELECT jsonb_array_elements_text(data->'keywords')), ', ') \
     ELSE COALESCE(data->>'keywords', '') END)";

/// Leading digits of the stored age; NULL (never matching) when non-numeric.
/// The digit cap matches `normalize::MAX_AGE_DIGITS`.
const NUMERIC_AGE: &str = r"substring(data->>'age' from '^\s*(\d{1,9})')::int";

/// Separators accepted between the bounds of an age range
const RANGE_SEPARATORS: [char; 3] = ['-', '\u{2013}', '\u{2014}'];

pub type SqlParams = Vec<Box<dyn ToSql + Sync + Send>>;

/// How the `keywords` field must match
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeywordMatch {
    /// Case-insensitive substring match on any of the terms
    AnyOf(Vec<String>),
    /// Any record with at least one keyword
    Present,
}

/// Inclusive age constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeBound {
    Between { min: u32, max: u32 },
    AtLeast(u32),
    Exactly(u32),
}

impl AgeBound {
    /// Parse `"30-45"` (hyphen, en or em dash), `"65+"` or `"50"`.
    /// Anything else imposes no bound.
    pub fn parse(range: &str) -> Option<Self> {
        let range = range.trim();
        if let Some(min) = range.strip_suffix('+') {
            return min.trim().parse().ok().map(AgeBound::AtLeast);
        }
        if let Some((min, max)) = range.split_once(RANGE_SEPARATORS) {
            let min = min.trim().parse().ok()?;
            let max = max.trim().parse().ok()?;
            return Some(AgeBound::Between { min, max });
        }
        range.parse().ok().map(AgeBound::Exactly)
    }

    /// Inclusive (lower, upper) bounds
    pub fn bounds(&self) -> (u32, Option<u32>) {
        match *self {
            AgeBound::Between { min, max } => (min, Some(max)),
            AgeBound::AtLeast(min) => (min, None),
            AgeBound::Exactly(age) => (age, Some(age)),
        }
    }

    pub fn contains(&self, age: u32) -> bool {
        let (lower, upper) = self.bounds();
        age >= lower && upper.is_none_or(|upper| age <= upper)
    }
}

/// Conjunction of keyword, gender and age constraints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    pub keywords: KeywordMatch,
    /// Case-insensitive substring of the stored gender
    pub gender: Option<String>,
    pub age: Option<AgeBound>,
}

impl RecordFilter {
    pub fn matches(&self, record: &PatientRecord) -> bool {
        let keywords_ok = match &self.keywords {
            KeywordMatch::AnyOf(terms) => {
                let haystack = record.keywords_text().to_lowercase();
                terms.iter().any(|t| haystack.contains(&t.to_lowercase()))
            }
            KeywordMatch::Present => !record.keywords.is_empty(),
        };

        let gender_ok = self
            .gender
            .as_ref()
            .is_none_or(|g| record.gender.to_lowercase().contains(&g.to_lowercase()));

        let age_ok = self
            .age
            .is_none_or(|bound| record.numeric_age().is_some_and(|age| bound.contains(age)));

        keywords_ok && gender_ok && age_ok
    }

    /// Render as a `SELECT data` query returning at most `limit` rows
    pub fn to_sql(&self, limit: usize) -> (String, SqlParams) {
        let mut clauses = Vec::new();
        let mut params: SqlParams = Vec::new();

        match &self.keywords {
            KeywordMatch::AnyOf(terms) => {
                let patterns: Vec<String> = terms
                    .iter()
                    .map(|t| format!("%{}%", escape_like(t)))
                    .collect();
                params.push(Box::new(patterns));
                clauses.push(format!("{KEYWORDS_TEXT} ILIKE ANY(${})", params.len()));
            }
            KeywordMatch::Present => clauses.push(format!("{KEYWORDS_TEXT} <> ''")),
        }

        if let Some(gender) = &self.gender {
            params.push(Box::new(format!("%{}%", escape_like(gender))));
            clauses.push(format!(
                "COALESCE(data->>'gender', '') ILIKE ${}",
                params.len()
            ));
        }

        if let Some(bound) = self.age {
            let (lower, upper) = bound.bounds();
            params.push(Box::new(sql_int(lower)));
            clauses.push(format!("{NUMERIC_AGE} >= ${}", params.len()));
            if let Some(upper) = upper {
                params.push(Box::new(sql_int(upper)));
                clauses.push(format!("{NUMERIC_AGE} <= ${}", params.len()));
            }
        }

        params.push(Box::new(limit as i64));
        let sql = format!(
            "SELECT data FROM patient_records WHERE {} ORDER BY updated_at DESC LIMIT ${}",
            clauses.join(" AND "),
            params.len()
        );
        (sql, params)
    }
}

fn sql_int(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Escape special characters for LIKE patterns
fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
