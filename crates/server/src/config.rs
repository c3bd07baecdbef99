//! Server configuration

use std::str::FromStr;

use crate::search::DEFAULT_MAX_CANDIDATES;

/// Server configuration loaded from environment variables
pub struct Config {
    /// PostgreSQL connection string; `None` selects the in-memory store
    pub database_url: Option<String>,
    pub bind_address: String,
    pub api_key: Option<String>,
    pub cors_origins: Vec<String>,
    pub rate_limit_rps: u32,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: Option<String>,
    pub llm_timeout_secs: u64,
    pub max_candidates: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let parsed = |key: &str, default: u64| -> u64 { parse_or(var(key), default) };

        Self {
            database_url: var("DATABASE_URL"),
            bind_address: var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8000".into()),
            api_key: var("API_KEY"),
            cors_origins: var("CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_else(|| vec!["*".to_string()]),
            rate_limit_rps: parsed("RATE_LIMIT_RPS", 100) as u32,
            anthropic_api_key: var("ANTHROPIC_API_KEY"),
            anthropic_model: var("ANTHROPIC_MODEL"),
            llm_timeout_secs: parsed("LLM_TIMEOUT_SECS", 60),
            max_candidates: parsed("SEARCH_MAX_CANDIDATES", DEFAULT_MAX_CANDIDATES as u64) as usize,
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    match value {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(value = %raw, "Ignoring unparseable configuration value");
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg.database_url, None);
        assert_eq!(cfg.bind_address, "0.0.0.0:8000");
        assert_eq!(cfg.cors_origins, vec!["*"]);
        assert_eq!(cfg.rate_limit_rps, 100);
        assert_eq!(cfg.llm_timeout_secs, 60);
        assert_eq!(cfg.max_candidates, 20);
        assert!(cfg.anthropic_api_key.is_none());
    }

    #[test]
    fn reads_and_trims_values() {
        let cfg = config(&[
            ("DATABASE_URL", " postgres://localhost/clinai "),
            ("API_KEY", ""),
            ("CORS_ORIGINS", "http://a.test, http://b.test,"),
            ("RATE_LIMIT_RPS", "5"),
            ("SEARCH_MAX_CANDIDATES", "not-a-number"),
        ]);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/clinai"));
        assert_eq!(cfg.api_key, None);
        assert_eq!(cfg.cors_origins, vec!["http://a.test", "http://b.test"]);
        assert_eq!(cfg.rate_limit_rps, 5);
        assert_eq!(cfg.max_candidates, 20);
    }
}
