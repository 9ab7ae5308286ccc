//! Terminology cross-reference: free-text diagnosis → ICD-10-CM matches.
//!
//! This step is enrichment, so it fails soft. A transport error, a non-2xx
//! status, a body that is not JSON, or JSON of the wrong shape all produce an
//! empty match list and a `warn!` line, never an `Err`.
//!
//! ## Response shape
//!
//! The NLM Clinical Tables search API answers with a positional array:
//!
//! ```text
//! [ total, [codes...], extra, [[code, name], [code, name], ...] ]
//!    0         1         2                 3
//! ```
//!
//! Only element 3 carries the `[code, description]` pairs.

use crate::config::AnalysisConfig;
use crate::error::Icd10Error;
use crate::output::TerminologyMatch;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Index of the `[code, description]` pair list in the search response.
const PAIRS_INDEX: usize = 3;

/// A terminology search backend.
#[async_trait]
pub trait TerminologySearch: Send + Sync {
    /// Best matches for `query`, at most `max_results`. Empty on any failure.
    async fn search(&self, query: &str, max_results: usize) -> Vec<TerminologyMatch>;
}

/// Client for the NLM Clinical Tables ICD-10-CM search API.
#[derive(Debug, Clone)]
pub struct ClinicalTablesClient {
    client: reqwest::Client,
    url: String,
}

impl ClinicalTablesClient {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self, Icd10Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Icd10Error::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn from_config(config: &AnalysisConfig) -> Result<Self, Icd10Error> {
        Self::new(&config.terminology_url, config.terminology_timeout_secs)
    }

    async fn fetch(&self, query: &str, max_results: usize) -> Result<Value, String> {
        let max = max_results.to_string();
        let url = reqwest::Url::parse_with_params(
            &self.url,
            &[("sf", "code,name"), ("terms", query), ("maxList", max.as_str())],
        )
        .map_err(|e| format!("bad terminology URL '{}': {e}", self.url))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }
        let body = response.bytes().await.map_err(|e| e.to_string())?;
        serde_json::from_slice(&body).map_err(|e| format!("invalid JSON: {e}"))
    }
}

#[async_trait]
impl TerminologySearch for ClinicalTablesClient {
    async fn search(&self, query: &str, max_results: usize) -> Vec<TerminologyMatch> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        match self.fetch(query, max_results).await {
            Ok(body) => {
                let mut matches = parse_search_response(&body);
                matches.truncate(max_results);
                debug!("Terminology '{}': {} matches", query, matches.len());
                matches
            }
            Err(e) => {
                warn!("Terminology lookup for '{}' failed: {}", query, e);
                Vec::new()
            }
        }
    }
}

/// Extract the `[code, description]` pairs from a search response.
///
/// Anything that does not fit the expected shape is treated as "no
/// results". Individual malformed pairs are skipped.
pub fn parse_search_response(body: &Value) -> Vec<TerminologyMatch> {
    let Some(pairs) = body
        .as_array()
        .and_then(|items| items.get(PAIRS_INDEX))
        .and_then(Value::as_array)
    else {
        debug!("Terminology response carries no result pairs");
        return Vec::new();
    };

    pairs
        .iter()
        .filter_map(|pair| {
            let pair = pair.as_array()?;
            let code = pair.first()?.as_str()?;
            let description = pair.get(1)?.as_str()?;
            Some(TerminologyMatch {
                code: code.to_string(),
                description: description.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_pairs_at_index_three() {
        let body = json!([
            2,
            ["L72.0", "L72.3"],
            null,
            [["L72.0", "Epidermal cyst"], ["L72.3", "Sebaceous cyst"]]
        ]);
        let matches = parse_search_response(&body);
        assert_eq!(
            matches,
            vec![
                TerminologyMatch {
                    code: "L72.0".into(),
                    description: "Epidermal cyst".into()
                },
                TerminologyMatch {
                    code: "L72.3".into(),
                    description: "Sebaceous cyst".into()
                },
            ]
        );
    }

    #[test]
    fn missing_index_three_is_empty() {
        assert!(parse_search_response(&json!([0, [], null])).is_empty());
    }

    #[test]
    fn null_index_three_is_empty() {
        assert!(parse_search_response(&json!([0, [], null, null])).is_empty());
    }

    #[test]
    fn non_array_body_is_empty() {
        assert!(parse_search_response(&json!({"error": "bad request"})).is_empty());
        assert!(parse_search_response(&json!("oops")).is_empty());
    }

    #[test]
    fn malformed_pairs_are_skipped() {
        let body = json!([3, [], null, [["J44.9", "COPD"], ["only-code"], 42, [1, 2]]]);
        let matches = parse_search_response(&body);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].code, "J44.9");
    }

    #[tokio::test]
    async fn unreachable_service_fails_soft() {
        let client = ClinicalTablesClient::new("http://127.0.0.1:9/api/icd10cm/v3/search", 2)
            .expect("client builds");
        assert!(client.search("epidermal cyst", 3).await.is_empty());
    }

    #[tokio::test]
    async fn invalid_url_fails_soft() {
        let client = ClinicalTablesClient::new("not a url", 2).expect("client builds");
        assert!(client.search("epidermal cyst", 3).await.is_empty());
    }

    #[tokio::test]
    async fn blank_query_skips_request() {
        let client = ClinicalTablesClient::new("http://127.0.0.1:9/", 2).expect("client builds");
        assert!(client.search("   ", 3).await.is_empty());
    }
}
