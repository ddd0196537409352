//! HTTP client for a Tavily-compatible `/search` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use leadpipe_shared::{LeadpipeError, Result, SearchConfig, resolve_secret};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use crate::ContentClassifier;

/// User-Agent string for search requests.
const USER_AGENT: &str = concat!("Leadpipe/", env!("CARGO_PKG_VERSION"));

const SERVICE: &str = "search";

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    include_domains: [&'a str; 1],
    max_results: u32,
    include_answer: bool,
    search_depth: &'static str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    content: String,
}

/// Search-backed [`ContentClassifier`].
///
/// Without an API key every search fails with a config error, which the
/// enrichment phase absorbs into its fallback record.
pub struct SearchClassifier {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    max_results: u32,
    timeout: Duration,
}

impl SearchClassifier {
    /// Create a classifier talking to `base_url`.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        max_results: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| LeadpipeError::config(format!("invalid search base_url '{base_url}': {e}")))?;
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| LeadpipeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/search", base.as_str().trim_end_matches('/')),
            api_key,
            max_results,
            timeout,
        })
    }

    /// Build from the `[search]` config section, reading the key from the environment.
    pub fn from_config(config: &SearchConfig, timeout: Duration) -> Result<Self> {
        Self::new(
            &config.base_url,
            resolve_secret(&config.api_key_env),
            config.max_results,
            timeout,
        )
    }

    /// Whether an API key is available.
    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl ContentClassifier for SearchClassifier {
    #[instrument(skip_all, fields(host = %scope_host))]
    async fn search(&self, query: &str, scope_host: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LeadpipeError::config("search API key not set"))?;

        let request = SearchRequest {
            query,
            include_domains: [scope_host],
            max_results: self.max_results,
            include_answer: true,
            search_depth: "advanced",
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LeadpipeError::timeout(SERVICE, self.timeout)
                } else {
                    LeadpipeError::Network(format!("{SERVICE}: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LeadpipeError::from_status(SERVICE, status.as_u16(), &body));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| LeadpipeError::Classifier(format!("malformed search response: {e}")))?;

        let mut parts: Vec<String> = Vec::with_capacity(parsed.results.len() + 1);
        if let Some(answer) = parsed.answer.filter(|a| !a.trim().is_empty()) {
            parts.push(answer);
        }
        parts.extend(
            parsed
                .results
                .into_iter()
                .map(|hit| hit.content)
                .filter(|c| !c.trim().is_empty()),
        );

        let text = parts.join("\n\n");
        debug!(chars = text.len(), "search returned content");
        Ok(text)
    }
}
