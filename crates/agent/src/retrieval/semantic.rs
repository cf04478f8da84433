use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use storefront_core::domain::product::ProductId;
use storefront_core::domain::tenant::TenantId;

#[derive(Clone, Debug, PartialEq)]
pub struct SemanticMatch {
    pub product_id: ProductId,
    pub score: f32,
}

#[derive(Debug, Error)]
pub enum SemanticError {
    #[error("semantic search request failed: {0}")]
    Request(String),
    #[error("semantic search returned status {status}: {message}")]
    Server { status: u16, message: String },
    #[error("semantic search response could not be parsed: {0}")]
    Parse(String),
}

/// Vector-similarity collaborator. Matches come back best first.
#[async_trait]
pub trait SemanticSearch: Send + Sync {
    async fn search_similar(
        &self,
        text: &str,
        tenant_id: &TenantId,
        limit: usize,
    ) -> Result<Vec<SemanticMatch>, SemanticError>;
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    tenant_id: &'a str,
    limit: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    id: String,
    #[serde(default)]
    score: f32,
}

/// Talks to an embedding service exposing `POST {base_url}/search`.
pub struct HttpSemanticSearch {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSemanticSearch {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SemanticError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| SemanticError::Request(error.to_string()))?;
        Ok(Self { client, endpoint: format!("{}/search", base_url.trim_end_matches('/')) })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SemanticSearch for HttpSemanticSearch {
    async fn search_similar(
        &self,
        text: &str,
        tenant_id: &TenantId,
        limit: usize,
    ) -> Result<Vec<SemanticMatch>, SemanticError> {
        let body = SearchRequest { query: text, tenant_id: &tenant_id.0, limit };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|error| SemanticError::Request(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SemanticError::Server { status: status.as_u16(), message });
        }

        let parsed: SearchResponse =
            response.json().await.map_err(|error| SemanticError::Parse(error.to_string()))?;
        Ok(parse_hits(parsed))
    }
}

fn parse_hits(response: SearchResponse) -> Vec<SemanticMatch> {
    response
        .results
        .into_iter()
        .filter(|hit| !hit.id.trim().is_empty())
        .map(|hit| SemanticMatch { product_id: ProductId(hit.id), score: hit.score })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{parse_hits, HttpSemanticSearch, SearchResponse};

    #[test]
    fn endpoint_joins_base_url_without_double_slash() {
        let search = HttpSemanticSearch::new("http://embeddings:9000/", Duration::from_millis(500))
            .expect("client");
        assert_eq!(search.endpoint(), "http://embeddings:9000/search");
    }

    #[test]
    fn hits_keep_service_order_and_skip_blank_ids() {
        let response: SearchResponse = serde_json::from_str(
            r#"{"results":[{"id":"p-2","score":0.91},{"id":" ","score":0.5},{"id":"p-1"}]}"#,
        )
        .expect("parse");

        let hits = parse_hits(response);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].product_id.0, "p-2");
        assert_eq!(hits[1].score, 0.0);
    }

    #[test]
    fn missing_results_field_means_no_hits() {
        let response: SearchResponse = serde_json::from_str("{}").expect("parse");
        assert!(parse_hits(response).is_empty());
    }
}
