use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::configuration::OpenAiSettings;
use crate::domain::entities::sanitized_query::SanitizedQuery;
use crate::helper::error_chain_fmt;

/// Service converting a sanitized query into its embedding vector,
/// using an OpenAI-compatible embeddings API
pub struct OpenAiEmbeddingsService {
    client: reqwest::Client,
    base_url: String,
    api_key: Secret<String>,
    model: String,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiEmbeddingsService {
    pub fn new(client: reqwest::Client, settings: &OpenAiSettings) -> Self {
        Self {
            client,
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
            model: settings.embedding_model.clone(),
        }
    }

    /// Embeds one query. A single failed call aborts the request: there is
    /// no retry, and the upstream cause is only surfaced through this error
    /// type so handlers can log it without echoing it to the client.
    #[tracing::instrument(name = "Embedding query", skip(self, query), fields(query_chars = query.as_ref().len()))]
    pub async fn embed(
        &self,
        query: &SanitizedQuery,
    ) -> Result<Vec<f32>, OpenAiEmbeddingsServiceError> {
        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&json!({
                "model": self.model,
                "input": query.as_ref(),
                "encoding_format": "float",
            }))
            .send()
            .await
            .map_err(|error| {
                OpenAiEmbeddingsServiceError::UpstreamFailure(format!(
                    "transport error: {error}"
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OpenAiEmbeddingsServiceError::UpstreamFailure(format!(
                "status {status}: {body}"
            )));
        }

        let body: EmbeddingsResponse = response.json().await.map_err(|error| {
            OpenAiEmbeddingsServiceError::UpstreamFailure(format!(
                "invalid response body: {error}"
            ))
        })?;

        let embedding = body
            .data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .ok_or_else(|| {
                OpenAiEmbeddingsServiceError::UpstreamFailure(
                    "response contained no embedding".to_string(),
                )
            })?;

        debug!(dimensions = embedding.len(), "Received embedding");
        Ok(embedding)
    }
}

#[derive(thiserror::Error)]
pub enum OpenAiEmbeddingsServiceError {
    /// Transport, auth, quota or malformed-response failure from the
    /// embeddings API. The detail stays in server-side logs.
    #[error("Embeddings API call failed: {0}")]
    UpstreamFailure(String),
}

impl std::fmt::Debug for OpenAiEmbeddingsServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
