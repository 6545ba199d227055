use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::configuration::VectorIndexSettings;
use crate::domain::entities::context_passage::ContextPassage;
use crate::helper::error_chain_fmt;

/// Repository for the context passages stored in a Pinecone-style vector index.
///
/// The pipeline only ever queries the index; ingestion of the passages is a
/// separate, offline concern.
pub struct PassagePineconeRepository {
    client: reqwest::Client,
    index_host: String,
    api_key: Secret<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    metadata: Option<MatchMetadata>,
}

#[derive(Deserialize)]
struct MatchMetadata {
    text: Option<String>,
}

impl PassagePineconeRepository {
    pub fn new(client: reqwest::Client, settings: &VectorIndexSettings) -> Self {
        Self {
            client,
            index_host: settings.index_host.clone(),
            api_key: settings.api_key.clone(),
        }
    }

    /// Returns the stored text of the `top_k` nearest neighbors, in the
    /// descending similarity order the index provides.
    ///
    /// Matches without a stored text field, and matches whose text cleans to
    /// nothing, are dropped silently. Zero passages is a valid result: the
    /// prompt then falls back to general knowledge.
    #[tracing::instrument(
        name = "Searching vector index for similar passages",
        skip(self, vector)
    )]
    pub async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ContextPassage>, PassagePineconeRepositoryError> {
        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
        };

        let response = self
            .client
            .post(format!("{}/query", self.index_host))
            .header("Api-Key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                PassagePineconeRepositoryError::UpstreamFailure(format!(
                    "transport error: {error}"
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PassagePineconeRepositoryError::UpstreamFailure(format!(
                "status {status}: {body}"
            )));
        }

        let body: QueryResponse = response.json().await.map_err(|error| {
            PassagePineconeRepositoryError::UpstreamFailure(format!(
                "invalid response body: {error}"
            ))
        })?;

        let passages: Vec<ContextPassage> = body
            .matches
            .into_iter()
            .filter_map(|m| m.metadata.and_then(|metadata| metadata.text))
            .filter_map(|text| ContextPassage::parse(&text))
            .collect();

        debug!(passage_count = passages.len(), "Retrieved context passages");
        Ok(passages)
    }
}

#[derive(thiserror::Error)]
pub enum PassagePineconeRepositoryError {
    /// Transport, auth or malformed-response failure from the vector index.
    /// The detail stays in server-side logs.
    #[error("Vector index query failed: {0}")]
    UpstreamFailure(String),
}

impl std::fmt::Debug for PassagePineconeRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
