use std::pin::Pin;

use async_stream::stream;
use bytes::Bytes;
use futures::{pin_mut, Stream, StreamExt};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_json::json;

use crate::configuration::OpenAiSettings;
use crate::domain::entities::prompt::Prompt;
use crate::helper::error_chain_fmt;

/// Service streaming a chat completion for an assembled prompt,
/// using an OpenAI-compatible chat-completions API in SSE mode
pub struct OpenAiCompletionService {
    client: reqwest::Client,
    base_url: String,
    api_key: Secret<String>,
    model: String,
}

/// The lazy sequence of text deltas for one completion
pub type CompletionStream =
    Pin<Box<dyn Stream<Item = Result<Bytes, OpenAiCompletionServiceError>> + Send>>;

#[derive(Deserialize)]
struct CompletionChunk {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    delta: CompletionDelta,
}

#[derive(Deserialize)]
struct CompletionDelta {
    content: Option<String>,
}

impl OpenAiCompletionService {
    pub fn new(client: reqwest::Client, settings: &OpenAiSettings) -> Self {
        Self {
            client,
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
            model: settings.completion_model.clone(),
        }
    }

    /// Starts a streaming completion and returns the lazy sequence of text
    /// deltas, already decoded from the upstream SSE framing.
    ///
    /// The sequence is finite and not restartable. Dropping it drops the
    /// upstream response, which releases the connection: a client that
    /// disconnects mid-answer implicitly cancels the upstream read.
    #[tracing::instrument(name = "Starting completion stream", skip(self, prompt))]
    pub async fn stream_completion(
        &self,
        prompt: Prompt,
    ) -> Result<CompletionStream, OpenAiCompletionServiceError> {
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&json!({
                "model": self.model,
                "messages": prompt.into_messages(),
                "stream": true,
            }))
            .send()
            .await
            .map_err(|error| {
                OpenAiCompletionServiceError::UpstreamFailure(format!(
                    "transport error: {error}"
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OpenAiCompletionServiceError::UpstreamFailure(format!(
                "status {status}: {body}"
            )));
        }

        Ok(Box::pin(delta_stream(response.bytes_stream())))
    }
}

/// Decodes an SSE byte stream into content deltas.
///
/// Network chunks do not align with event boundaries, so bytes are buffered
/// until a full line is available. Deltas are forwarded in arrival order and
/// never re-chunked: concatenating them reproduces the full answer. A read
/// or parse failure ends the stream with a single terminal error, truncating
/// the output.
fn delta_stream<S, E>(
    byte_stream: S,
) -> impl Stream<Item = Result<Bytes, OpenAiCompletionServiceError>>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    stream! {
        pin_mut!(byte_stream);
        let mut buffer = String::new();

        while let Some(chunk) = byte_stream.next().await {
            let chunk = match chunk {
                Ok(bytes) => bytes,
                Err(error) => {
                    yield Err(OpenAiCompletionServiceError::StreamFailure(format!(
                        "read error: {error}"
                    )));
                    return;
                }
            };

            buffer.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(position) = buffer.find('\n') {
                let line: String = buffer.drain(..=position).collect();
                match parse_completion_line(line.trim()) {
                    Some(Ok(delta)) => yield Ok(Bytes::from(delta)),
                    Some(Err(error)) => {
                        yield Err(error);
                        return;
                    }
                    None => {}
                }
            }
        }

        // Upstream closed; the buffer holds at most a final newline-less line
        match parse_completion_line(buffer.trim()) {
            Some(Ok(delta)) => yield Ok(Bytes::from(delta)),
            Some(Err(error)) => yield Err(error),
            None => {}
        }
    }
}

/// Parses a single SSE line. Returns:
/// - `Some(Ok(content))` for a non-empty content delta
/// - `Some(Err(_))` for an unparseable event payload
/// - `None` to skip (empty lines, non-data lines, `[DONE]`, role-only or
///   empty deltas)
fn parse_completion_line(
    line: &str,
) -> Option<Result<String, OpenAiCompletionServiceError>> {
    if line.is_empty() {
        return None;
    }

    let data = line.strip_prefix("data:")?.trim();

    if data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<CompletionChunk>(data) {
        Ok(chunk) => {
            let content = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .unwrap_or_default();
            if content.is_empty() {
                return None;
            }
            Some(Ok(content))
        }
        Err(error) => Some(Err(OpenAiCompletionServiceError::StreamFailure(format!(
            "unparseable event: {error}"
        )))),
    }
}

#[derive(thiserror::Error)]
pub enum OpenAiCompletionServiceError {
    /// The request to start streaming was rejected
    #[error("Chat completions API call failed: {0}")]
    UpstreamFailure(String),
    /// The stream broke after it had started; output is truncated
    #[error("Chat completions stream failed mid-response: {0}")]
    StreamFailure(String),
}

impl std::fmt::Debug for OpenAiCompletionServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
