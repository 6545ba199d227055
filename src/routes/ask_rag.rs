use actix_web::http::header::{ContentType, USER_AGENT};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use futures::TryStreamExt;
use serde_json::json;
use sqlx::PgPool;
use tracing::{error, info};

use crate::domain::entities::client_ip::ClientIp;
use crate::domain::entities::request_log::RequestLogEntry;
use crate::domain::entities::sanitized_query::{SanitizedQuery, SanitizedQueryError};
use crate::domain::services::openai_completion_service::{
    OpenAiCompletionService, OpenAiCompletionServiceError,
};
use crate::domain::services::openai_embeddings_service::{
    OpenAiEmbeddingsService, OpenAiEmbeddingsServiceError,
};
use crate::domain::services::prompt_assembler::assemble_prompt;
use crate::helper::error_chain_fmt;
use crate::repositories::passage_pinecone_repository::{
    PassagePineconeRepository, PassagePineconeRepositoryError,
};
use crate::repositories::request_log_postgres_repository::RequestLogPostgresRepository;

/// Neighbors requested from the vector index on every query
const RETRIEVAL_TOP_K: usize = 50;

#[derive(Debug, serde::Deserialize)]
pub struct AskRagBodyData {
    query: String,
}

/// RAG chat endpoint: sanitize → embed → search → assemble → stream.
///
/// Stages run strictly in sequence; only the request-log write runs
/// alongside them, fire-and-forget. Validation short-circuits before any
/// upstream call is made.
#[tracing::instrument(
    name = "RAG chat handler",
    skip(
        request,
        pool,
        request_log_repository,
        embeddings_service,
        passage_repository,
        completion_service,
        body
    ),
    fields(query_chars = body.query.len())
)]
pub async fn ask_rag(
    request: HttpRequest,
    pool: web::Data<PgPool>,
    request_log_repository: web::Data<RequestLogPostgresRepository>,
    embeddings_service: web::Data<OpenAiEmbeddingsService>,
    passage_repository: web::Data<PassagePineconeRepository>,
    completion_service: web::Data<OpenAiCompletionService>,
    body: web::Json<AskRagBodyData>,
) -> Result<HttpResponse, AskRagError> {
    let query = SanitizedQuery::parse(&body.query)?;

    let client_ip = ClientIp::from_headers(request.headers());
    let user_agent = request
        .headers()
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    info!(ip = %client_ip, "Processing chat request");

    // Not on the critical path: the response may start streaming before this
    // write lands, and a logging outage never degrades chat
    let entry = RequestLogEntry::new(client_ip, &query, user_agent);
    let log_pool = pool.clone();
    let log_repository = request_log_repository.clone();
    tokio::spawn(async move {
        if let Err(error) = log_repository.add_entry(log_pool.get_ref(), &entry).await {
            error!(?error, "Failed to persist request log entry");
        }
    });

    let embedding = embeddings_service.embed(&query).await?;
    let passages = passage_repository
        .search(&embedding, RETRIEVAL_TOP_K)
        .await?;
    let prompt = assemble_prompt(&query, &passages);

    let completion_stream = completion_service.stream_completion(prompt).await?;

    // A failure after the first chunk cannot change the status line anymore;
    // the body stream ends with an error and the response is truncated
    let body_stream = completion_stream.inspect_err(|error| {
        error!(?error, "Completion stream aborted mid-response");
    });

    Ok(HttpResponse::Ok()
        .content_type(ContentType::plaintext())
        .streaming(body_stream))
}

#[derive(thiserror::Error)]
pub enum AskRagError {
    #[error("{0}")]
    ValidationError(#[from] SanitizedQueryError),
    #[error(transparent)]
    EmbeddingError(#[from] OpenAiEmbeddingsServiceError),
    #[error(transparent)]
    RetrievalError(#[from] PassagePineconeRepositoryError),
    #[error(transparent)]
    CompletionError(#[from] OpenAiCompletionServiceError),
}

impl std::fmt::Debug for AskRagError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for AskRagError {
    fn status_code(&self) -> StatusCode {
        match self {
            AskRagError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AskRagError::EmbeddingError(_)
            | AskRagError::RetrievalError(_)
            | AskRagError::CompletionError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[tracing::instrument(name = "Response error from ask_rag handler", skip(self), fields(error = %self))]
    fn error_response(&self) -> HttpResponse<actix_web::body::BoxBody> {
        // Validation errors are user-correctable and get the specific reason;
        // upstream failures only ever leak a generic message
        let message = match self.status_code() {
            StatusCode::BAD_REQUEST => self.to_string(),
            _ => "Failed to process request".to_string(),
        };

        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(json!({ "error": message }))
    }
}
