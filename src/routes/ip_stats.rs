use actix_web::http::header::ContentType;
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::PgPool;

use crate::domain::entities::client_ip::ClientIp;
use crate::helper::error_chain_fmt;
use crate::repositories::request_log_postgres_repository::{
    RequestLogPostgresRepository, RequestLogPostgresRepositoryError,
};

const RECENT_WINDOW_HOURS: i64 = 24;

#[derive(Debug, serde::Serialize)]
pub struct IpStatsResponseData {
    pub ip: String,
    pub total_requests: i64,
    pub recent_requests: i64,
}

/// Rate-display endpoint: how many requests the calling IP has made, overall
/// and within the last 24 hours.
///
/// Advisory only: clients compare `recent_requests` against their own limit
/// to disable input; nothing is enforced server-side.
#[tracing::instrument(name = "IP stats handler", skip(request, pool, request_log_repository))]
pub async fn ip_stats(
    request: HttpRequest,
    pool: web::Data<PgPool>,
    request_log_repository: web::Data<RequestLogPostgresRepository>,
) -> Result<HttpResponse, IpStatsError> {
    let ip = ClientIp::from_headers(request.headers()).to_string();

    let total_requests = request_log_repository
        .count_for_ip(pool.get_ref(), &ip)
        .await?;

    let since = Utc::now() - Duration::hours(RECENT_WINDOW_HOURS);
    let recent_requests = request_log_repository
        .count_for_ip_since(pool.get_ref(), &ip, since)
        .await?;

    Ok(HttpResponse::Ok().json(IpStatsResponseData {
        ip,
        total_requests,
        recent_requests,
    }))
}

#[derive(thiserror::Error)]
pub enum IpStatsError {
    #[error(transparent)]
    RepositoryError(#[from] RequestLogPostgresRepositoryError),
}

impl std::fmt::Debug for IpStatsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for IpStatsError {
    fn status_code(&self) -> StatusCode {
        match self {
            IpStatsError::RepositoryError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[tracing::instrument(name = "Response error from ip_stats handler", skip(self), fields(error = %self))]
    fn error_response(&self) -> HttpResponse<actix_web::body::BoxBody> {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(json!({ "error": "Failed to process request" }))
    }
}
