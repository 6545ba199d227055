use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, Row};

use crate::domain::entities::request_log::RequestLogEntry;
use crate::helper::error_chain_fmt;

/// Request-log repository implemented using Postgres
///
/// Each write is an independent insert with no cross-request mutation, so the
/// shared connection pool is the only synchronization needed.
pub struct RequestLogPostgresRepository {}

impl Default for RequestLogPostgresRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestLogPostgresRepository {
    pub fn new() -> Self {
        Self {}
    }

    #[tracing::instrument(name = "Saving request log entry", skip(self, db_executor, entry), fields(ip = %entry.ip))]
    pub async fn add_entry(
        &self,
        db_executor: impl PgExecutor<'_>,
        entry: &RequestLogEntry,
    ) -> Result<(), RequestLogPostgresRepositoryError> {
        sqlx::query(
            r#"
    INSERT INTO request_logs (id, ip, query, user_agent, timestamp)
    VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.ip)
        .bind(&entry.query)
        .bind(&entry.user_agent)
        .bind(entry.timestamp)
        .execute(db_executor)
        .await?;

        Ok(())
    }

    #[tracing::instrument(name = "Counting requests for IP", skip(self, db_executor))]
    pub async fn count_for_ip(
        &self,
        db_executor: impl PgExecutor<'_>,
        ip: &str,
    ) -> Result<i64, RequestLogPostgresRepositoryError> {
        let row = sqlx::query(
            r#"
    SELECT COUNT(*) AS count FROM request_logs
    WHERE ip = $1
            "#,
        )
        .bind(ip)
        .fetch_one(db_executor)
        .await?;

        Ok(row.try_get("count")?)
    }

    #[tracing::instrument(name = "Counting recent requests for IP", skip(self, db_executor))]
    pub async fn count_for_ip_since(
        &self,
        db_executor: impl PgExecutor<'_>,
        ip: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, RequestLogPostgresRepositoryError> {
        let row = sqlx::query(
            r#"
    SELECT COUNT(*) AS count FROM request_logs
    WHERE ip = $1 AND timestamp >= $2
            "#,
        )
        .bind(ip)
        .bind(since)
        .fetch_one(db_executor)
        .await?;

        Ok(row.try_get("count")?)
    }
}

#[derive(thiserror::Error)]
pub enum RequestLogPostgresRepositoryError {
    #[error(transparent)]
    DBError(#[from] sqlx::Error),
}

impl std::fmt::Debug for RequestLogPostgresRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
