use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{client_ip::ClientIp, sanitized_query::SanitizedQuery};

/// One inbound chat request, recorded for per-IP rate accounting.
///
/// Written once per request and never read back by the pipeline; the
/// rate-display endpoint only aggregates counts over it. Only the sanitized
/// form of the query is ever persisted.
#[derive(Debug, Clone)]
pub struct RequestLogEntry {
    pub id: Uuid,
    pub ip: String,
    pub query: String,
    pub user_agent: String,
    pub timestamp: DateTime<Utc>,
}

impl RequestLogEntry {
    pub fn new(client_ip: ClientIp, query: &SanitizedQuery, user_agent: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            ip: client_ip.to_string(),
            query: query.as_ref().to_string(),
            user_agent: user_agent.to_string(),
            timestamp: Utc::now(),
        }
    }
}
