use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload of `GET /health_check`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
    pub reconciles: u64,
    pub reconcile_failures: u64,
    pub mirror_syncs: u64,
    pub mirror_failures: u64,
    pub last_event_at: Option<DateTime<Utc>>,
}
