use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ResourceId = i64;

pub const SEVEN_DAYS_MS: i64 = 7 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub run_id: Uuid,
    pub started_at_ms: i64,
}

/// Aggregate counts recorded when a run closes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunCounts {
    pub total_resources: i64,
    pub alive_count: i64,
}

/// Flattened resource row for reporting and export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRow {
    pub resource_id: ResourceId,
    pub url: String,
    pub name: Option<String>,
    pub category: Option<String>,
    pub source: String,
    pub alive: bool,
    pub status_code: Option<i64>,
    pub latency_ms: Option<i64>,
    pub uptime_pct_7d: Option<f64>,
    pub avg_latency_ms_7d: Option<f64>,
    pub check_count_7d: i64,
}

/// Current-aggregate row for one resource.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthAggregate {
    pub uptime_pct_7d: Option<f64>,
    pub avg_latency_ms_7d: Option<f64>,
    pub check_count_7d: i64,
}
