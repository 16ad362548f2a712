//! Shared domain types for the x402 endpoint index.

use serde::{Deserialize, Serialize};

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Current wall-clock time as Unix milliseconds.
pub fn now_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Where a resource record came from. Lower priority rank wins when the
/// same URL is reported by several sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    DiscoveryApi,
    EcosystemListing,
    PartnerFile,
}

impl DiscoverySource {
    pub fn priority(self) -> u8 {
        match self {
            DiscoverySource::DiscoveryApi => 0,
            DiscoverySource::EcosystemListing => 1,
            DiscoverySource::PartnerFile => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DiscoverySource::DiscoveryApi => "discovery_api",
            DiscoverySource::EcosystemListing => "ecosystem_listing",
            DiscoverySource::PartnerFile => "partner_file",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "discovery_api" => Some(DiscoverySource::DiscoveryApi),
            "ecosystem_listing" => Some(DiscoverySource::EcosystemListing),
            "partner_file" => Some(DiscoverySource::PartnerFile),
            _ => None,
        }
    }
}

/// Lifecycle of one indexing pass. Transitions running -> completed|failed
/// exactly once; the run ledger is otherwise append-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// One liveness probe outcome. Immutable once created; appended to a
/// per-endpoint history, never edited. On failure exactly one of
/// {status_code + latency_ms} or {error} is populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub alive: bool,
    pub status_code: Option<u16>,
    pub latency_ms: Option<i64>,
    pub error: Option<String>,
    pub checked_at_ms: i64,
}

impl HealthCheck {
    /// A dead result carrying only an error message (no request reached
    /// the wire, or all retries were exhausted).
    pub fn dead(error: impl Into<String>, checked_at_ms: i64) -> Self {
        HealthCheck {
            alive: false,
            status_code: None,
            latency_ms: None,
            error: Some(error.into()),
            checked_at_ms,
        }
    }
}

/// A declared price/terms tuple an endpoint advertises for access.
/// `formatted_amount` is derived from `max_amount_required` + `asset`,
/// never an input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRequirement {
    pub scheme: String,
    pub network: String,
    /// Atomic units as an integer string (avoids float precision loss).
    pub max_amount_required: String,
    /// Token contract address or plain symbol.
    pub asset: String,
    pub pay_to: String,
    pub max_timeout_seconds: u64,
    pub formatted_amount: String,
}

/// A resource as reported by a single discovery source, before merging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointCandidate {
    pub url: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub protocol_version: u32,
    pub networks: Vec<String>,
    pub source: DiscoverySource,
}

impl EndpointCandidate {
    pub fn new(url: impl Into<String>, source: DiscoverySource) -> Self {
        EndpointCandidate {
            url: url.into(),
            name: None,
            description: None,
            category: None,
            protocol_version: 1,
            networks: Vec::new(),
            source,
        }
    }
}

/// Liveness plus whatever pricing the same probe response carried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedCheck {
    pub health: HealthCheck,
    pub pricing: Vec<PricingRequirement>,
}

impl EnrichedCheck {
    pub fn dead(error: impl Into<String>, checked_at_ms: i64) -> Self {
        EnrichedCheck {
            health: HealthCheck::dead(error, checked_at_ms),
            pricing: Vec::new(),
        }
    }
}

/// The unit of persistence: a merged, health-checked endpoint record.
/// Identity is the URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedResource {
    pub url: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub protocol_version: u32,
    pub source: DiscoverySource,
    pub networks: Vec<String>,
    pub health: HealthCheck,
    pub pricing: Vec<PricingRequirement>,
    pub last_updated_ms: i64,
}
