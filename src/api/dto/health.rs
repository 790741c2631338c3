//! Health check DTOs for API responses.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Health check response structure.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "status": "healthy",
    "version": "0.1.0",
    "timestamp": "2026-03-02T12:00:00Z",
    "provider": "hmac_rest",
    "checks": {
        "store": {
            "status": "healthy",
            "message": "Connected",
            "response_time_ms": 5
        }
    }
}))]
pub struct HealthResponse {
    /// Overall health status, the worst of all checks
    #[schema(example = "healthy")]
    pub status: HealthStatus,
    #[schema(example = "0.1.0")]
    pub version: String,
    /// Timestamp of the health check (RFC 3339)
    #[schema(value_type = String, format = DateTime, example = "2026-03-02T12:00:00Z")]
    pub timestamp: String,
    /// Active message transport
    #[schema(example = "hmac_rest")]
    pub provider: String,
    pub checks: BTreeMap<String, ComponentHealth>,
}

/// Health status enumeration, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Individual component health information.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ComponentHealth {
    #[schema(example = "healthy")]
    pub status: HealthStatus,
    #[schema(example = "Connected")]
    pub message: Option<String>,
    #[schema(example = 5)]
    pub response_time_ms: Option<u64>,
}

impl ComponentHealth {
    pub fn healthy(message: impl Into<String>, response_time_ms: Option<u64>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: Some(message.into()),
            response_time_ms,
        }
    }

    pub fn unhealthy(message: impl Into<String>, response_time_ms: Option<u64>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            response_time_ms,
        }
    }
}

impl HealthResponse {
    pub fn new(
        version: impl Into<String>,
        timestamp: impl Into<String>,
        provider: impl Into<String>,
        checks: BTreeMap<String, ComponentHealth>,
    ) -> Self {
        let status = checks
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);
        Self {
            status,
            version: version.into(),
            timestamp: timestamp.into(),
            provider: provider.into(),
            checks,
        }
    }
}
