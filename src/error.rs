//! Error taxonomy.
//!
//! Each failure a collaborator can observe maps to a distinct variant so it
//! can render a precise message.

use thiserror::Error;

use crate::model::PlaceId;

/// Failures surfaced by the planner's public operations.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("address could not be geocoded: {input:?}")]
    GeocodeFailure { input: String },

    #[error("current position is unavailable")]
    NoPosition,

    #[error(transparent)]
    RoutingProvider(#[from] ProviderError),

    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("unknown place id: {0}")]
    NotFound(PlaceId),

    #[error("place {0} is both must-visit-first and skipped")]
    ConflictingOptions(PlaceId),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Failures reported by a road-routing provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("routing provider timed out")]
    Timeout,

    #[error("routing provider returned {status}: {message}")]
    Status { status: String, message: String },

    #[error("routing provider unreachable: {0}")]
    Transport(String),

    #[error("malformed routing provider response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if let Some(status) = err.status() {
            ProviderError::Status {
                status: status.as_u16().to_string(),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

/// Failures reported by an external geocoding resolver.
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("no results")]
    NoResults,

    #[error("geocoder timed out")]
    Timeout,

    #[error("geocoder returned HTTP {0}")]
    Status(u16),

    #[error("geocoder unreachable: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for GeocodeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GeocodeError::Timeout
        } else if let Some(status) = err.status() {
            GeocodeError::Status(status.as_u16())
        } else {
            GeocodeError::Transport(err.to_string())
        }
    }
}

/// Failures of the durable key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store value could not be encoded or decoded: {0}")]
    Json(#[from] serde_json::Error),
}
