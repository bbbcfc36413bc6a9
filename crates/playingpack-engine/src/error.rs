//! Top-level engine error, composing the per-crate errors into one
//! HTTP status and JSON error `type` for the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cache read failed: {0}")]
    Cache(#[from] playingpack_cache::CacheError),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] playingpack_egress::EgressError),

    #[error("failed to fingerprint request: {0}")]
    Fingerprint(#[from] playingpack_core::FingerprintError),

    #[error("no cached response found (cache mode: read)")]
    CacheMiss,

    #[error("the point 1/2 awaiter was cancelled: {0}")]
    Cancelled(#[from] playingpack_broker::PointAwaitError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// The `type` field of the JSON error body returned to the caller.
    pub fn error_type(&self) -> &'static str {
        match self {
            EngineError::CacheMiss => "cache_not_found",
            _ => "proxy_error",
        }
    }

    /// The HTTP status this failure is reported with.
    pub fn status(&self) -> u16 {
        match self {
            EngineError::CacheMiss => 404,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
