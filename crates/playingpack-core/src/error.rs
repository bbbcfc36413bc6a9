//! Error types for playingpack-core

use thiserror::Error;

/// Error from normalizing or hashing a request body.
///
/// Fingerprinting fails only on serialization errors (unsupported
/// values), never on otherwise-valid JSON.
#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("failed to serialize normalized body: {0}")]
    Serialization(#[from] serde_json::Error),
}
