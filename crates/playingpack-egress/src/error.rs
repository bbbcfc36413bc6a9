//! Error types for the upstream client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EgressError {
    #[error("request to upstream failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid upstream URL: {0}")]
    InvalidUrl(String),
}

pub type Result<T> = std::result::Result<T, EgressError>;
