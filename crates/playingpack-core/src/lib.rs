//! playingpack core types and the fingerprint/normalizer.
//!
//! - [`fingerprint`]: request-body normalization and SHA-256 hashing
//! - [`types`]: `Session`, `Settings`, `ToolCall`, and the point 1/2
//!   action types shared across the broker, engine, and server
//! - [`error`]: crate-wide error types

pub mod error;
pub mod fingerprint;
pub mod settings_store;
pub mod types;

pub use error::FingerprintError;
pub use settings_store::SettingsStore;
pub use types::{
    CacheMode, Point1Action, Point2Action, RequestSnapshot, ResponseSource, Session,
    SessionResponse, SessionState, Settings, ToolCall,
};
