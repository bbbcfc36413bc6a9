//! The lifecycle engine: turns an incoming chat-completions request
//! into a buffered response, choosing between cache replay, the
//! upstream LLM, and operator mocks along the way.
//!
//! - [`engine`]: `LifecycleEngine`, the per-request orchestrator
//! - [`acquire`]: the three response-acquisition paths
//! - [`framing`]: SSE chunks <-> single JSON body conversion
//! - [`error`]: `EngineError` and its HTTP disposition

mod acquire;
mod engine;
mod error;
mod framing;

pub use engine::{EngineOutcome, LifecycleEngine};
pub use error::{EngineError, Result};
