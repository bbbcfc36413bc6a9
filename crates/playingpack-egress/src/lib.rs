//! The upstream client: forwards chat-completions requests to the
//! configured OpenAI-compatible endpoint.

pub mod client;
pub mod error;

pub use client::{filter_headers, ForwardRequest, ForwardResponse, UpstreamClient};
pub use error::{EgressError, Result};
