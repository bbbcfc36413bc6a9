//! Content-addressed cache store for recorded upstream responses.
//!
//! - [`atomic_writer`]: write-to-temp-then-rename file persistence
//! - [`store`]: `CacheStore`, `CacheWriter`, and chunked replay

pub mod atomic_writer;
pub mod error;
pub mod store;

pub use atomic_writer::AtomicWriter;
pub use error::{CacheError, CacheResult};
pub use store::{replay, CacheStore, CacheWriter, CachedChunk, CachedRequest, CachedResponse, CachedResponseBody};
