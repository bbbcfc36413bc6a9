//! The session broker: owns every live [`Session`], fans out
//! `request_update` events to subscribers, and exposes the two
//! awaitable decision points the lifecycle engine suspends on.
//!
//! - [`broker`]: `SessionBroker` and its mutators
//! - [`reaper`]: background eviction of completed sessions

mod broker;
mod reaper;

pub use broker::{PointAwaitError, SessionBroker};
pub use reaper::spawn_reaper;
