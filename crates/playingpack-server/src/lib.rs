//! The HTTP entry point: the `/v1/*` chat-completions and passthrough
//! routes, the notification hub (`GET /ws`), and the decision API
//! (`/api/*`), all wired onto one [`LifecycleEngine`].
//!
//! - [`state`]: `AppState`, the single piece of shared state handlers see
//! - [`router`]: route table assembly
//! - [`chat`]: `/v1/*` entry point (chat-completions + transparent passthrough)
//! - [`hub`]: the `GET /ws` notification hub
//! - [`decision_api`]: the `/api/*` request/response surface
//! - [`error`]: translating `EngineError`/`EgressError` into JSON responses

mod chat;
mod decision_api;
mod error;
mod hub;
mod router;
mod state;

pub use router::build_router;
pub use state::AppState;
