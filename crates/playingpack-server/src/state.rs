//! Shared Axum state: one [`LifecycleEngine`] per process, handed to
//! every handler by value (it's an `Arc` inside, cheap to clone).

use std::sync::Arc;

use playingpack_engine::LifecycleEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LifecycleEngine>,
}

impl AppState {
    pub fn new(engine: Arc<LifecycleEngine>) -> Self {
        Self { engine }
    }
}
