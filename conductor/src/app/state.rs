//! Shared application state

use std::sync::Arc;
use std::time::Instant;

use brick_core::store::Store;

use crate::manager::ConductorManager;

/// State shared between the dispatch loop, workers and the status server
pub struct AppState {
    pub version: String,
    pub started_at: Instant,
    pub manager: Arc<ConductorManager>,
    pub store: Arc<dyn Store>,
}
