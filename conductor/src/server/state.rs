//! Status server state

use std::sync::Arc;
use std::time::Instant;

use brick_core::store::Store;

/// State handed to the status handlers
pub struct ServerState {
    pub version: String,
    pub started_at: Instant,
    pub store: Arc<dyn Store>,
}
