use link_preview_cli::{MemoryOutcomeSink, Pipeline};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub outcomes: Arc<MemoryOutcomeSink>,
    pub admin_key: Option<String>,
}

impl AppState {
    pub fn new(
        pipeline: Arc<Pipeline>,
        outcomes: Arc<MemoryOutcomeSink>,
        admin_key: Option<String>,
    ) -> Self {
        AppState {
            pipeline,
            outcomes,
            admin_key,
        }
    }
}
