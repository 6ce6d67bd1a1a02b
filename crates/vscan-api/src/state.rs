//! Application state.

use std::sync::Arc;
use std::time::Instant;

use vscan_pipeline::AnalysisService;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub service: Arc<AnalysisService>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: ApiConfig, service: Arc<AnalysisService>) -> Self {
        Self {
            config,
            service,
            started_at: Instant::now(),
        }
    }
}
