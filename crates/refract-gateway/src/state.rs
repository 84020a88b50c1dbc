//! Shared application state.

use crate::cache::CacheController;
use crate::orchestrator::TransformOrchestrator;
use refract_kernel::config::Settings;
use refract_params::processor::ParamProcessor;
use refract_storage::StorageFetcher;
use std::sync::Arc;

/// State injected into every axum handler via the `State` extractor. All
/// members are immutable after startup and shared by `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub processor: Arc<ParamProcessor>,
    pub fetcher: Arc<StorageFetcher>,
    pub orchestrator: Arc<TransformOrchestrator>,
    pub cache: Arc<CacheController>,
}
