use std::sync::Arc;

use crate::assembly::SessionRegistry;
use crate::layout::{LayoutEngine, StrategyProvider};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub engine: LayoutEngine,
    /// Pluggable pattern chooser. Heuristic unless ANTHROPIC_API_KEY is set.
    pub strategy: Arc<dyn StrategyProvider>,
    pub sessions: Arc<SessionRegistry>,
}
