use std::sync::Arc;

use crate::pipeline::{ApplicationStore, Orchestrator};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<ApplicationStore>,
}
