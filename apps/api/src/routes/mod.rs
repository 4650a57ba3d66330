pub mod applications;
pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::state::AppState;

/// Resumes are small, but scanned PDFs can exceed axum's 2 MB default.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/roles", get(applications::handle_list_roles))
        .route(
            "/api/v1/applications",
            post(applications::handle_create_application),
        )
        .route(
            "/api/v1/applications/:id",
            get(applications::handle_get_application),
        )
        .route(
            "/api/v1/applications/:id/advance",
            post(applications::handle_advance),
        )
        .route("/api/v1/applications/:id/run", post(applications::handle_run))
        .route(
            "/api/v1/applications/:id/redrive",
            post(applications::handle_redrive),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}
