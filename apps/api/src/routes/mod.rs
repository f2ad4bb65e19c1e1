pub mod health;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::assembly::handlers as assembly;
use crate::layout::handlers as layout;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Layout API
        .route("/api/v1/layout/preview", post(layout::handle_preview))
        // Presentation assembly API
        .route("/api/v1/presentations", post(assembly::handle_open_presentation))
        .route(
            "/api/v1/presentations/:id",
            delete(assembly::handle_close_presentation),
        )
        .route(
            "/api/v1/presentations/:id/slides",
            post(assembly::handle_register_slide),
        )
        .route(
            "/api/v1/presentations/:id/contributions",
            post(assembly::handle_contribution),
        )
        .route(
            "/api/v1/presentations/:id/slides/:slide_id",
            get(assembly::handle_slide_snapshot),
        )
        .route(
            "/api/v1/presentations/:id/slides/:slide_id/events",
            get(assembly::handle_slide_events),
        )
        .with_state(state)
}
