use std::sync::Mutex;

use axum::{extract::State, Json};

use crate::errors::AppError;
use crate::layout::refinement::FinalizedLayout;
use crate::models::slide::SlideInput;
use crate::state::AppState;

/// POST /api/v1/layout/preview
/// Lays out one slide against a fresh presentation context, so no variety is applied.
pub async fn handle_preview(
    State(state): State<AppState>,
    Json(input): Json<SlideInput>,
) -> Result<Json<FinalizedLayout>, AppError> {
    input.validate()?;
    let context = Mutex::new(state.engine.new_context());
    let layout = state
        .engine
        .layout_slide(&input, state.strategy.as_ref(), &context)
        .await?;
    Ok(Json(layout))
}
