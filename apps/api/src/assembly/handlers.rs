use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::assembly::actor::SlideSnapshot;
use crate::assembly::contribution::{Contribution, ProducerKind};
use crate::assembly::event::UpdateEvent;
use crate::errors::AppError;
use crate::models::slide::SlideInput;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationCreated {
    pub presentation_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Accepted {
    pub slide_id: String,
    pub status: &'static str,
}

/// Slide registration body: the slide itself plus the producers expected to report
/// for it. Each expected producer is failed if it has not finished in time.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSlideRequest {
    #[serde(flatten)]
    pub slide: SlideInput,
    #[serde(default)]
    pub expected_producers: Vec<ProducerKind>,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub after: u64,
}

/// POST /api/v1/presentations
pub async fn handle_open_presentation(
    State(state): State<AppState>,
) -> (StatusCode, Json<PresentationCreated>) {
    let session = state.sessions.open().await;
    (
        StatusCode::CREATED,
        Json(PresentationCreated {
            presentation_id: session.id(),
            created_at: session.created_at(),
        }),
    )
}

/// DELETE /api/v1/presentations/:id
pub async fn handle_close_presentation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.sessions.close(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/presentations/:id/slides
/// Registers the slide and starts its layout producer; updates arrive on the event stream.
pub async fn handle_register_slide(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RegisterSlideRequest>,
) -> Result<(StatusCode, Json<Accepted>), AppError> {
    let session = state.sessions.get(id).await?;
    let slide_id = request.slide.slide_id.clone();
    session
        .register_slide(request.slide, &request.expected_producers)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(Accepted {
            slide_id,
            status: "registered",
        }),
    ))
}

/// POST /api/v1/presentations/:id/contributions
pub async fn handle_contribution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(contribution): Json<Contribution>,
) -> Result<(StatusCode, Json<Accepted>), AppError> {
    let session = state.sessions.get(id).await?;
    let slide_id = contribution.slide_id.clone();
    session.submit(contribution).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(Accepted {
            slide_id,
            status: "accepted",
        }),
    ))
}

/// GET /api/v1/presentations/:id/slides/:slide_id
pub async fn handle_slide_snapshot(
    State(state): State<AppState>,
    Path((id, slide_id)): Path<(Uuid, String)>,
) -> Result<Json<SlideSnapshot>, AppError> {
    let session = state.sessions.get(id).await?;
    Ok(Json(session.snapshot(&slide_id).await?))
}

/// GET /api/v1/presentations/:id/slides/:slide_id/events?after=N
/// Replays logged events after N, then streams live ones. Event id = sequence.
pub async fn handle_slide_events(
    State(state): State<AppState>,
    Path((id, slide_id)): Path<(Uuid, String)>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let session = state.sessions.get(id).await?;
    let rx = session.subscribe(&slide_id, query.after).await?;

    let stream = stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((Ok(to_sse(&event)), rx))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse(event: &UpdateEvent) -> Event {
    let sse = Event::default().id(event.sequence.to_string()).event("update");
    match serde_json::to_string(&event.to_message()) {
        Ok(json) => sse.data(json),
        Err(e) => {
            warn!(slide_id = %event.slide_id, sequence = event.sequence, error = %e, "Failed to encode update");
            sse.comment("encode error")
        }
    }
}
