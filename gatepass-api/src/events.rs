use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, Sse},
    routing::get,
    Json, Router,
};
use futures_util::Stream;
use gatepass_catalog::EventDraft;
use gatepass_shared::Event;

use crate::{error::AppError, middleware::Identity, sse, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/events", get(list_events).post(host_event))
        .route("/v1/events/hosted", get(hosted_events))
        .route("/v1/events/hosted/stream", get(hosted_events_stream))
        .route("/v1/events/{id}", get(get_event).delete(delete_event))
}

async fn list_events(State(state): State<AppState>) -> Result<Json<Vec<Event>>, AppError> {
    Ok(Json(state.catalog.list_events().await?))
}

async fn host_event(
    State(state): State<AppState>,
    identity: Identity,
    Json(draft): Json<EventDraft>,
) -> Result<(StatusCode, Json<Event>), AppError> {
    let event = state.catalog.host_event(identity.as_deref(), draft).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

async fn hosted_events(State(state): State<AppState>, identity: Identity) -> Result<Json<Vec<Event>>, AppError> {
    Ok(Json(state.catalog.hosted_by(identity.as_deref()).await?))
}

async fn hosted_events_stream(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, axum::Error>>>, AppError> {
    let feed = state.catalog.watch_hosted(identity.as_deref()).await?;
    Ok(sse::from_subscription(feed))
}

async fn get_event(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Event>, AppError> {
    Ok(Json(state.catalog.get_event(&id).await?))
}

async fn delete_event(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.catalog.delete_event(identity.as_deref(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
