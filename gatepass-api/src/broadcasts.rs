use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_util::Stream;
use gatepass_shared::models::events::NoticePublishedEvent;
use gatepass_shared::BroadcastNotice;
use gatepass_store::events::TOPIC_NOTICE_PUBLISHED;
use serde::Deserialize;

use crate::{error::AppError, middleware::Identity, sse, state::AppState};

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub message: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/events/{id}/broadcasts", post(publish_notice))
        .route("/v1/events/{id}/broadcasts/stream", get(notice_stream))
}

async fn publish_notice(
    State(state): State<AppState>,
    identity: Identity,
    Path(event_id): Path<String>,
    Json(req): Json<PublishRequest>,
) -> Result<(StatusCode, Json<BroadcastNotice>), AppError> {
    let notice = state.broadcasts.publish(identity.as_deref(), &event_id, &req.message).await?;
    state.metrics.notices.inc();

    let event = NoticePublishedEvent {
        notice_id: notice.id.clone(),
        event_id: notice.event_id.clone(),
        organizer_id: notice.organizer_id.clone(),
        timestamp: notice.created_at.timestamp(),
    };
    if let Err(e) = state.producer.publish_json(TOPIC_NOTICE_PUBLISHED, &notice.event_id, &event).await {
        tracing::warn!("Failed to publish notice {}: {}", notice.id, e);
    }

    Ok((StatusCode::CREATED, Json(notice)))
}

async fn notice_stream(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let subscription = state.broadcasts.subscribe(&event_id).await?;
    Ok(sse::from_subscription(subscription))
}
