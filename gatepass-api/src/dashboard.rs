use axum::{
    extract::State,
    response::sse::{Event, Sse},
    routing::get,
    Router,
};
use futures_util::Stream;
use gatepass_core::CoreError;

use crate::{error::AppError, middleware::Identity, sse, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/dashboard/stream", get(dashboard_stream))
}

/// Live metrics for every ticket the caller organizes.
async fn dashboard_stream(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let organizer = identity.as_deref().ok_or(CoreError::NotAuthenticated)?;
    let subscription = state.dashboard.subscribe(organizer).await?;
    Ok(sse::from_subscription(subscription))
}
