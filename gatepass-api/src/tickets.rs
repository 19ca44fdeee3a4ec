use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use futures_util::{future, Stream, StreamExt};
use gatepass_core::CoreError;
use gatepass_shared::models::events::TicketReservedEvent;
use gatepass_shared::Ticket;
use gatepass_store::events::TOPIC_TICKET_RESERVED;
use gatepass_ticket::IssuedToken;
use tokio_stream::wrappers::IntervalStream;

use crate::{error::AppError, middleware::Identity, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/events/{id}/tickets", post(reserve_ticket))
        .route("/v1/events/{id}/tickets/mine", get(my_ticket))
        .route("/v1/tickets/{id}", delete(revoke_ticket))
        .route("/v1/tickets/{id}/token", get(current_token))
        .route("/v1/tickets/{id}/token/stream", get(token_stream))
}

async fn reserve_ticket(
    State(state): State<AppState>,
    identity: Identity,
    Path(event_id): Path<String>,
) -> Result<(StatusCode, Json<Ticket>), AppError> {
    let reservation = state.tickets.reserve_tracked(identity.as_deref(), &event_id).await?;
    let ticket = reservation.ticket;

    if !reservation.created {
        return Ok((StatusCode::OK, Json(ticket)));
    }

    state.metrics.reservations.inc();
    let event = TicketReservedEvent {
        ticket_id: ticket.id.clone(),
        event_id: ticket.event_id.clone(),
        organizer_id: ticket.organizer_id.clone(),
        issued_at: ticket.issued_at,
    };
    if let Err(e) = state.producer.publish_json(TOPIC_TICKET_RESERVED, &ticket.id, &event).await {
        tracing::warn!("Failed to publish reservation of {}: {}", ticket.id, e);
    }

    Ok((StatusCode::CREATED, Json(ticket)))
}

async fn my_ticket(
    State(state): State<AppState>,
    identity: Identity,
    Path(event_id): Path<String>,
) -> Result<Json<Ticket>, AppError> {
    state
        .tickets
        .ticket_for(identity.as_deref(), &event_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::Core(CoreError::TicketNotFound(format!("no ticket for event {}", event_id))))
}

async fn revoke_ticket(
    State(state): State<AppState>,
    identity: Identity,
    Path(ticket_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.tickets.revoke(identity.as_deref(), &ticket_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn current_token(
    State(state): State<AppState>,
    identity: Identity,
    Path(ticket_id): Path<String>,
) -> Result<Json<IssuedToken>, AppError> {
    let issued = state.tickets.current_token(identity.as_deref(), &ticket_id, Utc::now()).await?;
    Ok(Json(issued))
}

/// Re-encodes the holder's token every refresh interval, starting immediately.
///
/// Ownership is re-checked on every tick; the stream ends once the ticket is
/// revoked or no longer belongs to the caller.
async fn token_stream(
    State(state): State<AppState>,
    identity: Identity,
    Path(ticket_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, axum::Error>>>, AppError> {
    let first = state.tickets.current_token(identity.as_deref(), &ticket_id, Utc::now()).await?;
    let ticket_id = first.ticket_id;
    let tickets = state.tickets.clone();
    let holder = identity.0;

    let ticks = IntervalStream::new(tokio::time::interval(tickets.rotation().refresh_interval()));
    let stream = ticks
        .then(move |_| {
            let tickets = tickets.clone();
            let holder = holder.clone();
            let ticket_id = ticket_id.clone();
            async move { tickets.current_token(holder.as_deref(), &ticket_id, Utc::now()).await }
        })
        .take_while(|issued| {
            if let Err(CoreError::TicketNotFound(id)) = issued {
                tracing::info!("Token stream for ticket {} closed", id);
                return future::ready(false);
            }
            future::ready(true)
        })
        .filter_map(|issued| {
            future::ready(match issued {
                Ok(issued) => Some(SseEvent::default().json_data(issued)),
                Err(e) => {
                    // Transient store failures skip a tick.
                    tracing::warn!("Token refresh skipped: {}", e);
                    None
                }
            })
        });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
