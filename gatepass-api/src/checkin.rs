use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use gatepass_shared::models::events::TicketCheckedInEvent;
use gatepass_store::events::TOPIC_TICKET_CHECKED_IN;
use gatepass_ticket::VerificationResult;
use serde::Deserialize;
use serde_json::json;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct CheckInRequest {
    /// Decoded contents of the scanned code.
    pub token: String,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/checkin", post(check_in))
}

async fn check_in(State(state): State<AppState>, Json(req): Json<CheckInRequest>) -> Result<Response, AppError> {
    let result = match state.tickets.verify(&req.token).await {
        Ok(result) => result,
        Err(e) => {
            state.metrics.record_verification(if e.is_retryable() { "unavailable" } else { "rejected" });
            return Err(e.into());
        }
    };

    match result {
        VerificationResult::Admitted { ticket, event_title, at } => {
            state.metrics.record_verification("admitted");

            let event = TicketCheckedInEvent {
                ticket_id: ticket.id.clone(),
                event_id: ticket.event_id.clone(),
                checked_in_at: at,
            };
            if let Err(e) = state.producer.publish_json(TOPIC_TICKET_CHECKED_IN, &ticket.id, &event).await {
                tracing::warn!("Failed to publish check-in of {}: {}", ticket.id, e);
            }

            let body = json!({
                "status": "admitted",
                "ticket": ticket,
                "event_title": event_title,
                "checked_in_at": at,
            });
            Ok((StatusCode::OK, Json(body)).into_response())
        }
        VerificationResult::AlreadyAdmitted { ticket, at } => {
            state.metrics.record_verification("already_admitted");

            let body = json!({
                "status": "already_admitted",
                "error": "already_admitted",
                "ticket": ticket,
                "checked_in_at": at,
            });
            Ok((StatusCode::CONFLICT, Json(body)).into_response())
        }
    }
}
