use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gatepass_core::CoreError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("{0}")]
    InternalServerError(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Status and stable machine-readable code for a core failure.
fn classify(err: &CoreError) -> (StatusCode, &'static str) {
    match err {
        CoreError::NotAuthenticated => (StatusCode::UNAUTHORIZED, "not_authenticated"),
        CoreError::NotEventOwner(_) => (StatusCode::FORBIDDEN, "not_event_owner"),
        CoreError::EventNotFound(_) => (StatusCode::NOT_FOUND, "event_not_found"),
        CoreError::TicketNotFound(_) => (StatusCode::NOT_FOUND, "ticket_not_found"),
        CoreError::MalformedToken(_) => (StatusCode::BAD_REQUEST, "malformed_token"),
        CoreError::ExpiredToken { .. } => (StatusCode::BAD_REQUEST, "expired_token"),
        CoreError::InvalidMessage(_) => (StatusCode::BAD_REQUEST, "invalid_message"),
        CoreError::InvalidEvent(_) => (StatusCode::BAD_REQUEST, "invalid_event"),
        CoreError::StoreUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
        CoreError::Unknown(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, retryable) = match self {
            AppError::Core(err) => {
                let (status, code) = classify(&err);
                let retryable = err.is_retryable();
                let message = match err {
                    CoreError::Unknown(msg) => {
                        tracing::error!("Internal Server Error: {}", msg);
                        "Internal Server Error".to_string()
                    }
                    CoreError::StoreUnavailable(msg) => {
                        tracing::warn!("Store unavailable: {}", msg);
                        "Store temporarily unavailable".to_string()
                    }
                    other => other.to_string(),
                };
                (status, code, message, retryable)
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", "Internal Server Error".to_string(), false)
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", "Internal Server Error".to_string(), false)
            }
        };

        let body = Json(json!({
            "error": message,
            "code": code,
            "retryable": retryable,
        }));

        (status, body).into_response()
    }
}
