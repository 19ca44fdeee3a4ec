use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use uuid::Uuid;

use crate::{error::AppError, middleware::auth::issue_token, state::AppState};

#[derive(Debug, Serialize)]
struct AuthResponse {
    token: String,
    holder_id: String,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/guest", post(login_guest))
}

/// Anonymous sign-in: a fresh holder id wrapped in a signed token.
async fn login_guest(State(state): State<AppState>) -> Result<Json<AuthResponse>, AppError> {
    let holder_id = format!("guest-{}", Uuid::new_v4().simple());

    let token = issue_token(&state.auth, &holder_id, "GUEST")
        .map_err(|e| AppError::InternalServerError(format!("Token encoding failed: {}", e)))?;

    Ok(Json(AuthResponse { token, holder_id }))
}
