use axum::{extract::State, http::header, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::{error::AppError, state::AppState};

/// Service counters exposed at `/metrics`.
pub struct Metrics {
    registry: Registry,
    pub verifications: IntCounterVec,
    pub reservations: IntCounter,
    pub notices: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("gatepass".to_string()), None)?;

        let verifications = IntCounterVec::new(
            Opts::new("verifications_total", "Check-in attempts by outcome"),
            &["outcome"],
        )?;
        let reservations = IntCounter::new("reservations_total", "Tickets reserved")?;
        let notices = IntCounter::new("notices_published_total", "Broadcast notices published")?;

        registry.register(Box::new(verifications.clone()))?;
        registry.register(Box::new(reservations.clone()))?;
        registry.register(Box::new(notices.clone()))?;

        Ok(Self { registry, verifications, reservations, notices })
    }

    pub fn record_verification(&self, outcome: &str) {
        self.verifications.with_label_values(&[outcome]).inc();
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/metrics", get(export))
}

async fn export(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state
        .metrics
        .render()
        .map_err(|e| AppError::InternalServerError(format!("Metrics encoding failed: {}", e)))?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_render_with_prefix() {
        let metrics = Metrics::new().unwrap();
        metrics.record_verification("admitted");
        metrics.reservations.inc();

        let text = metrics.render().unwrap();

        assert!(text.contains("gatepass_verifications_total{outcome=\"admitted\"} 1"));
        assert!(text.contains("gatepass_reservations_total 1"));
    }
}
