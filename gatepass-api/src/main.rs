use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use gatepass_api::{app, middleware::JwtIdentityProvider, AppState, AuthConfig};
use gatepass_store::app_config::Config;
use gatepass_store::{EventProducer, MemoryStore, PgStore, RedisClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatepass_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Gatepass API on port {}", config.server.port);

    let identity = Arc::new(JwtIdentityProvider::new(config.auth.jwt_secret.clone()));
    let auth = AuthConfig {
        secret: config.auth.jwt_secret.clone(),
        expiration: config.auth.jwt_expiration_seconds,
    };
    let rules = config.business_rules.clone();

    let state = match config.database.url.as_deref() {
        Some(url) => {
            let store = PgStore::new(url).await.context("Failed to connect to Postgres")?;
            store.migrate().await.context("Failed to run migrations")?;
            AppState::new(Arc::new(store), identity, auth, rules)?
        }
        None => {
            tracing::warn!("No database.url configured, using the in-memory store");
            AppState::new(Arc::new(MemoryStore::new()), identity, auth, rules)?
        }
    };

    let state = match config.redis.url.as_deref() {
        Some(url) => {
            let redis = RedisClient::new(url).await.context("Failed to create Redis client")?;
            state.with_rate_limit(redis, config.rate_limit.clone())
        }
        None => state,
    };

    let state = state.with_producer(event_producer(&config)?);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state).into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

#[cfg(feature = "kafka")]
fn event_producer(config: &Config) -> anyhow::Result<EventProducer> {
    match config.kafka.brokers.as_deref() {
        Some(brokers) => EventProducer::kafka(brokers).context("Failed to create Kafka producer"),
        None => Ok(EventProducer::logging()),
    }
}

#[cfg(not(feature = "kafka"))]
fn event_producer(config: &Config) -> anyhow::Result<EventProducer> {
    if config.kafka.brokers.is_some() {
        tracing::warn!("kafka.brokers is set but the kafka feature is disabled; domain events are only logged");
    }
    Ok(EventProducer::logging())
}
