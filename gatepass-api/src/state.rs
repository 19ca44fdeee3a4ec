use std::sync::Arc;

use gatepass_catalog::EventCatalog;
use gatepass_core::identity::IdentityProvider;
use gatepass_core::repository::{EventRepository, NoticeRepository, TicketRepository};
use gatepass_live::{BroadcastChannel, LiveAggregationEngine, PricingRules};
use gatepass_store::app_config::{BusinessRules, RateLimitConfig};
use gatepass_store::{EventProducer, RedisClient};
use gatepass_ticket::{TicketManager, TokenRotation, WindowPolicy};

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<EventCatalog>,
    pub tickets: Arc<TicketManager>,
    pub dashboard: Arc<LiveAggregationEngine>,
    pub broadcasts: Arc<BroadcastChannel>,
    pub identity: Arc<dyn IdentityProvider>,
    pub producer: Arc<EventProducer>,
    pub redis: Option<Arc<RedisClient>>,
    pub rate_limit: RateLimitConfig,
    pub metrics: Arc<Metrics>,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
}

impl AppState {
    /// Wire every component to one store handle.
    pub fn new<S>(
        store: Arc<S>,
        identity: Arc<dyn IdentityProvider>,
        auth: AuthConfig,
        rules: BusinessRules,
    ) -> Result<Self, prometheus::Error>
    where
        S: EventRepository + TicketRepository + NoticeRepository + 'static,
    {
        let timeout = rules.store_timeout();

        let tickets = TicketManager::new(store.clone(), store.clone(), timeout)
            .with_rotation(TokenRotation::new(rules.token_window_secs, rules.token_refresh_secs))
            .with_window_policy(WindowPolicy::from_max_age(rules.token_max_age_windows));

        let pricing = PricingRules { unit_price: rules.ticket_price, recent_window: rules.recent_window };

        let broadcasts = BroadcastChannel::new(store.clone(), store.clone(), timeout)
            .with_feed_limit(rules.notice_feed_limit)
            .with_max_chars(rules.max_notice_chars)
            .with_pulse(rules.pulse_duration());

        Ok(Self {
            catalog: Arc::new(EventCatalog::new(store.clone(), timeout)),
            tickets: Arc::new(tickets),
            dashboard: Arc::new(LiveAggregationEngine::new(store, pricing, timeout)),
            broadcasts: Arc::new(broadcasts),
            identity,
            producer: Arc::new(EventProducer::logging()),
            redis: None,
            rate_limit: RateLimitConfig::default(),
            metrics: Arc::new(Metrics::new()?),
            auth,
            business_rules: rules,
        })
    }

    pub fn with_producer(mut self, producer: EventProducer) -> Self {
        self.producer = Arc::new(producer);
        self
    }

    /// Enable per-client rate limiting backed by Redis.
    pub fn with_rate_limit(mut self, redis: RedisClient, limits: RateLimitConfig) -> Self {
        self.redis = Some(Arc::new(redis));
        self.rate_limit = limits;
        self
    }
}
