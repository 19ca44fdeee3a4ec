//! Host notices pushed to everyone following an event.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use gatepass_core::repository::{EventRepository, NoticeRepository};
use gatepass_core::{within, CoreError, CoreResult, Subscription};
use gatepass_shared::{BroadcastNotice, NewNotice};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::pulse::AttentionPulse;

const FEED_BUFFER: usize = 16;

/// One delivery of an event's notice feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoticeFeedUpdate {
    /// Current top notices, newest first.
    pub notices: Vec<BroadcastNotice>,
    /// Ids in `notices` that arrived while subscribed.
    pub fresh: Vec<String>,
    /// Set on the first delivery, whose notices all predate the subscription.
    pub backlog: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum FeedEvent {
    Update(NoticeFeedUpdate),
    PulseStarted { until: DateTime<Utc> },
    PulseCleared,
    Stalled { reason: String },
}

/// Splits feed deliveries into backlog and fresh notices.
///
/// Notices are immutable and the feed is newest first, so an id that drops
/// out of the window never comes back. Only the current window is tracked.
#[derive(Debug, Default)]
pub struct FeedClassifier {
    initial_delivered: bool,
    seen: HashSet<String>,
}

impl FeedClassifier {
    pub fn classify(&mut self, notices: Vec<BroadcastNotice>) -> NoticeFeedUpdate {
        let backlog = !self.initial_delivered;
        self.initial_delivered = true;

        let fresh = if backlog {
            Vec::new()
        } else {
            notices
                .iter()
                .filter(|n| !self.seen.contains(&n.id))
                .map(|n| n.id.clone())
                .collect()
        };
        self.seen = notices.iter().map(|n| n.id.clone()).collect();

        NoticeFeedUpdate { notices, fresh, backlog }
    }
}

pub struct BroadcastChannel {
    notices: Arc<dyn NoticeRepository>,
    events: Arc<dyn EventRepository>,
    feed_limit: usize,
    max_chars: usize,
    pulse: Duration,
    store_timeout: Duration,
}

impl BroadcastChannel {
    pub fn new(notices: Arc<dyn NoticeRepository>, events: Arc<dyn EventRepository>, store_timeout: Duration) -> Self {
        Self {
            notices,
            events,
            feed_limit: 3,
            max_chars: 280,
            pulse: Duration::from_millis(4000),
            store_timeout,
        }
    }

    pub fn with_feed_limit(mut self, limit: usize) -> Self {
        self.feed_limit = limit.max(1);
        self
    }

    pub fn with_max_chars(mut self, max: usize) -> Self {
        self.max_chars = max;
        self
    }

    pub fn with_pulse(mut self, pulse: Duration) -> Self {
        self.pulse = pulse;
        self
    }

    /// Publish a notice for `event_id`. Only the event owner may publish.
    pub async fn publish(&self, identity: Option<&str>, event_id: &str, message: &str) -> CoreResult<BroadcastNotice> {
        let identity = identity.ok_or(CoreError::NotAuthenticated)?;

        let message = message.trim();
        if message.is_empty() {
            return Err(CoreError::InvalidMessage("message is empty".to_string()));
        }
        let length = message.chars().count();
        if length > self.max_chars {
            return Err(CoreError::InvalidMessage(format!(
                "message is {} characters, limit is {}",
                length, self.max_chars
            )));
        }

        let event = within(self.store_timeout, self.events.get_event(event_id))
            .await?
            .ok_or_else(|| CoreError::EventNotFound(event_id.to_string()))?;
        if !event.is_owned_by(identity) {
            return Err(CoreError::NotEventOwner(event_id.to_string()));
        }

        let draft = NewNotice {
            event_id: event.id,
            organizer_id: identity.to_string(),
            message: message.to_string(),
        };
        let notice = within(self.store_timeout, self.notices.create_notice(draft)).await?;

        info!("Notice {} published for event {}", notice.id, notice.event_id);
        Ok(notice)
    }

    /// Follow the newest notices of `event_id`.
    pub async fn subscribe(&self, event_id: &str) -> CoreResult<Subscription<FeedEvent>> {
        let mut live = within(self.store_timeout, self.notices.watch_notices(event_id, self.feed_limit)).await?;
        let mut classifier = FeedClassifier::default();
        let mut pulse = AttentionPulse::new(self.pulse);
        let event = event_id.to_string();
        let (tx, rx) = mpsc::channel(FEED_BUFFER);

        let feeder = tokio::spawn(async move {
            loop {
                let deadline = pulse.deadline();
                let mut out = Vec::new();

                tokio::select! {
                    item = live.next_item() => match item {
                        Some(Ok(batch)) => {
                            let update = classifier.classify(batch.docs);
                            if !update.fresh.is_empty() {
                                let until = pulse.trigger(Instant::now());
                                out.push(FeedEvent::Update(update));
                                out.push(FeedEvent::PulseStarted { until: wall_clock(until) });
                            } else {
                                out.push(FeedEvent::Update(update));
                            }
                        }
                        Some(Err(e)) => {
                            warn!("Notice feed for event {} stalled: {}", event, e);
                            out.push(FeedEvent::Stalled { reason: e.to_string() });
                        }
                        None => {
                            warn!("Notice feed for event {} ended", event);
                            let _ = tx.send(FeedEvent::Stalled { reason: "notice feed closed".to_string() }).await;
                            return;
                        }
                    },
                    _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                        pulse.clear();
                        out.push(FeedEvent::PulseCleared);
                    }
                }

                for item in out {
                    if tx.send(item).await.is_err() {
                        debug!("Notice listener for event {} went away", event);
                        return;
                    }
                }
            }
        });

        Ok(Subscription::new(rx, feeder))
    }
}

fn wall_clock(deadline: Instant) -> DateTime<Utc> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    Utc::now() + TimeDelta::milliseconds(remaining.as_millis() as i64)
}
