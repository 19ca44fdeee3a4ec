use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gatepass_core::repository::EventRepository;
use gatepass_core::{within, CoreError, CoreResult, Subscription};
use gatepass_shared::{Event, GeoPoint, NewEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const DEFAULT_CATEGORY: &str = "Cultural";
const HOSTED_FEED_BUFFER: usize = 16;

/// Host-supplied event fields
#[derive(Debug, Clone, Deserialize)]
pub struct EventDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// One delivery of a host's live event list
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum HostedFeedEvent {
    /// Every event the host owns, newest first.
    Events(Vec<Event>),
    Stalled { reason: String },
}

/// Hosting, listing and removal of events
pub struct EventCatalog {
    events: Arc<dyn EventRepository>,
    store_timeout: Duration,
}

impl EventCatalog {
    pub fn new(events: Arc<dyn EventRepository>, store_timeout: Duration) -> Self {
        Self { events, store_timeout }
    }

    pub async fn host_event(&self, owner: Option<&str>, draft: EventDraft) -> CoreResult<Event> {
        let owner = owner.ok_or(CoreError::NotAuthenticated)?;

        let title = draft.title.trim();
        if title.is_empty() {
            return Err(CoreError::InvalidEvent("title is required".to_string()));
        }
        if draft.end_time < draft.start_time {
            return Err(CoreError::InvalidEvent("end_time precedes start_time".to_string()));
        }

        let category = draft
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        let new_event = NewEvent {
            owner_id: owner.to_string(),
            title: title.to_string(),
            description: draft.description.trim().to_string(),
            category,
            location: draft.location.unwrap_or_default(),
            start_time: draft.start_time,
            end_time: draft.end_time,
        };

        let event = within(self.store_timeout, self.events.create_event(new_event)).await?;
        info!("Event {} hosted by {}", event.id, event.owner_id);
        Ok(event)
    }

    pub async fn get_event(&self, id: &str) -> CoreResult<Event> {
        within(self.store_timeout, self.events.get_event(id))
            .await?
            .ok_or_else(|| CoreError::EventNotFound(id.to_string()))
    }

    /// Newest first.
    pub async fn list_events(&self) -> CoreResult<Vec<Event>> {
        within(self.store_timeout, self.events.list_events()).await
    }

    pub async fn hosted_by(&self, owner: Option<&str>) -> CoreResult<Vec<Event>> {
        let owner = owner.ok_or(CoreError::NotAuthenticated)?;
        within(self.store_timeout, self.events.list_events_by_owner(owner)).await
    }

    /// The caller's hosted events, re-delivered whenever one is added or removed.
    pub async fn watch_hosted(&self, owner: Option<&str>) -> CoreResult<Subscription<HostedFeedEvent>> {
        let owner = owner.ok_or(CoreError::NotAuthenticated)?.to_string();
        let mut live = within(self.store_timeout, self.events.watch_events_by_owner(&owner)).await?;
        let (tx, rx) = mpsc::channel(HOSTED_FEED_BUFFER);

        let feeder = tokio::spawn(async move {
            loop {
                let item = match live.next_item().await {
                    Some(Ok(batch)) => HostedFeedEvent::Events(batch.docs),
                    Some(Err(e)) => {
                        warn!("Hosted events feed for {} stalled: {}", owner, e);
                        HostedFeedEvent::Stalled { reason: e.to_string() }
                    }
                    None => {
                        let _ = tx.send(HostedFeedEvent::Stalled { reason: "event feed closed".to_string() }).await;
                        return;
                    }
                };
                if tx.send(item).await.is_err() {
                    debug!("Hosted events listener for {} went away", owner);
                    return;
                }
            }
        });

        Ok(Subscription::new(rx, feeder))
    }

    /// Owner-only; deleting an already-absent event succeeds.
    pub async fn delete_event(&self, requester: Option<&str>, id: &str) -> CoreResult<()> {
        let requester = requester.ok_or(CoreError::NotAuthenticated)?;

        let Some(event) = within(self.store_timeout, self.events.get_event(id)).await? else {
            return Ok(());
        };
        if !event.is_owned_by(requester) {
            return Err(CoreError::NotEventOwner(id.to_string()));
        }

        within(self.store_timeout, self.events.delete_event(id)).await?;
        info!("Event {} deleted by owner", id);
        Ok(())
    }
}
