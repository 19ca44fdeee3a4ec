use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use gatepass_core::repository::{EventRepository, NoticeRepository, TicketRepository};
use gatepass_core::{CheckInWrite, LiveQuery, StoreError, StoreResult};
use gatepass_shared::models::new_record_id;
use gatepass_shared::{BroadcastNotice, Event, NewEvent, NewNotice, NewTicket, Ticket};
use tokio::sync::RwLock;
use tracing::info;

use crate::live::{spawn_live_query, ChangeFeed, Collection, StoreChange};

#[derive(Default)]
struct Tables {
    events: Vec<Event>,
    tickets: Vec<Ticket>,
    notices: Vec<BroadcastNotice>,
}

/// Process-local store implementing the full repository contract.
///
/// Every mutation happens under one write lock, which is also what makes
/// the conditional check-in a true compare-and-set.
#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    feed: ChangeFeed,
    offline: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            feed: ChangeFeed::new(),
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Simulate an outage: every call fails with `StoreError::Unavailable` until cleared.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
        // Live queries re-read on both edges: going down surfaces the
        // outage, coming back lets stalled listeners catch up.
        self.feed.publish(StoreChange::resync(Collection::Events));
        self.feed.publish(StoreChange::resync(Collection::Tickets));
        self.feed.publish(StoreChange::resync(Collection::Notices));
    }

    pub async fn ticket_count(&self) -> usize {
        self.tables.read().await.tickets.len()
    }

    fn ensure_online(offline: &AtomicBool) -> StoreResult<()> {
        if offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first<T: Clone>(rows: &[T], created: impl Fn(&T) -> chrono::DateTime<Utc>) -> Vec<T> {
    // Reverse insertion order first so equal timestamps resolve to the later insert.
    let mut out: Vec<T> = rows.iter().rev().cloned().collect();
    out.sort_by(|a, b| created(b).cmp(&created(a)));
    out
}

#[async_trait]
impl EventRepository for MemoryStore {
    async fn create_event(&self, draft: NewEvent) -> StoreResult<Event> {
        Self::ensure_online(&self.offline)?;
        let event = draft.into_event(new_record_id(), Utc::now());
        self.tables.write().await.events.push(event.clone());
        self.feed.publish(StoreChange::new(Collection::Events, event.owner_id.clone()));
        Ok(event)
    }

    async fn get_event(&self, id: &str) -> StoreResult<Option<Event>> {
        Self::ensure_online(&self.offline)?;
        let tables = self.tables.read().await;
        Ok(tables.events.iter().find(|e| e.id == id).cloned())
    }

    async fn list_events(&self) -> StoreResult<Vec<Event>> {
        Self::ensure_online(&self.offline)?;
        let tables = self.tables.read().await;
        Ok(newest_first(&tables.events, |e| e.created_at))
    }

    async fn list_events_by_owner(&self, owner_id: &str) -> StoreResult<Vec<Event>> {
        Self::ensure_online(&self.offline)?;
        let tables = self.tables.read().await;
        let owned: Vec<Event> = tables.events.iter().filter(|e| e.owner_id == owner_id).cloned().collect();
        Ok(newest_first(&owned, |e| e.created_at))
    }

    async fn delete_event(&self, id: &str) -> StoreResult<()> {
        Self::ensure_online(&self.offline)?;
        let mut tables = self.tables.write().await;
        if let Some(pos) = tables.events.iter().position(|e| e.id == id) {
            let removed = tables.events.remove(pos);
            self.feed.publish(StoreChange::new(Collection::Events, removed.owner_id));
        }
        Ok(())
    }

    async fn watch_events_by_owner(&self, owner_id: &str) -> StoreResult<LiveQuery<Event>> {
        Self::ensure_online(&self.offline)?;
        let tables = self.tables.clone();
        let offline = self.offline.clone();
        let owner = owner_id.to_string();

        Ok(spawn_live_query(&self.feed, Collection::Events, owner_id.to_string(), move || {
            let tables = tables.clone();
            let offline = offline.clone();
            let owner = owner.clone();
            async move {
                Self::ensure_online(&offline)?;
                let tables = tables.read().await;
                let owned: Vec<Event> = tables.events.iter().filter(|e| e.owner_id == owner).cloned().collect();
                Ok(newest_first(&owned, |e| e.created_at))
            }
        }))
    }
}

#[async_trait]
impl TicketRepository for MemoryStore {
    async fn create_ticket(&self, draft: NewTicket) -> StoreResult<Ticket> {
        Self::ensure_online(&self.offline)?;
        let ticket = draft.into_ticket(new_record_id(), Utc::now());
        self.tables.write().await.tickets.push(ticket.clone());
        self.feed.publish(StoreChange::new(Collection::Tickets, ticket.organizer_id.clone()));
        Ok(ticket)
    }

    async fn get_ticket(&self, id: &str) -> StoreResult<Option<Ticket>> {
        Self::ensure_online(&self.offline)?;
        let tables = self.tables.read().await;
        Ok(tables.tickets.iter().find(|t| t.id == id).cloned())
    }

    async fn find_ticket(&self, holder_id: &str, event_id: &str) -> StoreResult<Option<Ticket>> {
        Self::ensure_online(&self.offline)?;
        let tables = self.tables.read().await;
        Ok(tables
            .tickets
            .iter()
            .find(|t| t.holder_id == holder_id && t.event_id == event_id)
            .cloned())
    }

    async fn check_in_if_pending(&self, id: &str) -> StoreResult<CheckInWrite> {
        Self::ensure_online(&self.offline)?;
        let mut tables = self.tables.write().await;
        let Some(ticket) = tables.tickets.iter_mut().find(|t| t.id == id) else {
            return Ok(CheckInWrite::Missing);
        };

        if ticket.checked_in_at.is_some() {
            return Ok(CheckInWrite::AlreadySet(ticket.clone()));
        }

        ticket.checked_in_at = Some(Utc::now());
        let admitted = ticket.clone();
        drop(tables);

        info!("Ticket {} checked in", admitted.id);
        self.feed.publish(StoreChange::new(Collection::Tickets, admitted.organizer_id.clone()));
        Ok(CheckInWrite::Applied(admitted))
    }

    async fn delete_ticket(&self, id: &str) -> StoreResult<()> {
        Self::ensure_online(&self.offline)?;
        let mut tables = self.tables.write().await;
        if let Some(pos) = tables.tickets.iter().position(|t| t.id == id) {
            let removed = tables.tickets.remove(pos);
            self.feed.publish(StoreChange::new(Collection::Tickets, removed.organizer_id));
        }
        Ok(())
    }

    async fn watch_tickets_by_organizer(&self, organizer_id: &str) -> StoreResult<LiveQuery<Ticket>> {
        Self::ensure_online(&self.offline)?;
        let tables = self.tables.clone();
        let offline = self.offline.clone();
        let organizer = organizer_id.to_string();

        Ok(spawn_live_query(&self.feed, Collection::Tickets, organizer_id.to_string(), move || {
            let tables = tables.clone();
            let offline = offline.clone();
            let organizer = organizer.clone();
            async move {
                Self::ensure_online(&offline)?;
                let tables = tables.read().await;
                Ok(tables.tickets.iter().filter(|t| t.organizer_id == organizer).cloned().collect())
            }
        }))
    }
}

#[async_trait]
impl NoticeRepository for MemoryStore {
    async fn create_notice(&self, draft: NewNotice) -> StoreResult<BroadcastNotice> {
        Self::ensure_online(&self.offline)?;
        let notice = draft.into_notice(new_record_id(), Utc::now());
        self.tables.write().await.notices.push(notice.clone());
        self.feed.publish(StoreChange::new(Collection::Notices, notice.event_id.clone()));
        Ok(notice)
    }

    async fn watch_notices(&self, event_id: &str, limit: usize) -> StoreResult<LiveQuery<BroadcastNotice>> {
        Self::ensure_online(&self.offline)?;
        let tables = self.tables.clone();
        let offline = self.offline.clone();
        let event = event_id.to_string();

        Ok(spawn_live_query(&self.feed, Collection::Notices, event_id.to_string(), move || {
            let tables = tables.clone();
            let offline = offline.clone();
            let event = event.clone();
            async move {
                Self::ensure_online(&offline)?;
                let tables = tables.read().await;
                let scoped: Vec<BroadcastNotice> =
                    tables.notices.iter().filter(|n| n.event_id == event).cloned().collect();
                let mut newest = newest_first(&scoped, |n| n.created_at);
                newest.truncate(limit);
                Ok(newest)
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatepass_core::ChangeKind;
    use gatepass_shared::GeoPoint;

    fn draft_ticket(holder: &str) -> NewTicket {
        NewTicket {
            holder_id: holder.to_string(),
            event_id: "event-1".to_string(),
            organizer_id: "host-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_conditional_check_in_applies_once() {
        let store = MemoryStore::new();
        let ticket = store.create_ticket(draft_ticket("alice")).await.unwrap();

        let first = store.check_in_if_pending(&ticket.id).await.unwrap();
        let second = store.check_in_if_pending(&ticket.id).await.unwrap();

        let CheckInWrite::Applied(admitted) = first else { panic!("first write should apply") };
        assert_eq!(second, CheckInWrite::AlreadySet(admitted));
        assert_eq!(store.check_in_if_pending("missing").await.unwrap(), CheckInWrite::Missing);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        let ticket = store.create_ticket(draft_ticket("alice")).await.unwrap();

        store.delete_ticket(&ticket.id).await.unwrap();
        store.delete_ticket(&ticket.id).await.unwrap();

        assert_eq!(store.ticket_count().await, 0);
    }

    #[tokio::test]
    async fn test_offline_store_reports_unavailable() {
        let store = MemoryStore::new();
        store.set_offline(true);

        let result = store.get_ticket("any").await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_ticket_live_query_reports_changes() {
        let store = MemoryStore::new();
        let existing = store.create_ticket(draft_ticket("alice")).await.unwrap();

        let mut live = store.watch_tickets_by_organizer("host-1").await.unwrap();
        let initial = live.next_item().await.unwrap().unwrap();
        assert_eq!(initial.docs.len(), 1);
        assert_eq!(initial.changes[0].kind, ChangeKind::Added);

        store.check_in_if_pending(&existing.id).await.unwrap();
        let update = live.next_item().await.unwrap().unwrap();
        assert_eq!(update.changes.len(), 1);
        assert_eq!(update.changes[0].kind, ChangeKind::Modified);
        assert!(update.changes[0].doc.checked_in_at.is_some());

        // Other organizers never wake this listener up.
        store
            .create_ticket(NewTicket { organizer_id: "host-2".to_string(), ..draft_ticket("bob") })
            .await
            .unwrap();
        store.create_ticket(draft_ticket("carol")).await.unwrap();
        let update = live.next_item().await.unwrap().unwrap();
        assert_eq!(update.docs.len(), 2);
        assert_eq!(update.changes.len(), 1);
        assert_eq!(update.changes[0].doc.holder_id, "carol");
    }

    #[tokio::test]
    async fn test_notice_live_query_is_newest_first_and_limited() {
        let store = MemoryStore::new();
        for i in 0..4 {
            store
                .create_notice(NewNotice {
                    event_id: "event-1".to_string(),
                    organizer_id: "host-1".to_string(),
                    message: format!("notice {}", i),
                })
                .await
                .unwrap();
        }

        let mut live = store.watch_notices("event-1", 3).await.unwrap();
        let initial = live.next_item().await.unwrap().unwrap();

        let messages: Vec<&str> = initial.docs.iter().map(|n| n.message.as_str()).collect();
        assert_eq!(messages, vec!["notice 3", "notice 2", "notice 1"]);
    }

    #[tokio::test]
    async fn test_events_listed_newest_first() {
        let store = MemoryStore::new();
        for title in ["first", "second"] {
            store
                .create_event(NewEvent {
                    owner_id: "host-1".to_string(),
                    title: title.to_string(),
                    description: String::new(),
                    category: "Cultural".to_string(),
                    location: GeoPoint::default(),
                    start_time: Utc::now(),
                    end_time: Utc::now(),
                })
                .await
                .unwrap();
        }

        let events = store.list_events().await.unwrap();
        assert_eq!(events[0].title, "second");
        assert_eq!(store.list_events_by_owner("nobody").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_hosted_events_live_query() {
        let store = MemoryStore::new();
        let draft = |owner: &str, title: &str| NewEvent {
            owner_id: owner.to_string(),
            title: title.to_string(),
            description: String::new(),
            category: "Cultural".to_string(),
            location: GeoPoint::default(),
            start_time: Utc::now(),
            end_time: Utc::now(),
        };
        let first = store.create_event(draft("host-1", "first")).await.unwrap();

        let mut live = store.watch_events_by_owner("host-1").await.unwrap();
        let initial = live.next_item().await.unwrap().unwrap();
        assert_eq!(initial.docs.len(), 1);

        store.create_event(draft("host-2", "elsewhere")).await.unwrap();
        store.create_event(draft("host-1", "second")).await.unwrap();
        let update = live.next_item().await.unwrap().unwrap();
        assert_eq!(update.docs[0].title, "second");
        assert_eq!(update.changes.len(), 1);
        assert_eq!(update.changes[0].kind, ChangeKind::Added);

        store.delete_event(&first.id).await.unwrap();
        let update = live.next_item().await.unwrap().unwrap();
        assert_eq!(update.docs.len(), 1);
        assert_eq!(update.changes[0].kind, ChangeKind::Removed);
    }
}
