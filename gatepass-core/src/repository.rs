use async_trait::async_trait;
use gatepass_shared::{BroadcastNotice, Event, NewEvent, NewNotice, NewTicket, Ticket};

use crate::changes::ChangeSet;
use crate::subscription::Subscription;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Transient: the backend could not be reached or timed out.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Store failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Live result set for an equality-filtered query.
///
/// The first item holds the whole current set with every document marked
/// `Added`; later items arrive whenever the filtered set changes.
pub type LiveQuery<T> = Subscription<StoreResult<ChangeSet<T>>>;

/// Answer of the store to a conditional check-in write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckInWrite {
    /// This write performed the null -> set transition.
    Applied(Ticket),
    /// `checked_in_at` was already set when the write was evaluated; nothing changed.
    AlreadySet(Ticket),
    Missing,
}

/// Repository trait for hosted events
#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn create_event(&self, draft: NewEvent) -> StoreResult<Event>;

    async fn get_event(&self, id: &str) -> StoreResult<Option<Event>>;

    /// All events, newest first.
    async fn list_events(&self) -> StoreResult<Vec<Event>>;

    /// Events owned by `owner_id`, newest first.
    async fn list_events_by_owner(&self, owner_id: &str) -> StoreResult<Vec<Event>>;

    /// Point delete. Deleting an absent event is not an error.
    async fn delete_event(&self, id: &str) -> StoreResult<()>;

    /// Events owned by `owner_id`, newest first, kept live.
    async fn watch_events_by_owner(&self, owner_id: &str) -> StoreResult<LiveQuery<Event>>;
}

/// Repository trait for tickets
#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Single atomic create; the store assigns `id` and `issued_at`.
    async fn create_ticket(&self, draft: NewTicket) -> StoreResult<Ticket>;

    async fn get_ticket(&self, id: &str) -> StoreResult<Option<Ticket>>;

    async fn find_ticket(&self, holder_id: &str, event_id: &str) -> StoreResult<Option<Ticket>>;

    /// Set `checked_in_at` to the store's current time only if it is still null.
    ///
    /// The condition is evaluated at write time inside the store, so of any
    /// number of concurrent callers at most one receives `Applied`.
    async fn check_in_if_pending(&self, id: &str) -> StoreResult<CheckInWrite>;

    /// Point delete. Deleting an absent ticket is not an error.
    async fn delete_ticket(&self, id: &str) -> StoreResult<()>;

    async fn watch_tickets_by_organizer(&self, organizer_id: &str) -> StoreResult<LiveQuery<Ticket>>;
}

/// Repository trait for broadcast notices
#[async_trait]
pub trait NoticeRepository: Send + Sync {
    async fn create_notice(&self, draft: NewNotice) -> StoreResult<BroadcastNotice>;

    /// The `limit` newest notices of an event, newest first, kept live.
    async fn watch_notices(&self, event_id: &str, limit: usize) -> StoreResult<LiveQuery<BroadcastNotice>>;
}
