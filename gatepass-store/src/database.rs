use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatepass_core::repository::{EventRepository, NoticeRepository, TicketRepository};
use gatepass_core::{CheckInWrite, LiveQuery, StoreError, StoreResult};
use gatepass_shared::models::new_record_id;
use gatepass_shared::{BroadcastNotice, Event, GeoPoint, NewEvent, NewNotice, NewTicket, Ticket};
use sqlx::postgres::{PgListener, PgPoolOptions};
use sqlx::{PgPool, Pool, Postgres};
use tracing::{error, info, warn};

use crate::live::{spawn_live_query, ChangeFeed, Collection, StoreChange};

/// Channel the table triggers in `migrations/` notify on.
pub const CHANGE_CHANNEL: &str = "gatepass_changes";

const TICKET_COLUMNS: &str = "id, holder_id, event_id, organizer_id, issued_at, checked_in_at";
const EVENT_COLUMNS: &str =
    "id, owner_id, title, description, category, lat, lng, start_time, end_time, created_at";
const NOTICE_COLUMNS: &str = "id, event_id, organizer_id, message, created_at";

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: String,
    holder_id: String,
    event_id: String,
    organizer_id: String,
    issued_at: DateTime<Utc>,
    checked_in_at: Option<DateTime<Utc>>,
}

impl From<TicketRow> for Ticket {
    fn from(row: TicketRow) -> Self {
        Ticket {
            id: row.id,
            holder_id: row.holder_id,
            event_id: row.event_id,
            organizer_id: row.organizer_id,
            issued_at: row.issued_at,
            checked_in_at: row.checked_in_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    owner_id: String,
    title: String,
    description: String,
    category: String,
    lat: f64,
    lng: f64,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Event {
            id: row.id,
            owner_id: row.owner_id,
            title: row.title,
            description: row.description,
            category: row.category,
            location: GeoPoint::new(row.lat, row.lng),
            start_time: row.start_time,
            end_time: row.end_time,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct NoticeRow {
    id: String,
    event_id: String,
    organizer_id: String,
    message: String,
    created_at: DateTime<Utc>,
}

impl From<NoticeRow> for BroadcastNotice {
    fn from(row: NoticeRow) -> Self {
        BroadcastNotice {
            id: row.id,
            event_id: row.event_id,
            organizer_id: row.organizer_id,
            message: row.message,
            created_at: row.created_at,
        }
    }
}

fn store_err(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
            StoreError::Unavailable(err.to_string())
        }
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) => StoreError::Unavailable(err.to_string()),
        other => StoreError::Backend(other.to_string()),
    }
}

/// PostgreSQL-backed store. Live queries are driven by `LISTEN/NOTIFY`.
#[derive(Clone)]
pub struct PgStore {
    pub pool: Pool<Postgres>,
    feed: ChangeFeed,
}

impl PgStore {
    pub async fn new(connection_string: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        let store = Self { pool, feed: ChangeFeed::new() };
        tokio::spawn(forward_notifications(store.pool.clone(), store.feed.clone()));
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    async fn fetch_events_by_owner(pool: &PgPool, owner_id: &str) -> StoreResult<Vec<Event>> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "SELECT {} FROM events WHERE owner_id = $1 ORDER BY created_at DESC",
            EVENT_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(pool)
        .await
        .map_err(store_err)?;
        Ok(rows.into_iter().map(Event::from).collect())
    }

    async fn fetch_tickets_by_organizer(pool: &PgPool, organizer_id: &str) -> StoreResult<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tickets WHERE organizer_id = $1",
            TICKET_COLUMNS
        ))
        .bind(organizer_id)
        .fetch_all(pool)
        .await
        .map_err(store_err)?;
        Ok(rows.into_iter().map(Ticket::from).collect())
    }

    async fn fetch_notices(pool: &PgPool, event_id: &str, limit: i64) -> StoreResult<Vec<BroadcastNotice>> {
        let rows: Vec<NoticeRow> = sqlx::query_as(&format!(
            "SELECT {} FROM broadcast_notices WHERE event_id = $1 ORDER BY created_at DESC, seq DESC LIMIT $2",
            NOTICE_COLUMNS
        ))
        .bind(event_id)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(store_err)?;
        Ok(rows.into_iter().map(BroadcastNotice::from).collect())
    }
}

/// Bridge `NOTIFY gatepass_changes` into the in-process change feed.
async fn forward_notifications(pool: PgPool, feed: ChangeFeed) {
    loop {
        let mut listener = match PgListener::connect_with(&pool).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to open change listener: {}", e);
                tokio::time::sleep(Duration::from_secs(2)).await;
                continue;
            }
        };

        if let Err(e) = listener.listen(CHANGE_CHANNEL).await {
            error!("Failed to LISTEN on {}: {}", CHANGE_CHANNEL, e);
            tokio::time::sleep(Duration::from_secs(2)).await;
            continue;
        }

        // Anything committed while we were not listening is picked up by a re-read.
        for collection in [Collection::Events, Collection::Tickets, Collection::Notices] {
            feed.publish(StoreChange::resync(collection));
        }
        info!("Listening for store changes on {}", CHANGE_CHANNEL);

        loop {
            match listener.recv().await {
                Ok(notification) => match serde_json::from_str::<StoreChange>(notification.payload()) {
                    Ok(change) => feed.publish(change),
                    Err(e) => warn!("Ignoring malformed change payload: {}", e),
                },
                Err(e) => {
                    error!("Change listener dropped: {}", e);
                    break;
                }
            }
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

#[async_trait]
impl EventRepository for PgStore {
    async fn create_event(&self, draft: NewEvent) -> StoreResult<Event> {
        let row: EventRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO events (id, owner_id, title, description, category, lat, lng, start_time, end_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            EVENT_COLUMNS
        ))
        .bind(new_record_id())
        .bind(&draft.owner_id)
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(&draft.category)
        .bind(draft.location.lat)
        .bind(draft.location.lng)
        .bind(draft.start_time)
        .bind(draft.end_time)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(row.into())
    }

    async fn get_event(&self, id: &str) -> StoreResult<Option<Event>> {
        let row: Option<EventRow> = sqlx::query_as(&format!("SELECT {} FROM events WHERE id = $1", EVENT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(row.map(Event::from))
    }

    async fn list_events(&self) -> StoreResult<Vec<Event>> {
        let rows: Vec<EventRow> =
            sqlx::query_as(&format!("SELECT {} FROM events ORDER BY created_at DESC", EVENT_COLUMNS))
                .fetch_all(&self.pool)
                .await
                .map_err(store_err)?;
        Ok(rows.into_iter().map(Event::from).collect())
    }

    async fn list_events_by_owner(&self, owner_id: &str) -> StoreResult<Vec<Event>> {
        Self::fetch_events_by_owner(&self.pool, owner_id).await
    }

    async fn delete_event(&self, id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn watch_events_by_owner(&self, owner_id: &str) -> StoreResult<LiveQuery<Event>> {
        let pool = self.pool.clone();
        let owner = owner_id.to_string();
        Ok(spawn_live_query(&self.feed, Collection::Events, owner_id.to_string(), move || {
            let pool = pool.clone();
            let owner = owner.clone();
            async move { Self::fetch_events_by_owner(&pool, &owner).await }
        }))
    }
}

#[async_trait]
impl TicketRepository for PgStore {
    async fn create_ticket(&self, draft: NewTicket) -> StoreResult<Ticket> {
        let row: TicketRow = sqlx::query_as(&format!(
            "INSERT INTO tickets (id, holder_id, event_id, organizer_id) VALUES ($1, $2, $3, $4) RETURNING {}",
            TICKET_COLUMNS
        ))
        .bind(new_record_id())
        .bind(&draft.holder_id)
        .bind(&draft.event_id)
        .bind(&draft.organizer_id)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(row.into())
    }

    async fn get_ticket(&self, id: &str) -> StoreResult<Option<Ticket>> {
        let row: Option<TicketRow> =
            sqlx::query_as(&format!("SELECT {} FROM tickets WHERE id = $1", TICKET_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_err)?;
        Ok(row.map(Ticket::from))
    }

    async fn find_ticket(&self, holder_id: &str, event_id: &str) -> StoreResult<Option<Ticket>> {
        let row: Option<TicketRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tickets WHERE holder_id = $1 AND event_id = $2 ORDER BY issued_at LIMIT 1",
            TICKET_COLUMNS
        ))
        .bind(holder_id)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.map(Ticket::from))
    }

    async fn check_in_if_pending(&self, id: &str) -> StoreResult<CheckInWrite> {
        // The IS NULL predicate is evaluated under the row lock taken by UPDATE.
        let applied: Option<TicketRow> = sqlx::query_as(&format!(
            "UPDATE tickets SET checked_in_at = now() WHERE id = $1 AND checked_in_at IS NULL RETURNING {}",
            TICKET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        if let Some(row) = applied {
            return Ok(CheckInWrite::Applied(row.into()));
        }

        match self.get_ticket(id).await? {
            Some(current) => Ok(CheckInWrite::AlreadySet(current)),
            None => Ok(CheckInWrite::Missing),
        }
    }

    async fn delete_ticket(&self, id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM tickets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn watch_tickets_by_organizer(&self, organizer_id: &str) -> StoreResult<LiveQuery<Ticket>> {
        let pool = self.pool.clone();
        let organizer = organizer_id.to_string();
        Ok(spawn_live_query(&self.feed, Collection::Tickets, organizer_id.to_string(), move || {
            let pool = pool.clone();
            let organizer = organizer.clone();
            async move { Self::fetch_tickets_by_organizer(&pool, &organizer).await }
        }))
    }
}

#[async_trait]
impl NoticeRepository for PgStore {
    async fn create_notice(&self, draft: NewNotice) -> StoreResult<BroadcastNotice> {
        let row: NoticeRow = sqlx::query_as(&format!(
            "INSERT INTO broadcast_notices (id, event_id, organizer_id, message) VALUES ($1, $2, $3, $4) RETURNING {}",
            NOTICE_COLUMNS
        ))
        .bind(new_record_id())
        .bind(&draft.event_id)
        .bind(&draft.organizer_id)
        .bind(&draft.message)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(row.into())
    }

    async fn watch_notices(&self, event_id: &str, limit: usize) -> StoreResult<LiveQuery<BroadcastNotice>> {
        let pool = self.pool.clone();
        let event = event_id.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        Ok(spawn_live_query(&self.feed, Collection::Notices, event_id.to_string(), move || {
            let pool = pool.clone();
            let event = event.clone();
            async move { Self::fetch_notices(&pool, &event, limit).await }
        }))
    }
}
