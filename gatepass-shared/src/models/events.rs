//! Payloads emitted to the outbound event stream.

use chrono::{DateTime, Utc};

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct TicketReservedEvent {
    pub ticket_id: String,
    pub event_id: String,
    pub organizer_id: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct TicketCheckedInEvent {
    pub ticket_id: String,
    pub event_id: String,
    pub checked_in_at: DateTime<Utc>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct NoticePublishedEvent {
    pub notice_id: String,
    pub event_id: String,
    pub organizer_id: String,
    pub timestamp: i64,
}
