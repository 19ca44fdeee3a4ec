use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Check-in state of a ticket
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketState {
    Reserved,
    Admitted,
}

/// One reservation granting a single admission to one event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ticket {
    pub id: String,
    pub holder_id: String,
    pub event_id: String,
    /// Owner of the event at reservation time, fixed for the ticket's lifetime.
    pub organizer_id: String,
    pub issued_at: DateTime<Utc>,
    pub checked_in_at: Option<DateTime<Utc>>,
}

impl Ticket {
    pub fn state(&self) -> TicketState {
        match self.checked_in_at {
            Some(_) => TicketState::Admitted,
            None => TicketState::Reserved,
        }
    }

    pub fn is_admitted(&self) -> bool {
        self.checked_in_at.is_some()
    }
}

/// Client-supplied fields of a ticket; id and timestamps come from the store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewTicket {
    pub holder_id: String,
    pub event_id: String,
    pub organizer_id: String,
}

impl NewTicket {
    /// Materialize the draft with a store-assigned id and issue time.
    pub fn into_ticket(self, id: String, issued_at: DateTime<Utc>) -> Ticket {
        Ticket {
            id,
            holder_id: self.holder_id,
            event_id: self.event_id,
            organizer_id: self.organizer_id,
            issued_at,
            checked_in_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ticket_starts_reserved() {
        let draft = NewTicket {
            holder_id: "holder-1".to_string(),
            event_id: "event-1".to_string(),
            organizer_id: "host-1".to_string(),
        };

        let ticket = draft.into_ticket("t-1".to_string(), Utc::now());

        assert_eq!(ticket.state(), TicketState::Reserved);
        assert_eq!(ticket.organizer_id, "host-1");
        assert!(!ticket.is_admitted());
    }
}
