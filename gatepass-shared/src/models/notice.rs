use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Host-authored message scoped to one event. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BroadcastNotice {
    pub id: String,
    pub event_id: String,
    pub organizer_id: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewNotice {
    pub event_id: String,
    pub organizer_id: String,
    pub message: String,
}

impl NewNotice {
    pub fn into_notice(self, id: String, created_at: DateTime<Utc>) -> BroadcastNotice {
        BroadcastNotice {
            id,
            event_id: self.event_id,
            organizer_id: self.organizer_id,
            message: self.message,
            created_at,
        }
    }
}
