use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Map centre used when a host does not share a location.
impl Default for GeoPoint {
    fn default() -> Self {
        Self::new(40.7128, -74.0060)
    }
}

/// A hosted occurrence that tickets are reserved against
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: GeoPoint,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn is_owned_by(&self, identity: &str) -> bool {
        self.owner_id == identity
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewEvent {
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub location: GeoPoint,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl NewEvent {
    pub fn into_event(self, id: String, created_at: DateTime<Utc>) -> Event {
        Event {
            id,
            owner_id: self.owner_id,
            title: self.title,
            description: self.description,
            category: self.category,
            location: self.location,
            start_time: self.start_time,
            end_time: self.end_time,
            created_at,
        }
    }
}
