pub mod catalog;

pub use catalog::{EventCatalog, EventDraft, HostedFeedEvent};
