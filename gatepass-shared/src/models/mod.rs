pub mod event;
pub mod events;
pub mod notice;
pub mod ticket;

/// Generates a fresh opaque record id.
pub fn new_record_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
