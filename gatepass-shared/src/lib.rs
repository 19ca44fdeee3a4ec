pub mod models;

pub use models::event::{Event, GeoPoint, NewEvent};
pub use models::notice::{BroadcastNotice, NewNotice};
pub use models::ticket::{NewTicket, Ticket, TicketState};
