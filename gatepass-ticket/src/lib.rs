pub mod manager;
pub mod token;

pub use manager::{IssuedToken, Reservation, TicketManager, VerificationResult};
pub use token::{TokenError, TokenRotation, WindowPolicy};
