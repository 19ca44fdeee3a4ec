pub mod changes;
pub mod identity;
pub mod repository;
pub mod subscription;

use std::future::Future;
use std::time::Duration;

pub use changes::{ChangeKind, ChangeSet, DocChange, Document};
pub use repository::{CheckInWrite, LiveQuery, StoreError, StoreResult};
pub use subscription::Subscription;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Only the event owner may do this: {0}")]
    NotEventOwner(String),
    #[error("Event not found: {0}")]
    EventNotFound(String),
    #[error("Ticket not found: {0}")]
    TicketNotFound(String),
    #[error("Malformed token: {0}")]
    MalformedToken(String),
    #[error("Token window {window} is outside the accepted range (current window {current})")]
    ExpiredToken { window: i64, current: i64 },
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
    #[error("Invalid event: {0}")]
    InvalidEvent(String),
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Unexpected failure: {0}")]
    Unknown(String),
}

impl CoreError {
    /// Whether re-issuing the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::StoreUnavailable(_))
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => CoreError::StoreUnavailable(msg),
            StoreError::Backend(msg) => CoreError::Unknown(msg),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Await a store call, turning a missed deadline into `StoreUnavailable`.
pub async fn within<T, F>(limit: Duration, call: F) -> CoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(CoreError::from),
        Err(_) => {
            tracing::warn!("Store call exceeded {:?}", limit);
            Err(CoreError::StoreUnavailable(format!(
                "no response within {}ms",
                limit.as_millis()
            )))
        }
    }
}
