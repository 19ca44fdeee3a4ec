use std::time::Duration;

use tokio::time::Instant;

/// Transient highlight raised by fresh notices.
///
/// Each trigger pushes the deadline out to `now + window`; once the deadline
/// passes with no further trigger the pulse is over.
#[derive(Debug, Clone)]
pub struct AttentionPulse {
    window: Duration,
    deadline: Option<Instant>,
}

impl AttentionPulse {
    pub fn new(window: Duration) -> Self {
        Self { window, deadline: None }
    }

    /// Start or extend the pulse, returning the new deadline.
    pub fn trigger(&mut self, now: Instant) -> Instant {
        let deadline = now + self.window;
        self.deadline = Some(deadline);
        deadline
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn clear(&mut self) {
        self.deadline = None;
    }
}
