use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gatepass_core::repository::{EventRepository, TicketRepository};
use gatepass_core::{within, CheckInWrite, CoreError, CoreResult};
use gatepass_shared::{NewTicket, Ticket};
use serde::Serialize;
use tracing::{info, warn};

use crate::token::{self, TokenError, TokenRotation, WindowPolicy};

/// Title reported when the ticket's event has since been removed.
const FALLBACK_EVENT_TITLE: &str = "Registered Event";

/// Outcome of a well-formed verification attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerificationResult {
    /// This scan performed the check-in.
    Admitted {
        ticket: Ticket,
        event_title: String,
        at: DateTime<Utc>,
    },
    /// The ticket had already been used; nothing was changed.
    AlreadyAdmitted { ticket: Ticket, at: DateTime<Utc> },
}

impl VerificationResult {
    pub fn is_admitted(&self) -> bool {
        matches!(self, VerificationResult::Admitted { .. })
    }

    pub fn ticket(&self) -> &Ticket {
        match self {
            VerificationResult::Admitted { ticket, .. } => ticket,
            VerificationResult::AlreadyAdmitted { ticket, .. } => ticket,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub ticket: Ticket,
    pub created: bool,
}

/// Token currently displayed for a ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedToken {
    pub ticket_id: String,
    pub token: String,
    pub window: i64,
    pub refresh_after_secs: u64,
}

impl IssuedToken {
    pub fn issue(rotation: &TokenRotation, ticket_id: &str, now: DateTime<Utc>) -> Result<Self, TokenError> {
        let window = rotation.window_at(now);
        Ok(Self {
            ticket_id: ticket_id.to_string(),
            token: token::encode(ticket_id, window)?,
            window,
            refresh_after_secs: rotation.refresh_secs,
        })
    }
}

/// Issues tickets and drives the Reserved -> Admitted transition.
///
/// Holds no ticket state of its own: every decision is taken from what the
/// store reports, and the check-in itself is the store's conditional write.
pub struct TicketManager {
    tickets: Arc<dyn TicketRepository>,
    events: Arc<dyn EventRepository>,
    rotation: TokenRotation,
    window_policy: WindowPolicy,
    store_timeout: Duration,
}

impl TicketManager {
    pub fn new(
        tickets: Arc<dyn TicketRepository>,
        events: Arc<dyn EventRepository>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            tickets,
            events,
            rotation: TokenRotation::default(),
            window_policy: WindowPolicy::default(),
            store_timeout,
        }
    }

    pub fn with_rotation(mut self, rotation: TokenRotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_window_policy(mut self, policy: WindowPolicy) -> Self {
        self.window_policy = policy;
        self
    }

    pub fn rotation(&self) -> TokenRotation {
        self.rotation
    }

    /// Reserve a ticket for `holder`.
    ///
    /// A holder who already has a ticket for the event gets that ticket back
    /// and nothing is written.
    pub async fn reserve(&self, holder: Option<&str>, event_id: &str) -> CoreResult<Ticket> {
        self.reserve_tracked(holder, event_id).await.map(|r| r.ticket)
    }

    /// Like [`TicketManager::reserve`], also telling whether a ticket was created.
    pub async fn reserve_tracked(&self, holder: Option<&str>, event_id: &str) -> CoreResult<Reservation> {
        let holder = holder.ok_or(CoreError::NotAuthenticated)?;

        let event = within(self.store_timeout, self.events.get_event(event_id))
            .await?
            .ok_or_else(|| CoreError::EventNotFound(event_id.to_string()))?;

        if let Some(existing) = within(self.store_timeout, self.tickets.find_ticket(holder, event_id)).await? {
            info!("Holder already has ticket {} for event {}", existing.id, event_id);
            return Ok(Reservation { ticket: existing, created: false });
        }

        let draft = NewTicket {
            holder_id: holder.to_string(),
            event_id: event.id,
            organizer_id: event.owner_id,
        };
        let ticket = within(self.store_timeout, self.tickets.create_ticket(draft)).await?;

        info!("Ticket {} reserved for event {}", ticket.id, ticket.event_id);
        Ok(Reservation { ticket, created: true })
    }

    pub async fn verify(&self, token: &str) -> CoreResult<VerificationResult> {
        self.verify_at(token, Utc::now()).await
    }

    /// Verify `token` as scanned at `now`.
    pub async fn verify_at(&self, token: &str, now: DateTime<Utc>) -> CoreResult<VerificationResult> {
        let (ticket_id, window) = token::decode(token)?;
        self.window_policy.check(window, self.rotation.window_at(now))?;

        let write = within(self.store_timeout, self.tickets.check_in_if_pending(&ticket_id)).await?;

        match write {
            CheckInWrite::Missing => Err(CoreError::TicketNotFound(ticket_id)),
            CheckInWrite::AlreadySet(ticket) => {
                let at = ticket.checked_in_at.ok_or_else(|| {
                    CoreError::Unknown(format!("ticket {} rejected as admitted without a check-in time", ticket.id))
                })?;
                warn!("Ticket {} presented again after check-in at {}", ticket.id, at);
                Ok(VerificationResult::AlreadyAdmitted { ticket, at })
            }
            CheckInWrite::Applied(ticket) => {
                let at = ticket.checked_in_at.unwrap_or(now);
                let event_title = self.event_title(&ticket.event_id).await;
                info!("Ticket {} admitted to event {}", ticket.id, ticket.event_id);
                Ok(VerificationResult::Admitted { ticket, event_title, at })
            }
        }
    }

    /// Host-initiated cancellation. Idempotent.
    pub async fn revoke(&self, requester: Option<&str>, ticket_id: &str) -> CoreResult<()> {
        let requester = requester.ok_or(CoreError::NotAuthenticated)?;

        let Some(ticket) = within(self.store_timeout, self.tickets.get_ticket(ticket_id)).await? else {
            return Ok(());
        };
        if ticket.organizer_id != requester {
            return Err(CoreError::NotEventOwner(ticket.event_id));
        }

        within(self.store_timeout, self.tickets.delete_ticket(ticket_id)).await?;
        info!("Ticket {} revoked", ticket_id);
        Ok(())
    }

    pub async fn get_ticket(&self, ticket_id: &str) -> CoreResult<Ticket> {
        within(self.store_timeout, self.tickets.get_ticket(ticket_id))
            .await?
            .ok_or_else(|| CoreError::TicketNotFound(ticket_id.to_string()))
    }

    /// The holder's ticket for an event, if any.
    pub async fn ticket_for(&self, holder: Option<&str>, event_id: &str) -> CoreResult<Option<Ticket>> {
        let holder = holder.ok_or(CoreError::NotAuthenticated)?;
        within(self.store_timeout, self.tickets.find_ticket(holder, event_id)).await
    }

    /// Token to display for the holder's ticket at `now`.
    ///
    /// Tickets of other holders are reported as not found.
    pub async fn current_token(
        &self,
        holder: Option<&str>,
        ticket_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<IssuedToken> {
        let holder = holder.ok_or(CoreError::NotAuthenticated)?;
        let ticket = self.get_ticket(ticket_id).await?;
        if ticket.holder_id != holder {
            return Err(CoreError::TicketNotFound(ticket_id.to_string()));
        }

        Ok(IssuedToken::issue(&self.rotation, &ticket.id, now)?)
    }

    async fn event_title(&self, event_id: &str) -> String {
        match within(self.store_timeout, self.events.get_event(event_id)).await {
            Ok(Some(event)) => event.title,
            Ok(None) => FALLBACK_EVENT_TITLE.to_string(),
            Err(e) => {
                warn!("Could not load event {} after check-in: {}", event_id, e);
                FALLBACK_EVENT_TITLE.to_string()
            }
        }
    }
}
