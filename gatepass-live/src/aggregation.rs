//! Organizer dashboard: metrics recomputed from the live ticket set.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gatepass_core::repository::TicketRepository;
use gatepass_core::{within, ChangeKind, ChangeSet, CoreResult, Subscription};
use gatepass_shared::Ticket;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const DASHBOARD_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingRules {
    /// Single ticket price, in cents.
    pub unit_price: i64,
    pub recent_window: usize,
}

impl Default for PricingRules {
    fn default() -> Self {
        Self { unit_price: 499, recent_window: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSnapshot {
    pub ticket_count: usize,
    pub checked_in_count: usize,
    pub revenue: i64,
    pub success_rate: f64,
    pub recent: Vec<Ticket>,
}

/// Derive the whole snapshot from the full current ticket set.
pub fn compute_snapshot(tickets: &[Ticket], rules: &PricingRules) -> MetricSnapshot {
    let ticket_count = tickets.len();
    let checked_in_count = tickets.iter().filter(|t| t.is_admitted()).count();

    let success_rate = if ticket_count == 0 {
        0.0
    } else {
        let pct = checked_in_count as f64 / ticket_count as f64 * 100.0;
        (pct * 10.0).round() / 10.0
    };

    let mut recent = tickets.to_vec();
    recent.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
    recent.truncate(rules.recent_window);

    MetricSnapshot {
        ticket_count,
        checked_in_count,
        revenue: ticket_count as i64 * rules.unit_price,
        success_rate,
        recent,
    }
}

/// Lets a snapshot through only when it differs from the last one published.
#[derive(Debug, Default)]
pub struct SnapshotGate {
    last: Option<MetricSnapshot>,
}

impl SnapshotGate {
    pub fn admit(&mut self, snapshot: MetricSnapshot) -> Option<MetricSnapshot> {
        if self.last.as_ref() == Some(&snapshot) {
            return None;
        }
        self.last = Some(snapshot.clone());
        Some(snapshot)
    }

    /// Forget the last snapshot so the next one is published even if unchanged.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DashboardEvent {
    Snapshot(MetricSnapshot),
    CheckedIn { ticket_id: String, at: DateTime<Utc> },
    Reserved { ticket: Ticket },
    /// The ticket feed failed; the last snapshot may be out of date.
    Stalled { reason: String },
}

/// Per-subscription state turning ticket change sets into dashboard events.
#[derive(Debug)]
pub struct DashboardAggregator {
    rules: PricingRules,
    gate: SnapshotGate,
    admitted: HashSet<String>,
    initial_seen: bool,
}

impl DashboardAggregator {
    pub fn new(rules: PricingRules) -> Self {
        Self {
            rules,
            gate: SnapshotGate::default(),
            admitted: HashSet::new(),
            initial_seen: false,
        }
    }

    pub fn apply(&mut self, batch: &ChangeSet<Ticket>) -> Vec<DashboardEvent> {
        let mut out = Vec::new();

        if let Some(snapshot) = self.gate.admit(compute_snapshot(&batch.docs, &self.rules)) {
            out.push(DashboardEvent::Snapshot(snapshot));
        }

        if !self.initial_seen {
            // Everything in the first batch predates the subscription.
            self.initial_seen = true;
            self.admitted.extend(batch.docs.iter().filter(|t| t.is_admitted()).map(|t| t.id.clone()));
            return out;
        }

        for change in &batch.changes {
            let ticket = &change.doc;
            match change.kind {
                ChangeKind::Added => {
                    if ticket.is_admitted() {
                        self.admitted.insert(ticket.id.clone());
                    }
                    out.push(DashboardEvent::Reserved { ticket: ticket.clone() });
                }
                ChangeKind::Modified => {
                    if let Some(at) = ticket.checked_in_at {
                        if self.admitted.insert(ticket.id.clone()) {
                            out.push(DashboardEvent::CheckedIn { ticket_id: ticket.id.clone(), at });
                        }
                    }
                }
                ChangeKind::Removed => {
                    self.admitted.remove(&ticket.id);
                }
            }
        }
        out
    }

    /// The feed failed. The next good batch re-publishes its snapshot so
    /// the listener can leave the stalled state.
    pub fn stall(&mut self, reason: String) -> DashboardEvent {
        self.gate.reset();
        DashboardEvent::Stalled { reason }
    }
}

/// Serves live dashboards, one aggregator per subscription.
pub struct LiveAggregationEngine {
    tickets: Arc<dyn TicketRepository>,
    rules: PricingRules,
    store_timeout: Duration,
}

impl LiveAggregationEngine {
    pub fn new(tickets: Arc<dyn TicketRepository>, rules: PricingRules, store_timeout: Duration) -> Self {
        Self { tickets, rules, store_timeout }
    }

    /// Dashboard events for every ticket whose organizer is `organizer_id`.
    ///
    /// Feed failures are reported as `Stalled` and the subscription stays open.
    pub async fn subscribe(&self, organizer_id: &str) -> CoreResult<Subscription<DashboardEvent>> {
        let mut live = within(self.store_timeout, self.tickets.watch_tickets_by_organizer(organizer_id)).await?;
        let mut aggregator = DashboardAggregator::new(self.rules);
        let organizer = organizer_id.to_string();
        let (tx, rx) = mpsc::channel(DASHBOARD_BUFFER);

        info!("Dashboard subscribed for organizer {}", organizer);

        let feeder = tokio::spawn(async move {
            loop {
                let events = match live.next_item().await {
                    Some(Ok(batch)) => aggregator.apply(&batch),
                    Some(Err(e)) => {
                        warn!("Dashboard feed for {} stalled: {}", organizer, e);
                        vec![aggregator.stall(e.to_string())]
                    }
                    None => {
                        warn!("Dashboard feed for {} ended", organizer);
                        let _ = tx.send(DashboardEvent::Stalled { reason: "ticket feed closed".to_string() }).await;
                        return;
                    }
                };

                for event in events {
                    if tx.send(event).await.is_err() {
                        debug!("Dashboard listener for {} went away", organizer);
                        return;
                    }
                }
            }
        });

        Ok(Subscription::new(rx, feeder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gatepass_core::changes::diff;
    use gatepass_core::{CheckInWrite, LiveQuery, StoreError, StoreResult};
    use gatepass_shared::NewTicket;
    use gatepass_store::MemoryStore;

    fn ticket(id: &str, minute: i64, admitted: bool) -> Ticket {
        let issued_at = DateTime::from_timestamp(1_700_000_000 + minute * 60, 0).unwrap();
        Ticket {
            id: id.to_string(),
            holder_id: format!("holder-{}", id),
            event_id: "event-1".to_string(),
            organizer_id: "host-1".to_string(),
            issued_at,
            checked_in_at: admitted.then(|| issued_at + chrono::Duration::minutes(30)),
        }
    }

    fn batch(prev: &[Ticket], next: &[Ticket]) -> ChangeSet<Ticket> {
        ChangeSet { docs: next.to_vec(), changes: diff(prev, next) }
    }

    #[test]
    fn test_snapshot_arithmetic() {
        let tickets: Vec<Ticket> = (0..10).map(|i| ticket(&format!("t{}", i), i, i < 4)).collect();

        let snapshot = compute_snapshot(&tickets, &PricingRules::default());

        assert_eq!(snapshot.ticket_count, 10);
        assert_eq!(snapshot.checked_in_count, 4);
        assert_eq!(snapshot.revenue, 4990);
        assert_eq!(snapshot.success_rate, 40.0);
        assert_eq!(snapshot.recent.len(), 10);
        assert_eq!(snapshot.recent[0].id, "t9");
    }

    #[test]
    fn test_snapshot_of_empty_set() {
        let snapshot = compute_snapshot(&[], &PricingRules::default());
        assert_eq!(snapshot.revenue, 0);
        assert_eq!(snapshot.success_rate, 0.0);
        assert!(snapshot.recent.is_empty());
    }

    #[test]
    fn test_success_rate_rounds_to_one_decimal() {
        let tickets = vec![ticket("a", 0, true), ticket("b", 1, false), ticket("c", 2, false)];
        assert_eq!(compute_snapshot(&tickets, &PricingRules::default()).success_rate, 33.3);
    }

    #[test]
    fn test_recent_window_trims_oldest() {
        let tickets: Vec<Ticket> = (0..15).map(|i| ticket(&format!("t{}", i), i, false)).collect();
        let rules = PricingRules { unit_price: 100, recent_window: 5 };

        let snapshot = compute_snapshot(&tickets, &rules);

        let ids: Vec<&str> = snapshot.recent.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t14", "t13", "t12", "t11", "t10"]);
    }

    #[test]
    fn test_same_set_publishes_once() {
        let tickets = vec![ticket("a", 0, false), ticket("b", 1, true)];
        let mut aggregator = DashboardAggregator::new(PricingRules::default());

        let first = aggregator.apply(&batch(&[], &tickets));
        let second = aggregator.apply(&batch(&tickets, &tickets));

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[test]
    fn test_check_in_signal_not_repeated() {
        let before = vec![ticket("a", 0, false), ticket("b", 1, false)];
        let after = vec![ticket("a", 0, true), ticket("b", 1, false)];
        let mut aggregator = DashboardAggregator::new(PricingRules::default());
        aggregator.apply(&batch(&[], &before));

        let events = aggregator.apply(&batch(&before, &after));
        let check_ins = events.iter().filter(|e| matches!(e, DashboardEvent::CheckedIn { .. })).count();
        assert_eq!(check_ins, 1);

        // The same modification delivered twice must not signal again.
        let replay = aggregator.apply(&batch(&before, &after));
        assert!(!replay.iter().any(|e| matches!(e, DashboardEvent::CheckedIn { .. })));
    }

    #[test]
    fn test_initial_batch_emits_no_signals() {
        let tickets = vec![ticket("a", 0, true), ticket("b", 1, false)];
        let mut aggregator = DashboardAggregator::new(PricingRules::default());

        let events = aggregator.apply(&batch(&[], &tickets));

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], DashboardEvent::Snapshot(_)));
    }

    #[test]
    fn test_new_reservation_signals() {
        let before = vec![ticket("a", 0, false)];
        let after = vec![ticket("a", 0, false), ticket("b", 1, false)];
        let mut aggregator = DashboardAggregator::new(PricingRules::default());
        aggregator.apply(&batch(&[], &before));

        let events = aggregator.apply(&batch(&before, &after));

        assert!(matches!(&events[0], DashboardEvent::Snapshot(s) if s.ticket_count == 2));
        assert!(matches!(&events[1], DashboardEvent::Reserved { ticket } if ticket.id == "b"));
    }

    #[tokio::test]
    async fn test_engine_follows_store() {
        let store = MemoryStore::new();
        let draft = |holder: &str| NewTicket {
            holder_id: holder.to_string(),
            event_id: "event-1".to_string(),
            organizer_id: "host-1".to_string(),
        };
        let alice = store.create_ticket(draft("alice")).await.unwrap();
        store.create_ticket(draft("bob")).await.unwrap();

        let engine = LiveAggregationEngine::new(Arc::new(store.clone()), PricingRules::default(), Duration::from_secs(2));
        let mut dashboard = engine.subscribe("host-1").await.unwrap();

        let Some(DashboardEvent::Snapshot(initial)) = dashboard.next_item().await else {
            panic!("expected initial snapshot");
        };
        assert_eq!(initial.ticket_count, 2);
        assert_eq!(initial.revenue, 998);

        let write = store.check_in_if_pending(&alice.id).await.unwrap();
        assert!(matches!(write, CheckInWrite::Applied(_)));

        let Some(DashboardEvent::Snapshot(updated)) = dashboard.next_item().await else {
            panic!("expected updated snapshot");
        };
        assert_eq!(updated.checked_in_count, 1);
        assert_eq!(updated.success_rate, 50.0);
        assert!(matches!(
            dashboard.next_item().await,
            Some(DashboardEvent::CheckedIn { ticket_id, .. }) if ticket_id == alice.id
        ));
    }

    struct FailingFeed;

    #[async_trait]
    impl TicketRepository for FailingFeed {
        async fn create_ticket(&self, _draft: NewTicket) -> StoreResult<Ticket> {
            Err(StoreError::Backend("read only".to_string()))
        }
        async fn get_ticket(&self, _id: &str) -> StoreResult<Option<Ticket>> {
            Ok(None)
        }
        async fn find_ticket(&self, _holder_id: &str, _event_id: &str) -> StoreResult<Option<Ticket>> {
            Ok(None)
        }
        async fn check_in_if_pending(&self, _id: &str) -> StoreResult<CheckInWrite> {
            Ok(CheckInWrite::Missing)
        }
        async fn delete_ticket(&self, _id: &str) -> StoreResult<()> {
            Ok(())
        }
        async fn watch_tickets_by_organizer(&self, _organizer_id: &str) -> StoreResult<LiveQuery<Ticket>> {
            let (tx, rx) = mpsc::channel(4);
            let feeder = tokio::spawn(async move {
                let _ = tx.send(Err(StoreError::Unavailable("connection reset".to_string()))).await;
                std::future::pending::<()>().await;
            });
            Ok(Subscription::new(rx, feeder))
        }
    }

    #[tokio::test]
    async fn test_feed_error_reported_as_stalled() {
        let engine = LiveAggregationEngine::new(Arc::new(FailingFeed), PricingRules::default(), Duration::from_secs(2));
        let mut dashboard = engine.subscribe("host-1").await.unwrap();

        let event = dashboard.next_item().await;

        assert!(matches!(event, Some(DashboardEvent::Stalled { reason }) if reason.contains("connection reset")));
        assert!(!dashboard.is_cancelled());
    }

    #[test]
    fn test_unchanged_snapshot_republished_after_stall() {
        let tickets = vec![ticket("a", 0, true)];
        let mut aggregator = DashboardAggregator::new(PricingRules::default());
        aggregator.apply(&batch(&[], &tickets));

        let stalled = aggregator.stall("connection reset".to_string());
        assert!(matches!(stalled, DashboardEvent::Stalled { .. }));

        let events = aggregator.apply(&batch(&tickets, &tickets));
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], DashboardEvent::Snapshot(s) if s.checked_in_count == 1));
    }

    #[tokio::test]
    async fn test_dashboard_recovers_after_outage() {
        let store = MemoryStore::new();
        store
            .create_ticket(NewTicket {
                holder_id: "alice".to_string(),
                event_id: "event-1".to_string(),
                organizer_id: "host-1".to_string(),
            })
            .await
            .unwrap();

        let engine = LiveAggregationEngine::new(Arc::new(store.clone()), PricingRules::default(), Duration::from_secs(2));
        let mut dashboard = engine.subscribe("host-1").await.unwrap();
        assert!(matches!(dashboard.next_item().await, Some(DashboardEvent::Snapshot(_))));

        store.set_offline(true);
        assert!(matches!(dashboard.next_item().await, Some(DashboardEvent::Stalled { .. })));

        store.set_offline(false);
        let recovered = tokio::time::timeout(Duration::from_secs(1), dashboard.next_item())
            .await
            .expect("no snapshot after recovery");
        assert!(matches!(recovered, Some(DashboardEvent::Snapshot(s)) if s.ticket_count == 1));
    }
}
