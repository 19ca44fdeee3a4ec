//! Change feed and live-query driver shared by every store backend.
//!
//! Backends publish a `StoreChange` after each committed mutation. A live
//! query re-reads its full filtered set whenever a matching change arrives
//! and diffs it against what it delivered last, so a listener never sees a
//! state older than one it has already seen.

use std::future::Future;

use gatepass_core::changes::diff;
use gatepass_core::{ChangeSet, Document, LiveQuery, StoreResult, Subscription};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tracing::{debug, warn};

const FEED_CAPACITY: usize = 1024;
const LIVE_QUERY_BUFFER: usize = 16;
const ANY_SCOPE: &str = "*";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Events,
    Tickets,
    Notices,
}

/// A committed mutation, keyed by the value live queries filter on
/// (organizer for tickets, event for notices, owner for events).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreChange {
    pub collection: Collection,
    pub scope: String,
}

impl StoreChange {
    pub fn new(collection: Collection, scope: impl Into<String>) -> Self {
        Self { collection, scope: scope.into() }
    }

    /// Forces every live query on `collection` to re-read.
    pub fn resync(collection: Collection) -> Self {
        Self::new(collection, ANY_SCOPE)
    }

    pub fn matches(&self, collection: Collection, scope: &str) -> bool {
        self.collection == collection && (self.scope == scope || self.scope == ANY_SCOPE)
    }
}

#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<StoreChange>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, change: StoreChange) {
        // No receivers just means nobody is watching.
        let _ = self.tx.send(change);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.tx.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn a live query over `fetch`, re-run on every matching change.
pub fn spawn_live_query<T, F, Fut>(
    feed: &ChangeFeed,
    collection: Collection,
    scope: String,
    fetch: F,
) -> LiveQuery<T>
where
    T: Document + Clone + PartialEq + Send + 'static,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = StoreResult<Vec<T>>> + Send + 'static,
{
    // Subscribe before the first read so no mutation slips between them.
    let mut triggers = feed.subscribe();
    let (tx, rx) = mpsc::channel(LIVE_QUERY_BUFFER);

    let feeder = tokio::spawn(async move {
        let mut last: Vec<T> = Vec::new();
        let mut delivered = false;
        // The first good read after a failure is always delivered so
        // listeners can leave their stalled state even if nothing changed.
        let mut errored = false;

        loop {
            match fetch().await {
                Ok(docs) => {
                    let changes = diff(&last, &docs);
                    let set = ChangeSet { docs, changes };
                    if !delivered || errored || !set.is_quiet() {
                        if errored {
                            debug!("Live query on {:?}/{} recovered", collection, scope);
                        }
                        delivered = true;
                        errored = false;
                        last = set.docs.clone();
                        if tx.send(Ok(set)).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!("Live query on {:?}/{} failed: {}", collection, scope, e);
                    errored = true;
                    if tx.send(Err(e)).await.is_err() {
                        return;
                    }
                }
            }

            loop {
                match triggers.recv().await {
                    Ok(change) if change.matches(collection, &scope) => break,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Live query on {:?}/{} lagged by {}, re-reading", collection, scope, skipped);
                        break;
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        }
    });

    Subscription::new(rx, feeder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use gatepass_core::StoreError;
    use gatepass_shared::Ticket;

    #[test]
    fn test_resync_matches_every_scope() {
        let resync = StoreChange::resync(Collection::Tickets);
        assert!(resync.matches(Collection::Tickets, "host-1"));
        assert!(resync.matches(Collection::Tickets, "host-2"));
        assert!(!resync.matches(Collection::Notices, "host-1"));
    }

    #[test]
    fn test_change_payload_matches_trigger_format() {
        let change: StoreChange =
            serde_json::from_str(r#"{"collection":"tickets","scope":"host-1"}"#).unwrap();
        assert_eq!(change, StoreChange::new(Collection::Tickets, "host-1"));
    }

    #[tokio::test]
    async fn test_unchanged_read_after_failure_is_delivered() {
        let feed = ChangeFeed::new();
        let reads = Arc::new(AtomicUsize::new(0));
        let counter = reads.clone();
        let mut live: LiveQuery<Ticket> =
            spawn_live_query(&feed, Collection::Tickets, "host-1".to_string(), move || {
                let attempt = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 1 {
                        Err(StoreError::Unavailable("connection reset".to_string()))
                    } else {
                        Ok(Vec::new())
                    }
                }
            });

        assert!(matches!(live.next_item().await, Some(Ok(_))));

        feed.publish(StoreChange::new(Collection::Tickets, "host-1"));
        assert!(matches!(live.next_item().await, Some(Err(StoreError::Unavailable(_)))));

        feed.publish(StoreChange::resync(Collection::Tickets));
        let recovered = tokio::time::timeout(Duration::from_secs(1), live.next_item())
            .await
            .expect("recovery read was not delivered");
        assert!(matches!(recovered, Some(Ok(set)) if set.is_quiet() && set.docs.is_empty()));

        // Once recovered, unchanged reads are suppressed again.
        feed.publish(StoreChange::resync(Collection::Tickets));
        let quiet = tokio::time::timeout(Duration::from_millis(200), live.next_item()).await;
        assert!(quiet.is_err());
        assert_eq!(reads.load(Ordering::SeqCst), 4);
    }
}
