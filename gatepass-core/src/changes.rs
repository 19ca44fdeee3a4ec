//! Change sets delivered by live queries.
//!
//! A live query always hands out the complete filtered result set together
//! with the per-document changes since its previous delivery. Consumers that
//! only need the aggregate look at `docs`; consumers that care about *what
//! happened* (a new reservation versus a check-in) look at `changes`.

use std::collections::HashMap;

use gatepass_shared::{BroadcastNotice, Event, Ticket};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocChange<T> {
    pub kind: ChangeKind,
    pub doc: T,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet<T> {
    pub docs: Vec<T>,
    pub changes: Vec<DocChange<T>>,
}

impl<T> ChangeSet<T> {
    pub fn is_quiet(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Records addressable by a stable id
pub trait Document {
    fn doc_id(&self) -> &str;
}

impl Document for Ticket {
    fn doc_id(&self) -> &str {
        &self.id
    }
}

impl Document for Event {
    fn doc_id(&self) -> &str {
        &self.id
    }
}

impl Document for BroadcastNotice {
    fn doc_id(&self) -> &str {
        &self.id
    }
}

/// Compute the changes turning `prev` into `next`.
///
/// Added and modified documents follow `next` order; removals follow `prev`.
pub fn diff<T>(prev: &[T], next: &[T]) -> Vec<DocChange<T>>
where
    T: Document + Clone + PartialEq,
{
    let before: HashMap<&str, &T> = prev.iter().map(|d| (d.doc_id(), d)).collect();
    let after: HashMap<&str, &T> = next.iter().map(|d| (d.doc_id(), d)).collect();

    let mut changes = Vec::new();
    for doc in next {
        match before.get(doc.doc_id()) {
            None => changes.push(DocChange { kind: ChangeKind::Added, doc: doc.clone() }),
            Some(old) if *old != doc => {
                changes.push(DocChange { kind: ChangeKind::Modified, doc: doc.clone() })
            }
            Some(_) => {}
        }
    }
    for doc in prev {
        if !after.contains_key(doc.doc_id()) {
            changes.push(DocChange { kind: ChangeKind::Removed, doc: doc.clone() });
        }
    }
    changes
}
