//! In-process relay.
//!
//! Implements the same filter semantics a real relay does (newest first,
//! `limit` applied after sorting) with knobs for failure injection: going
//! offline (every call fails to connect), rejecting every publish while
//! still serving queries, or rejecting publishes of a single event kind.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::endpoint::{RelayEndpoint, RelayError};
use super::filter::Filter;
use crate::event::{Event, EventKind};

#[derive(Debug, Default)]
pub struct MemoryRelay {
    url: String,
    events: RwLock<Vec<Event>>,
    offline: AtomicBool,
    rejecting: AtomicBool,
    rejected_kind: RwLock<Option<u32>>,
    accepted: AtomicUsize,
}

impl MemoryRelay {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// While offline every call fails as if the socket never opened.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// While rejecting, publishes fail but queries still answer.
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    /// Reject publishes of `kind` only. `None` lifts the restriction.
    pub fn reject_kind(&self, kind: Option<EventKind>) {
        *self.rejected_kind.write() = kind.map(|k| k.as_u32());
    }

    /// Put an event in storage without going through `publish`.
    pub fn seed(&self, event: Event) {
        let mut events = self.events.write();
        if !events.iter().any(|e| e.id == event.id) {
            events.push(event);
        }
    }

    /// Snapshot of everything stored.
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Number of publishes acknowledged so far, duplicates included.
    pub fn accepted_publishes(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), RelayError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RelayError::Connect(format!("{} is offline", self.url)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RelayEndpoint for MemoryRelay {
    fn url(&self) -> &str {
        &self.url
    }

    async fn publish(&self, event: &Event) -> Result<(), RelayError> {
        self.check_online()?;
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(RelayError::Rejected("blocked: relay is read-only".into()));
        }
        if *self.rejected_kind.read() == Some(event.kind) {
            return Err(RelayError::Rejected(format!(
                "blocked: kind {} not accepted",
                event.kind
            )));
        }
        self.seed(event.clone());
        self.accepted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn query(&self, filter: &Filter) -> Result<Vec<Event>, RelayError> {
        self.check_online()?;
        let mut matched: Vec<Event> = self
            .events
            .read()
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }
}
