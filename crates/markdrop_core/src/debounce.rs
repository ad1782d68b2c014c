//! Submission gating and hover reference counting.
//!
//! # Responsibility
//! - Reject a second submission for a source that already has one in flight.
//! - Enforce a minimum interval between accepted operations so redundant
//!   detection paths and rapid repeats collapse into one operation.
//! - Count nested enter/leave signals per drop zone so highlight changes fire
//!   only at the 0/1 boundary.
//!
//! # Invariants
//! - An active key is held by exactly one `KeyLease`; dropping the lease is
//!   the only way to release it.

use crate::gesture::targets::ElementKey;
use crate::model::mutation::{DedupeKey, MutationRequest};
use crate::model::node::NodeId;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Why a submission was not admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebounceRejection {
    /// Source already has an operation in flight.
    InFlight(NodeId),
    /// Arrived inside the minimum interval after the previous operation.
    TooSoon { key: String, remaining: Duration },
}

impl Display for DebounceRejection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InFlight(id) => write!(f, "operation already in flight for {id}"),
            Self::TooSoon { key, remaining } => write!(
                f,
                "operation {key} suppressed; {}ms left in debounce window",
                remaining.as_millis()
            ),
        }
    }
}

impl Error for DebounceRejection {}

#[derive(Debug, Default)]
struct DebounceState {
    active: HashSet<NodeId>,
    last_accepted: Option<(Instant, DedupeKey)>,
}

/// Gate in front of the mutation queue.
#[derive(Debug, Clone)]
pub struct OperationDebouncer {
    window: Duration,
    state: Arc<Mutex<DebounceState>>,
}

impl OperationDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Arc::new(Mutex::new(DebounceState::default())),
        }
    }

    /// Admits one request, returning the lease that keeps its key active.
    pub fn admit(&self, request: &MutationRequest) -> Result<KeyLease, DebounceRejection> {
        let now = Instant::now();
        let key = request.dedupe_key();
        let mut state = lock(&self.state);

        if state.active.contains(&key.source_id) {
            log::debug!(
                "event=submission_rejected module=debounce status=in_flight key={}",
                key
            );
            return Err(DebounceRejection::InFlight(key.source_id));
        }

        if let Some((last_at, last_key)) = state.last_accepted.as_ref() {
            let elapsed = now.saturating_duration_since(*last_at);
            if elapsed < self.window {
                log::debug!(
                    "event=submission_rejected module=debounce status=too_soon key={} previous={} elapsed_ms={}",
                    key,
                    last_key,
                    elapsed.as_millis()
                );
                return Err(DebounceRejection::TooSoon {
                    key: key.to_string(),
                    remaining: self.window - elapsed,
                });
            }
        }

        state.active.insert(key.source_id.clone());
        let source_id = key.source_id.clone();
        state.last_accepted = Some((now, key));
        Ok(KeyLease {
            source_id,
            state: Arc::clone(&self.state),
        })
    }

    pub fn is_active(&self, source_id: &NodeId) -> bool {
        lock(&self.state).active.contains(source_id)
    }

    pub fn active_count(&self) -> usize {
        lock(&self.state).active.len()
    }
}

/// RAII handle for one active operation key.
#[derive(Debug)]
pub struct KeyLease {
    source_id: NodeId,
    state: Arc<Mutex<DebounceState>>,
}

impl KeyLease {
    pub fn source_id(&self) -> &NodeId {
        &self.source_id
    }

    /// Moves the lease to the id the store now uses for the same node.
    ///
    /// Returns `false` and keeps the old key when `new_id` is already held.
    pub fn rebind(&mut self, new_id: NodeId) -> bool {
        if new_id == self.source_id {
            return true;
        }
        let mut state = lock(&self.state);
        if !state.active.insert(new_id.clone()) {
            log::warn!(
                "event=lease_rebind module=debounce status=conflict old={} new={}",
                self.source_id,
                new_id
            );
            return false;
        }
        state.active.remove(&self.source_id);
        self.source_id = new_id;
        true
    }
}

impl Drop for KeyLease {
    fn drop(&mut self) {
        lock(&self.state).active.remove(&self.source_id);
    }
}

fn lock(state: &Mutex<DebounceState>) -> MutexGuard<'_, DebounceState> {
    state
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Highlight transition produced by the hover counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightChange {
    pub element: ElementKey,
    pub active: bool,
}

/// Per-zone enter/leave reference counter.
#[derive(Debug, Default)]
pub struct HoverCounter {
    counts: HashMap<ElementKey, usize>,
}

impl HoverCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one enter; returns a change only on the 0 -> 1 edge.
    pub fn enter(&mut self, element: &ElementKey) -> Option<HighlightChange> {
        let count = self.counts.entry(element.clone()).or_insert(0);
        *count += 1;
        (*count == 1).then(|| HighlightChange {
            element: element.clone(),
            active: true,
        })
    }

    /// Records one leave; returns a change only on the 1 -> 0 edge.
    ///
    /// Unmatched leaves are ignored.
    pub fn leave(&mut self, element: &ElementKey) -> Option<HighlightChange> {
        let count = self.counts.get_mut(element)?;
        *count -= 1;
        if *count > 0 {
            return None;
        }
        self.counts.remove(element);
        Some(HighlightChange {
            element: element.clone(),
            active: false,
        })
    }

    pub fn is_highlighted(&self, element: &ElementKey) -> bool {
        self.counts.contains_key(element)
    }

    /// Clears every counter, returning the highlights to switch off.
    pub fn reset(&mut self) -> Vec<HighlightChange> {
        let mut changes: Vec<HighlightChange> = self
            .counts
            .drain()
            .map(|(element, _)| HighlightChange {
                element,
                active: false,
            })
            .collect();
        changes.sort_by(|left, right| left.element.cmp(&right.element));
        changes
    }
}
