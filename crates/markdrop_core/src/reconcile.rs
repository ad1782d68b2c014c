//! UI mirror with optimistic updates and store reconciliation.
//!
//! # Responsibility
//! - Apply accepted moves to the local mirror before the store confirms.
//! - Replace the mirror with store state after every resolved move.
//! - Undo a single optimistic move when the store rejects it.
//!
//! # Invariants
//! - The mirror is a disposable read copy; it never decides protection.
//! - A refetch keeps still-pending optimistic moves applied on top of the
//!   fresh store state.
//! - The mirror lock is never held across an `.await`.

use crate::model::node::{Destination, NodeId};
use crate::model::tree::BookmarkTree;
use crate::store::{timed, ChangeEvent, Store, StoreError, StoreOp};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Record of one optimistic move, enough to reverse it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimisticTicket {
    pub request_id: Uuid,
    pub source: NodeId,
    pub from: Destination,
    pub to: Destination,
}

#[derive(Debug, Default)]
struct UiMirror {
    tree: BookmarkTree,
    generation: u64,
    stale: bool,
    pending: Vec<OptimisticTicket>,
}

/// Shared handle to the UI mirror.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    mirror: Arc<Mutex<UiMirror>>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tree(tree: BookmarkTree) -> Self {
        let reconciler = Self::new();
        reconciler.replace(tree);
        reconciler
    }

    pub fn snapshot(&self) -> BookmarkTree {
        self.lock().tree.clone()
    }

    /// Runs `read` against the current mirror tree.
    pub fn with_tree_ref<R>(&self, read: impl FnOnce(&BookmarkTree) -> R) -> R {
        read(&self.lock().tree)
    }

    /// Bumped on every full replacement.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// True once a store change or a resolved move made the mirror outdated.
    pub fn is_stale(&self) -> bool {
        self.lock().stale
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn invalidate(&self) {
        let mut mirror = self.lock();
        if !mirror.stale {
            mirror.stale = true;
            log::debug!(
                "event=mirror_invalidated module=reconcile status=ok generation={}",
                mirror.generation
            );
        }
    }

    /// Installs a fresh store tree and re-applies pending optimistic moves.
    pub fn replace(&self, tree: BookmarkTree) {
        let mut mirror = self.lock();
        mirror.tree = tree;
        mirror.generation += 1;
        mirror.stale = false;
        let UiMirror { tree, pending, .. } = &mut *mirror;
        for ticket in pending.iter() {
            if tree.move_node(&ticket.source, &ticket.to).is_none() {
                log::debug!(
                    "event=optimistic_reapply_skipped module=reconcile status=ok request={} source={}",
                    ticket.request_id,
                    ticket.source
                );
            }
        }
        log::info!(
            "event=mirror_refreshed module=reconcile status=ok generation={} nodes={} pending={}",
            mirror.generation,
            mirror.tree.len(),
            mirror.pending.len()
        );
    }

    /// Refetches the canonical tree from the store.
    pub async fn refresh(&self, store: &dyn Store, limit: Duration) -> Result<u64, StoreError> {
        let roots = timed(StoreOp::GetTree, limit, store.get_tree()).await?;
        self.replace(BookmarkTree::new(roots));
        Ok(self.generation())
    }

    /// Moves `source` to `to` in the mirror; `None` if the mirror cannot place it.
    pub fn apply_optimistic(
        &self,
        request_id: Uuid,
        source: &NodeId,
        to: &Destination,
    ) -> Option<OptimisticTicket> {
        let mut mirror = self.lock();
        let from = mirror.tree.position_of(source)?;
        let index = mirror.tree.move_node(source, to)?;
        let ticket = OptimisticTicket {
            request_id,
            source: source.clone(),
            from,
            to: Destination {
                parent_id: to.parent_id.clone(),
                index,
            },
        };
        mirror.pending.push(ticket.clone());
        log::debug!(
            "event=optimistic_applied module=reconcile status=ok request={} source={} from={} to={}",
            request_id,
            source,
            ticket.from,
            ticket.to
        );
        Some(ticket)
    }

    /// Reverses one optimistic move locally and forgets it.
    ///
    /// Returns `false` when the node is no longer where the ticket put it.
    pub fn rollback(&self, ticket: &OptimisticTicket) -> bool {
        let mut mirror = self.lock();
        mirror
            .pending
            .retain(|pending| pending.request_id != ticket.request_id);
        if mirror.tree.position_of(&ticket.source).as_ref() != Some(&ticket.to) {
            return false;
        }
        let reverted = mirror.tree.move_node(&ticket.source, &ticket.from).is_some();
        log::info!(
            "event=optimistic_rolled_back module=reconcile status={} request={} source={}",
            if reverted { "ok" } else { "error" },
            ticket.request_id,
            ticket.source
        );
        reverted
    }

    /// Marks one optimistic move confirmed; the next refetch owns its state.
    pub fn confirm(&self, ticket: &OptimisticTicket) {
        let mut mirror = self.lock();
        mirror
            .pending
            .retain(|pending| pending.request_id != ticket.request_id);
        mirror.stale = true;
    }

    fn lock(&self) -> MutexGuard<'_, UiMirror> {
        self.mirror
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Invalidates the mirror on every store change notification.
pub fn spawn_change_listener(
    mut changes: broadcast::Receiver<ChangeEvent>,
    reconciler: Reconciler,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => {
                    log::debug!(
                        "event=store_change module=reconcile status=ok change={:?}",
                        change
                    );
                    reconciler.invalidate();
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!(
                        "event=store_change module=reconcile status=lagged skipped={}",
                        skipped
                    );
                    reconciler.invalidate();
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        log::debug!("event=change_listener_stopped module=reconcile status=ok");
    })
}
