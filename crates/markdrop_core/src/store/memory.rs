//! In-memory `Store` double for tests and demos.
//!
//! # Responsibility
//! - Answer store calls from one `BookmarkTree` with store-like move rules.
//! - Let callers inject latency, failures, lost writes and id churn.
//! - Record every call so tests can assert ordering and call counts.
//!
//! # Invariants
//! - Root nodes and explicitly protected ids reject `move_node`.
//! - Sibling lists are contiguous from 0 after every move.

use crate::model::node::{BookmarkNode, Destination, NodeId};
use crate::model::tree::BookmarkTree;
use crate::store::{ChangeEvent, Store, StoreError, StoreFuture, StoreOp, StoreResult};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Whether a logged call entry marks the start or the end of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Started,
    Finished,
}

/// One entry in the call log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub op: StoreOp,
    pub target: Option<NodeId>,
    pub phase: CallPhase,
}

#[derive(Default)]
struct MemoryState {
    tree: BookmarkTree,
    protected: HashSet<NodeId>,
    latency: HashMap<StoreOp, Duration>,
    move_delays: VecDeque<Duration>,
    faults: VecDeque<(StoreOp, StoreError)>,
    lost_moves: usize,
    calls: Vec<CallRecord>,
}

/// In-memory store with fault injection.
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl MemoryStore {
    /// Creates a store over `roots`; root nodes are protected implicitly.
    pub fn new(roots: Vec<BookmarkNode>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(MemoryState {
                tree: BookmarkTree::new(roots),
                ..MemoryState::default()
            }),
            changes,
        }
    }

    /// Marks additional ids the store refuses to move.
    pub fn protect(&self, id: impl Into<NodeId>) {
        self.lock().protected.insert(id.into());
    }

    /// Applies a fixed latency to every call of `op`.
    pub fn set_latency(&self, op: StoreOp, latency: Duration) {
        self.lock().latency.insert(op, latency);
    }

    /// Queues a one-off latency for the next `move_node` call (after `set_latency`).
    pub fn push_move_delay(&self, delay: Duration) {
        self.lock().move_delays.push_back(delay);
    }

    /// Makes the next call of `op` fail with `error`.
    pub fn fail_next(&self, op: StoreOp, error: StoreError) {
        self.lock().faults.push_back((op, error));
    }

    /// Makes the next `count` moves report success without changing anything.
    pub fn lose_next_moves(&self, count: usize) {
        self.lock().lost_moves += count;
    }

    /// Renames one node id, as a store resync would.
    pub fn reassign_id(&self, old: &NodeId, new: impl Into<NodeId>) -> bool {
        let new = new.into();
        let mut state = self.lock();
        let Some(node) = state.tree.find_mut(old) else {
            return false;
        };
        node.id = new.clone();
        if let Some(children) = node.children.as_mut() {
            for child in children.iter_mut() {
                child.parent_id = Some(new.clone());
            }
        }
        drop(state);
        let _ = self.changes.send(ChangeEvent::Changed { id: new });
        true
    }

    /// Snapshot of the current tree.
    pub fn snapshot(&self) -> BookmarkTree {
        self.lock().tree.clone()
    }

    /// Ordered child ids of one folder, for assertions.
    pub fn child_ids(&self, folder_id: &NodeId) -> Vec<NodeId> {
        self.lock()
            .tree
            .children_of(folder_id)
            .map(|children| children.iter().map(|child| child.id.clone()).collect())
            .unwrap_or_default()
    }

    /// Full call log.
    pub fn calls(&self) -> Vec<CallRecord> {
        self.lock().calls.clone()
    }

    /// Number of started calls of `op`.
    pub fn call_count(&self, op: StoreOp) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|record| record.op == op && record.phase == CallPhase::Started)
            .count()
    }

    /// Number of started calls of any kind.
    pub fn total_calls(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|record| record.phase == CallPhase::Started)
            .count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A poisoned lock only means a test panicked mid-call; the data is still usable.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin(&self, op: StoreOp, target: Option<&NodeId>) -> (Duration, Option<StoreError>) {
        let mut state = self.lock();
        state.calls.push(CallRecord {
            op,
            target: target.cloned(),
            phase: CallPhase::Started,
        });
        let mut delay = state.latency.get(&op).copied().unwrap_or_default();
        if op == StoreOp::Move {
            if let Some(extra) = state.move_delays.pop_front() {
                delay += extra;
            }
        }
        let fault = match state.faults.iter().position(|(fault_op, _)| *fault_op == op) {
            Some(position) => state.faults.remove(position).map(|(_, error)| error),
            None => None,
        };
        (delay, fault)
    }

    fn finish(&self, op: StoreOp, target: Option<&NodeId>) {
        self.lock().calls.push(CallRecord {
            op,
            target: target.cloned(),
            phase: CallPhase::Finished,
        });
    }

    async fn run<T>(
        &self,
        op: StoreOp,
        target: Option<NodeId>,
        body: impl FnOnce(&mut MemoryState) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let (delay, fault) = self.begin(op, target.as_ref());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let result = match fault {
            Some(error) => Err(error),
            None => body(&mut self.lock()),
        };
        self.finish(op, target.as_ref());
        result
    }

    fn apply_move(
        state: &mut MemoryState,
        id: &NodeId,
        destination: &Destination,
    ) -> StoreResult<(BookmarkNode, Option<ChangeEvent>)> {
        let node = state
            .tree
            .find(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let Some(old_parent_id) = node.parent_id.clone() else {
            return Err(StoreError::ProtectedNode(id.clone()));
        };
        if state.protected.contains(id) {
            return Err(StoreError::ProtectedNode(id.clone()));
        }
        let parent = state
            .tree
            .find(&destination.parent_id)
            .ok_or_else(|| StoreError::NotFound(destination.parent_id.clone()))?;
        if !parent.is_folder() {
            return Err(StoreError::InvalidIndex {
                parent_id: destination.parent_id.clone(),
                index: destination.index,
            });
        }
        let remaining = parent
            .children
            .as_ref()
            .map(|children| children.iter().filter(|child| &child.id != id).count())
            .unwrap_or(0);
        if destination.index > remaining {
            return Err(StoreError::InvalidIndex {
                parent_id: destination.parent_id.clone(),
                index: destination.index,
            });
        }

        if state.lost_moves > 0 {
            state.lost_moves -= 1;
            return Ok((node.shallow(), None));
        }

        let index = state.tree.move_node(id, destination).ok_or_else(|| {
            StoreError::Unavailable(format!(
                "cannot move {id} into {}: destination is inside the moved subtree",
                destination.parent_id
            ))
        })?;
        let moved = state
            .tree
            .find(id)
            .map(BookmarkNode::shallow)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        Ok((
            moved,
            Some(ChangeEvent::Moved {
                id: id.clone(),
                old_parent_id,
                old_index: node.index,
                parent_id: destination.parent_id.clone(),
                index,
            }),
        ))
    }
}

impl Store for MemoryStore {
    fn get_tree(&self) -> StoreFuture<'_, Vec<BookmarkNode>> {
        Box::pin(self.run(StoreOp::GetTree, None, |state| {
            Ok(state.tree.roots().to_vec())
        }))
    }

    fn get_children(&self, folder_id: NodeId) -> StoreFuture<'_, Vec<BookmarkNode>> {
        let target = folder_id.clone();
        Box::pin(self.run(StoreOp::GetChildren, Some(target), move |state| {
            let folder = state
                .tree
                .find(&folder_id)
                .ok_or_else(|| StoreError::NotFound(folder_id.clone()))?;
            Ok(folder
                .children
                .as_ref()
                .map(|children| children.iter().map(BookmarkNode::shallow).collect())
                .unwrap_or_default())
        }))
    }

    fn get(&self, id: NodeId) -> StoreFuture<'_, BookmarkNode> {
        let target = id.clone();
        Box::pin(self.run(StoreOp::Get, Some(target), move |state| {
            state
                .tree
                .find(&id)
                .map(BookmarkNode::shallow)
                .ok_or(StoreError::NotFound(id))
        }))
    }

    fn move_node(&self, id: NodeId, destination: Destination) -> StoreFuture<'_, BookmarkNode> {
        let target = id.clone();
        Box::pin(async move {
            let (moved, change) = self
                .run(StoreOp::Move, Some(target), move |state| {
                    Self::apply_move(state, &id, &destination)
                })
                .await?;
            if let Some(change) = change {
                let _ = self.changes.send(change);
            }
            Ok(moved)
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use crate::model::node::{BookmarkNode, Destination, NodeId};
    use crate::store::{ChangeEvent, Store, StoreError, StoreOp};

    fn store() -> MemoryStore {
        MemoryStore::new(vec![BookmarkNode::folder("0", "").with_children(vec![
            BookmarkNode::folder("1", "Bookmarks bar").with_children(vec![
                BookmarkNode::item("11", "Report", "https://r.example"),
                BookmarkNode::item("12", "Invoice", "https://i.example"),
            ]),
            BookmarkNode::folder("2", "Other bookmarks"),
        ])])
    }

    #[tokio::test]
    async fn move_reports_resting_index_and_notifies() {
        let store = store();
        let mut changes = store.subscribe();
        let moved = store
            .move_node(NodeId::from("11"), Destination::new("1", 1))
            .await
            .expect("move");
        assert_eq!(moved.index, 1);
        assert_eq!(
            store.child_ids(&NodeId::from("1")),
            vec![NodeId::from("12"), NodeId::from("11")]
        );
        assert!(matches!(
            changes.recv().await.expect("change event"),
            ChangeEvent::Moved { index: 1, .. }
        ));
    }

    #[tokio::test]
    async fn move_rejects_roots_and_out_of_range_indices() {
        let store = store();
        let err = store
            .move_node(NodeId::from("0"), Destination::new("2", 0))
            .await
            .expect_err("root is protected");
        assert_eq!(err, StoreError::ProtectedNode(NodeId::from("0")));

        let err = store
            .move_node(NodeId::from("11"), Destination::new("2", 3))
            .await
            .expect_err("index beyond end");
        assert!(matches!(err, StoreError::InvalidIndex { index: 3, .. }));
    }

    #[tokio::test]
    async fn injected_fault_is_consumed_once() {
        let store = store();
        store.fail_next(StoreOp::Get, StoreError::Unavailable("offline".to_string()));
        assert!(store.get(NodeId::from("11")).await.is_err());
        assert!(store.get(NodeId::from("11")).await.is_ok());
        assert_eq!(store.call_count(StoreOp::Get), 2);
    }

    #[tokio::test]
    async fn lost_move_leaves_tree_untouched() {
        let store = store();
        store.lose_next_moves(1);
        store
            .move_node(NodeId::from("11"), Destination::new("2", 0))
            .await
            .expect("lost move still reports success");
        assert!(store.child_ids(&NodeId::from("2")).is_empty());
    }

    #[tokio::test]
    async fn reassigned_id_replaces_lookup_key() {
        let store = store();
        assert!(store.reassign_id(&NodeId::from("12"), "99"));
        assert!(store.get(NodeId::from("12")).await.is_err());
        let node = store.get(NodeId::from("99")).await.expect("new id");
        assert_eq!(node.title, "Invoice");
    }
}
