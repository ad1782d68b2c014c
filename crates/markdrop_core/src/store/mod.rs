//! External bookmark store contract.
//!
//! # Responsibility
//! - Define the asynchronous collaborator the engine mutates through.
//! - Keep store transport/storage details outside the engine boundary.
//!
//! # Invariants
//! - The store owns the canonical tree; the engine only reads snapshots.
//! - `move_node` takes the node's resting index after the move.
//! - Change notifications are advisory; the engine never depends on them for
//!   correctness, only for mirror freshness.

pub mod memory;

use crate::model::node::{BookmarkNode, Destination, NodeId};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::broadcast;

/// Result type used by store calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Boxed future returned by store calls.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// Store call names, used for logging, timeouts and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOp {
    GetTree,
    GetChildren,
    Get,
    Move,
}

impl StoreOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetTree => "get_tree",
            Self::GetChildren => "get_children",
            Self::Get => "get",
            Self::Move => "move",
        }
    }
}

impl Display for StoreOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors reported by store calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Node id is unknown to the store.
    NotFound(NodeId),
    /// Store refuses to mutate this node.
    ProtectedNode(NodeId),
    /// Destination index is outside the accepted range.
    InvalidIndex { parent_id: NodeId, index: usize },
    /// Call did not complete within the configured bound.
    Timeout { op: StoreOp, after: Duration },
    /// Transport or backend failure.
    Unavailable(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "bookmark node not found: {id}"),
            Self::ProtectedNode(id) => write!(f, "bookmark node is protected: {id}"),
            Self::InvalidIndex { parent_id, index } => {
                write!(f, "invalid index {index} for parent {parent_id}")
            }
            Self::Timeout { op, after } => {
                write!(f, "store call `{op}` timed out after {}ms", after.as_millis())
            }
            Self::Unavailable(message) => write!(f, "store unavailable: {message}"),
        }
    }
}

impl Error for StoreError {}

/// Passive change notification emitted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ChangeEvent {
    Created {
        id: NodeId,
        parent_id: NodeId,
    },
    Changed {
        id: NodeId,
    },
    Moved {
        id: NodeId,
        old_parent_id: NodeId,
        old_index: usize,
        parent_id: NodeId,
        index: usize,
    },
    Removed {
        id: NodeId,
        parent_id: NodeId,
    },
    ChildrenReordered {
        id: NodeId,
    },
}

/// Asynchronous, eventually-consistent bookmark store.
pub trait Store: Send + Sync + 'static {
    /// Loads the whole hierarchy.
    fn get_tree(&self) -> StoreFuture<'_, Vec<BookmarkNode>>;
    /// Loads ordered direct children of one folder (without subtrees).
    fn get_children(&self, folder_id: NodeId) -> StoreFuture<'_, Vec<BookmarkNode>>;
    /// Loads one node (without subtree).
    fn get(&self, id: NodeId) -> StoreFuture<'_, BookmarkNode>;
    /// Moves one node; returns the updated node.
    fn move_node(&self, id: NodeId, destination: Destination) -> StoreFuture<'_, BookmarkNode>;
    /// Subscribes to change notifications.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
}

/// Runs one store call under `limit`, mapping expiry to `StoreError::Timeout`.
pub async fn timed<T>(
    op: StoreOp,
    limit: Duration,
    call: StoreFuture<'_, T>,
) -> StoreResult<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            log::warn!(
                "event=store_timeout module=store status=error op={} after_ms={}",
                op,
                limit.as_millis()
            );
            Err(StoreError::Timeout { op, after: limit })
        }
    }
}
