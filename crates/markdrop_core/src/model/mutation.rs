//! Move requests produced at drop-commit.
//!
//! # Responsibility
//! - Describe one requested move before it is mapped to a store index.
//! - Provide the dedupe key used to suppress redundant submissions.
//!
//! # Invariants
//! - The index mode (`Placement`) is fixed when the request is created and
//!   never reinterpreted downstream.

use crate::model::drag::{DragSource, InputModality};
use crate::model::node::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use tokio::time::Instant;
use uuid::Uuid;

/// Requested position inside the destination folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "index")]
pub enum Placement {
    /// Resting index in the destination's post-move child list.
    Final(i64),
    /// UI insertion point: "before child i" of the current child list.
    Insertion(i64),
    /// Final-index mode with the destination's post-move child count.
    Append,
}

impl Display for Placement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Final(index) => write!(f, "final:{index}"),
            Self::Insertion(index) => write!(f, "insertion:{index}"),
            Self::Append => write!(f, "append"),
        }
    }
}

/// Destination as requested by the UI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DropTarget {
    pub folder_id: NodeId,
    pub folder_title: String,
    pub placement: Placement,
}

/// Dedupe identity: source plus requested destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupeKey {
    pub source_id: NodeId,
    pub folder_id: NodeId,
    pub placement: Placement,
}

impl Display for DedupeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}->{}@{}", self.source_id, self.folder_id, self.placement)
    }
}

/// One move request created at drop-commit.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRequest {
    pub id: Uuid,
    pub source: DragSource,
    pub target: DropTarget,
    pub modality: InputModality,
    pub created_at: Instant,
}

impl MutationRequest {
    pub fn new(source: DragSource, target: DropTarget, modality: InputModality) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            target,
            modality,
            created_at: Instant::now(),
        }
    }

    pub fn source_id(&self) -> &NodeId {
        &self.source.id
    }

    pub fn dedupe_key(&self) -> DedupeKey {
        DedupeKey {
            source_id: self.source.id.clone(),
            folder_id: self.target.folder_id.clone(),
            placement: self.target.placement,
        }
    }
}
