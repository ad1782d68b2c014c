//! Drag gesture model: sources, drop zones, and the active session.
//!
//! # Responsibility
//! - Carry drag identity as typed values from press to commit.
//! - Describe where a drop may land without knowing store indices.
//!
//! # Invariants
//! - A `DragSession` is only ever owned by `GestureCapture`.
//! - A `DropZone` never resolves to a source kind it does not accept.

use crate::model::mutation::Placement;
use crate::model::node::{NodeId, NodeKind};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

/// Screen-space point reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(self, other: Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Axis-aligned bounds of one registered UI element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Half-open containment: left/top edges inclusive, right/bottom exclusive.
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.y >= self.y
            && point.x < self.x + self.width
            && point.y < self.y + self.height
    }
}

/// Which input family produced a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputModality {
    /// Host-native drag-and-drop events.
    Native,
    /// Pointer press/move/release bridge.
    SyntheticFallback,
}

/// What is being dragged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DragSource {
    pub id: NodeId,
    pub kind: NodeKind,
    pub title: String,
    /// Present for items so the store double and remapping can match by URL.
    pub url: Option<String>,
}

impl DragSource {
    pub fn item(id: impl Into<NodeId>, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Item,
            title: title.into(),
            url: Some(url.into()),
        }
    }

    pub fn folder(id: impl Into<NodeId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: NodeKind::Folder,
            title: title.into(),
            url: None,
        }
    }
}

/// UI affordance a drop zone represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropZoneKind {
    /// Folder content area; drops append unless an explicit index is set.
    FolderBody,
    /// Folder title row; drops land first.
    FolderHeader,
    /// Gap between two children; index means "before child i".
    InsertionPoint,
}

/// Source kinds a zone accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AcceptedKinds {
    pub items: bool,
    pub folders: bool,
}

impl AcceptedKinds {
    pub const ALL: Self = Self {
        items: true,
        folders: true,
    };
    pub const ITEMS: Self = Self {
        items: true,
        folders: false,
    };

    pub fn accepts(self, kind: NodeKind) -> bool {
        match kind {
            NodeKind::Item => self.items,
            NodeKind::Folder => self.folders,
        }
    }
}

impl Default for AcceptedKinds {
    fn default() -> Self {
        Self::ALL
    }
}

/// UI-designated target mapped to a destination folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DropZone {
    pub kind: DropZoneKind,
    pub folder_id: NodeId,
    pub folder_title: String,
    pub index: Option<usize>,
    #[serde(default)]
    pub accepts: AcceptedKinds,
}

impl DropZone {
    pub fn body(folder_id: impl Into<NodeId>, folder_title: impl Into<String>) -> Self {
        Self {
            kind: DropZoneKind::FolderBody,
            folder_id: folder_id.into(),
            folder_title: folder_title.into(),
            index: None,
            accepts: AcceptedKinds::ALL,
        }
    }

    pub fn header(folder_id: impl Into<NodeId>, folder_title: impl Into<String>) -> Self {
        Self {
            kind: DropZoneKind::FolderHeader,
            ..Self::body(folder_id, folder_title)
        }
    }

    pub fn insertion(
        folder_id: impl Into<NodeId>,
        folder_title: impl Into<String>,
        before: usize,
    ) -> Self {
        Self {
            kind: DropZoneKind::InsertionPoint,
            index: Some(before),
            ..Self::body(folder_id, folder_title)
        }
    }

    pub fn accepting(mut self, accepts: AcceptedKinds) -> Self {
        self.accepts = accepts;
        self
    }

    /// Index semantics this zone implies.
    pub fn placement(&self) -> Placement {
        match self.kind {
            DropZoneKind::FolderHeader => Placement::Insertion(0),
            DropZoneKind::FolderBody => match self.index {
                Some(index) => Placement::Final(index as i64),
                None => Placement::Append,
            },
            DropZoneKind::InsertionPoint => Placement::Insertion(self.index.unwrap_or(0) as i64),
        }
    }
}

/// Session lifecycle state; `idle` is represented by the absence of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DragState {
    Armed,
    Dragging,
    Dropping,
}

/// One active gesture-initiated move, from press to commit or cancel.
#[derive(Debug, Clone, PartialEq)]
pub struct DragSession {
    pub id: Uuid,
    pub source: DragSource,
    pub modality: InputModality,
    pub started_at: Instant,
    /// Press position for threshold checks on the pointer path.
    pub press_origin: Option<Point>,
    pub zone: Option<DropZone>,
    pub state: DragState,
}

impl DragSession {
    pub fn new(source: DragSource, modality: InputModality, started_at: Instant) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            modality,
            started_at,
            press_origin: None,
            zone: None,
            state: DragState::Armed,
        }
    }
}
