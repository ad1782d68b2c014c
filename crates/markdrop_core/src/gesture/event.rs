//! Raw host input events.

use crate::gesture::targets::ElementKey;
use crate::model::drag::Point;
use serde::{Deserialize, Serialize};

/// Pointer button reported with a press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerButton {
    Primary,
    Secondary,
    Auxiliary,
}

/// Keyboard keys the engine reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Escape,
    Other(String),
}

/// One event from the host's pointer or native drag-and-drop stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum HostEvent {
    PointerDown { position: Point, button: PointerButton },
    PointerMove { position: Point },
    PointerUp { position: Point },
    KeyDown { key: Key },
    NativeDragStart { element: ElementKey },
    NativeDragEnter { element: ElementKey },
    NativeDragOver { element: ElementKey },
    NativeDragLeave { element: ElementKey },
    NativeDrop { element: Option<ElementKey> },
    NativeDragEnd,
}

impl HostEvent {
    pub fn is_pointer(&self) -> bool {
        matches!(
            self,
            Self::PointerDown { .. } | Self::PointerMove { .. } | Self::PointerUp { .. }
        )
    }

    pub fn is_native(&self) -> bool {
        matches!(
            self,
            Self::NativeDragStart { .. }
                | Self::NativeDragEnter { .. }
                | Self::NativeDragOver { .. }
                | Self::NativeDragLeave { .. }
                | Self::NativeDrop { .. }
                | Self::NativeDragEnd
        )
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PointerDown { .. } => "pointer_down",
            Self::PointerMove { .. } => "pointer_move",
            Self::PointerUp { .. } => "pointer_up",
            Self::KeyDown { .. } => "key_down",
            Self::NativeDragStart { .. } => "native_drag_start",
            Self::NativeDragEnter { .. } => "native_drag_enter",
            Self::NativeDragOver { .. } => "native_drag_over",
            Self::NativeDragLeave { .. } => "native_drag_leave",
            Self::NativeDrop { .. } => "native_drop",
            Self::NativeDragEnd => "native_drag_end",
        }
    }
}
