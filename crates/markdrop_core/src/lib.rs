//! Drag-and-drop reorder engine for hierarchical bookmark collections.
//! This crate owns gesture capture, move validation, index mapping and the
//! serialized mutation pipeline against an external bookmark store.

pub mod config;
pub mod debounce;
pub mod engine;
pub mod events;
pub mod gesture;
pub mod guard;
pub mod logging;
pub mod mapper;
pub mod model;
pub mod queue;
pub mod reconcile;
pub mod recovery;
pub mod store;

pub use config::{BackoffConfig, ConfigError, EngineConfig, RetryConfig};
pub use debounce::DebounceRejection;
pub use engine::{DragDropEngine, EngineError, SubmitError};
pub use events::{EngineEvent, EventBus, StatusEvent, StatusLevel};
pub use gesture::adapter::{HostCapabilities, NativeDragSupport};
pub use gesture::event::{HostEvent, Key, PointerButton};
pub use gesture::targets::{ElementKey, TargetRegistry};
pub use gesture::{CancelReason, GestureCapture, GesturePhase};
pub use guard::{ProtectionGuard, ValidationRejection};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::drag::{DragSource, DropZone, DropZoneKind, InputModality, Point, Rect};
pub use model::mutation::{DropTarget, MutationRequest, Placement};
pub use model::node::{BookmarkNode, Destination, NodeId, NodeKind};
pub use model::tree::BookmarkTree;
pub use queue::{MoveOutcome, PendingMove};
pub use recovery::{FailureClass, MutationError, RetryPolicy};
pub use store::memory::MemoryStore;
pub use store::{ChangeEvent, Store, StoreError, StoreFuture, StoreOp, StoreResult};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
