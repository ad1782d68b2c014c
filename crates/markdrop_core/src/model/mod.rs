//! Bookmark and drag domain model.
//!
//! # Responsibility
//! - Define canonical data structures shared by every engine stage.
//! - Keep store identity opaque and drag identity typed end-to-end.
//!
//! # Invariants
//! - Nodes are never constructed by the engine for the store; they are
//!   snapshots of store state (or test fixtures).

pub mod drag;
pub mod mutation;
pub mod node;
pub mod tree;
