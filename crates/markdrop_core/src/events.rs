//! Host-facing engine events.
//!
//! # Responsibility
//! - Define the serializable payloads the engine reports to its host.
//! - Fan events out to every subscriber without blocking the engine.
//!
//! # Invariants
//! - Publishing never fails; with no subscribers the event is dropped.

use crate::gesture::targets::ElementKey;
use crate::model::node::NodeId;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Severity of one status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLevel {
    Success,
    Failure,
    /// Store state disagreed with what the engine asked for.
    Critical,
}

/// Generic user-visible status signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    pub level: StatusLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
}

impl StatusEvent {
    pub fn new(level: StatusLevel, message: impl Into<String>, request_id: Option<Uuid>) -> Self {
        Self {
            level,
            message: message.into(),
            request_id,
        }
    }
}

/// Event published by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum EngineEvent {
    /// Store confirmed one move.
    ItemMoved {
        item_id: NodeId,
        from_parent_id: NodeId,
        to_parent_id: NodeId,
        index: usize,
    },
    Status(StatusEvent),
    /// Drop-zone highlight switched on or off.
    Highlight { element: ElementKey, active: bool },
}

/// Broadcast fan-out for engine events.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: EngineEvent) {
        // Err only means nobody is listening.
        let _ = self.sender.send(event);
    }

    pub fn status(&self, level: StatusLevel, message: impl Into<String>, request_id: Option<Uuid>) {
        self.publish(EngineEvent::Status(StatusEvent::new(level, message, request_id)));
    }
}

#[cfg(test)]
mod tests {
    use super::{EngineEvent, EventBus, StatusLevel};
    use crate::gesture::targets::ElementKey;

    #[test]
    fn events_serialize_with_type_tag() {
        let moved = EngineEvent::ItemMoved {
            item_id: "13".into(),
            from_parent_id: "10".into(),
            to_parent_id: "20".into(),
            index: 2,
        };
        let value = serde_json::to_value(&moved).expect("serialize item moved");
        assert_eq!(value["type"], "item_moved");
        assert_eq!(value["item_id"], "13");
        assert_eq!(value["index"], 2);

        let highlight = EngineEvent::Highlight {
            element: ElementKey::from("work-body"),
            active: true,
        };
        let value = serde_json::to_value(&highlight).expect("serialize highlight");
        assert_eq!(value["element"], "work-body");
    }

    #[tokio::test]
    async fn bus_fans_out_to_subscribers() {
        let bus = EventBus::new();
        bus.status(StatusLevel::Success, "nobody listening", None);

        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        bus.status(StatusLevel::Failure, "move failed", None);

        for receiver in [&mut first, &mut second] {
            match receiver.recv().await.expect("event") {
                EngineEvent::Status(status) => {
                    assert_eq!(status.level, StatusLevel::Failure);
                    let value = serde_json::to_value(&status).expect("serialize status");
                    assert!(value.get("request_id").is_none());
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }
}
