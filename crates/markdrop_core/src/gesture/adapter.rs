//! Input adapters that translate host events into capture calls.
//!
//! # Responsibility
//! - Provide one adapter per input family behind a single trait.
//! - Select the adapter set once, from probed host capabilities.
//!
//! # Invariants
//! - Adapters never hold drag identity; they resolve it through the
//!   `TargetRegistry` and hand it to `GestureCapture`.
//! - Pointer release is ignored for sessions owned by the native adapter.

use crate::debounce::{HighlightChange, HoverCounter};
use crate::gesture::event::{HostEvent, PointerButton};
use crate::gesture::targets::{ElementKey, TargetRegistry};
use crate::gesture::{CancelReason, GestureCapture, GesturePhase};
use crate::model::drag::{InputModality, Point};
use crate::model::mutation::MutationRequest;

/// How dependable the host's native drag-and-drop events are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeDragSupport {
    Reliable,
    /// Delivered, but drops or enters may go missing.
    Unreliable,
    Unsupported,
}

/// Host capabilities probed once at engine start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapabilities {
    pub native_drag: NativeDragSupport,
    pub pointer_events: bool,
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self {
            native_drag: NativeDragSupport::Unreliable,
            pointer_events: true,
        }
    }
}

/// Mutable state an adapter may touch while handling one event.
pub struct GestureContext<'a> {
    pub capture: &'a mut GestureCapture,
    pub targets: &'a TargetRegistry,
    pub hover: &'a mut HoverCounter,
    pub highlights: &'a mut Vec<HighlightChange>,
}

/// One input family.
pub trait InputAdapter: Send {
    fn modality(&self) -> InputModality;
    /// Whether this adapter consumes `event`.
    fn accepts(&self, event: &HostEvent) -> bool;
    /// Handles one event; returns a request when a drop commits.
    fn handle(&mut self, event: &HostEvent, ctx: &mut GestureContext<'_>) -> Option<MutationRequest>;
    /// Forgets per-session state once the capture is idle again.
    fn reset(&mut self) {}
}

/// Chooses the adapter set for the probed host.
pub fn probe_adapters(capabilities: HostCapabilities) -> Vec<Box<dyn InputAdapter>> {
    let mut adapters: Vec<Box<dyn InputAdapter>> = Vec::new();
    if capabilities.native_drag != NativeDragSupport::Unsupported {
        adapters.push(Box::new(NativeAdapter::default()));
    }
    if capabilities.pointer_events && capabilities.native_drag != NativeDragSupport::Reliable {
        adapters.push(Box::new(PointerFallbackAdapter::default()));
    }
    log::info!(
        "event=adapters_probed module=gesture status=ok native={:?} pointer_events={} adapters={}",
        capabilities.native_drag,
        capabilities.pointer_events,
        adapters
            .iter()
            .map(|adapter| format!("{:?}", adapter.modality()))
            .collect::<Vec<_>>()
            .join(",")
    );
    adapters
}

/// Host-native drag-and-drop events.
#[derive(Debug, Default)]
pub struct NativeAdapter;

impl InputAdapter for NativeAdapter {
    fn modality(&self) -> InputModality {
        InputModality::Native
    }

    fn accepts(&self, event: &HostEvent) -> bool {
        event.is_native()
    }

    fn handle(&mut self, event: &HostEvent, ctx: &mut GestureContext<'_>) -> Option<MutationRequest> {
        match event {
            HostEvent::NativeDragStart { element } => {
                let source = ctx.targets.source_for(element)?.clone();
                let source_id = source.id.clone();
                ctx.capture.begin_candidate(source, InputModality::Native);
                // A pointer press on the same source may already own the session.
                if ctx
                    .capture
                    .session()
                    .is_some_and(|session| session.source.id == source_id)
                {
                    ctx.capture.mark_dragging();
                }
                None
            }
            HostEvent::NativeDragEnter { element } => {
                let zone = ctx.targets.zone_for(element)?.clone();
                if let Some(change) = ctx.hover.enter(element) {
                    ctx.highlights.push(change);
                }
                ctx.capture.update_target(Some(zone));
                None
            }
            HostEvent::NativeDragOver { element } => {
                let zone = ctx.targets.zone_for(element)?.clone();
                ctx.capture.update_target(Some(zone));
                None
            }
            HostEvent::NativeDragLeave { element } => {
                let zone = ctx.targets.zone_for(element)?;
                if let Some(change) = ctx.hover.leave(element) {
                    ctx.highlights.push(change);
                    let hovering_zone = ctx
                        .capture
                        .session()
                        .and_then(|session| session.zone.as_ref())
                        .is_some_and(|current| current == zone);
                    if hovering_zone {
                        ctx.capture.update_target(None);
                    }
                }
                None
            }
            HostEvent::NativeDrop { element } => {
                let zone = element
                    .as_ref()
                    .and_then(|element| ctx.targets.zone_for(element))
                    .cloned();
                ctx.highlights.extend(ctx.hover.reset());
                // Hosts stop delivering pointer release once a native drag
                // starts, so the drop commits whichever adapter armed the session.
                ctx.capture.update_target(zone);
                ctx.capture.commit()
            }
            HostEvent::NativeDragEnd => {
                ctx.highlights.extend(ctx.hover.reset());
                if ctx.capture.owner() == Some(InputModality::Native) {
                    ctx.capture.cancel(CancelReason::NativeDragEnd);
                }
                None
            }
            _ => None,
        }
    }
}

/// Pointer press/move/release bridge for hosts with unreliable native drag.
#[derive(Debug, Default)]
pub struct PointerFallbackAdapter {
    hovered: Option<ElementKey>,
}

impl PointerFallbackAdapter {
    fn owns_session(ctx: &GestureContext<'_>) -> bool {
        ctx.capture.owner() == Some(InputModality::SyntheticFallback)
    }

    fn track_hover(&mut self, position: Point, ctx: &mut GestureContext<'_>) {
        let hit = ctx.targets.zone_at(position);
        let hit_key = hit.as_ref().map(|(key, _)| key.clone());
        if hit_key != self.hovered {
            if let Some(previous) = self.hovered.take() {
                if let Some(change) = ctx.hover.leave(&previous) {
                    ctx.highlights.push(change);
                }
            }
            if let Some(key) = hit_key.as_ref() {
                if let Some(change) = ctx.hover.enter(key) {
                    ctx.highlights.push(change);
                }
            }
            self.hovered = hit_key;
        }
        ctx.capture.update_target(hit.map(|(_, zone)| zone));
    }

    fn clear_hover(&mut self, ctx: &mut GestureContext<'_>) {
        if let Some(previous) = self.hovered.take() {
            if let Some(change) = ctx.hover.leave(&previous) {
                ctx.highlights.push(change);
            }
        }
    }
}

impl InputAdapter for PointerFallbackAdapter {
    fn modality(&self) -> InputModality {
        InputModality::SyntheticFallback
    }

    fn accepts(&self, event: &HostEvent) -> bool {
        event.is_pointer()
    }

    fn handle(&mut self, event: &HostEvent, ctx: &mut GestureContext<'_>) -> Option<MutationRequest> {
        match event {
            HostEvent::PointerDown {
                position,
                button: PointerButton::Primary,
            } => {
                let (_, source) = ctx.targets.source_at(*position)?;
                if ctx
                    .capture
                    .begin_candidate(source, InputModality::SyntheticFallback)
                    .started()
                {
                    ctx.capture.set_press_origin(*position);
                }
                None
            }
            HostEvent::PointerMove { position } => {
                if !Self::owns_session(ctx) {
                    return None;
                }
                ctx.capture.pointer_moved(*position);
                if ctx.capture.phase() == GesturePhase::Dragging {
                    self.track_hover(*position, ctx);
                }
                None
            }
            HostEvent::PointerUp { position } => {
                if !Self::owns_session(ctx) {
                    return None;
                }
                if ctx.capture.phase() == GesturePhase::Dragging {
                    self.track_hover(*position, ctx);
                }
                self.clear_hover(ctx);
                ctx.capture.commit()
            }
            _ => None,
        }
    }

    fn reset(&mut self) {
        self.hovered = None;
    }
}

#[cfg(test)]
mod tests {
    use super::{
        probe_adapters, GestureContext, HostCapabilities, InputAdapter, NativeAdapter,
        NativeDragSupport, PointerFallbackAdapter,
    };
    use crate::debounce::{HighlightChange, HoverCounter};
    use crate::gesture::event::{HostEvent, PointerButton};
    use crate::gesture::targets::{ElementKey, TargetRegistry};
    use crate::gesture::{GestureCapture, GesturePhase};
    use crate::model::drag::{DragSource, DropZone, InputModality, Point, Rect};
    use crate::model::mutation::Placement;
    use std::time::Duration;

    struct Harness {
        capture: GestureCapture,
        targets: TargetRegistry,
        hover: HoverCounter,
        highlights: Vec<HighlightChange>,
    }

    impl Harness {
        fn new() -> Self {
            let mut targets = TargetRegistry::new();
            targets.register_source(
                ElementKey::from("memo"),
                DragSource::item("13", "Memo", "https://m.example"),
                Some(Rect::new(0.0, 60.0, 200.0, 20.0)),
                1,
            );
            targets.register_source(
                ElementKey::from("invoice"),
                DragSource::item("12", "Invoice", "https://i.example"),
                Some(Rect::new(0.0, 30.0, 200.0, 20.0)),
                1,
            );
            targets.register_zone(
                ElementKey::from("work-header"),
                DropZone::header("10", "Work"),
                Some(Rect::new(0.0, 0.0, 200.0, 20.0)),
                1,
            );
            targets.register_zone(
                ElementKey::from("archive-body"),
                DropZone::body("20", "Archive"),
                Some(Rect::new(300.0, 0.0, 200.0, 200.0)),
                0,
            );
            Self {
                capture: GestureCapture::new(
                    Duration::from_secs(30),
                    Duration::from_millis(500),
                    4.0,
                ),
                targets,
                hover: HoverCounter::new(),
                highlights: Vec::new(),
            }
        }

        fn feed(
            &mut self,
            adapter: &mut dyn InputAdapter,
            event: HostEvent,
        ) -> Option<crate::model::mutation::MutationRequest> {
            let mut ctx = GestureContext {
                capture: &mut self.capture,
                targets: &self.targets,
                hover: &mut self.hover,
                highlights: &mut self.highlights,
            };
            adapter.handle(&event, &mut ctx)
        }
    }

    #[test]
    fn probing_selects_adapter_set() {
        let modalities = |caps| {
            probe_adapters(caps)
                .iter()
                .map(|adapter| adapter.modality())
                .collect::<Vec<_>>()
        };
        assert_eq!(
            modalities(HostCapabilities {
                native_drag: NativeDragSupport::Reliable,
                pointer_events: true
            }),
            vec![InputModality::Native]
        );
        assert_eq!(
            modalities(HostCapabilities::default()),
            vec![InputModality::Native, InputModality::SyntheticFallback]
        );
        assert_eq!(
            modalities(HostCapabilities {
                native_drag: NativeDragSupport::Unsupported,
                pointer_events: true
            }),
            vec![InputModality::SyntheticFallback]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn pointer_path_commits_on_release_over_zone() {
        let mut harness = Harness::new();
        let mut pointer = PointerFallbackAdapter::default();

        harness.feed(
            &mut pointer,
            HostEvent::PointerDown {
                position: Point::new(10.0, 65.0),
                button: PointerButton::Primary,
            },
        );
        assert_eq!(harness.capture.phase(), GesturePhase::Armed);
        harness.feed(
            &mut pointer,
            HostEvent::PointerMove {
                position: Point::new(10.0, 10.0),
            },
        );
        assert_eq!(harness.capture.phase(), GesturePhase::Dragging);
        assert_eq!(harness.highlights.len(), 1);

        let request = harness
            .feed(
                &mut pointer,
                HostEvent::PointerUp {
                    position: Point::new(10.0, 10.0),
                },
            )
            .expect("request");
        assert_eq!(request.target.placement, Placement::Insertion(0));
        assert_eq!(request.modality, InputModality::SyntheticFallback);
        assert!(!harness.highlights.last().expect("off").active);
    }

    #[tokio::test(start_paused = true)]
    async fn pointer_press_outside_sources_starts_nothing() {
        let mut harness = Harness::new();
        let mut pointer = PointerFallbackAdapter::default();
        harness.feed(
            &mut pointer,
            HostEvent::PointerDown {
                position: Point::new(150.0, 150.0),
                button: PointerButton::Primary,
            },
        );
        assert_eq!(harness.capture.phase(), GesturePhase::Idle);

        harness.feed(
            &mut pointer,
            HostEvent::PointerDown {
                position: Point::new(10.0, 65.0),
                button: PointerButton::Secondary,
            },
        );
        assert_eq!(harness.capture.phase(), GesturePhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn release_outside_any_zone_cancels() {
        let mut harness = Harness::new();
        let mut pointer = PointerFallbackAdapter::default();
        harness.feed(
            &mut pointer,
            HostEvent::PointerDown {
                position: Point::new(10.0, 65.0),
                button: PointerButton::Primary,
            },
        );
        harness.feed(
            &mut pointer,
            HostEvent::PointerMove {
                position: Point::new(250.0, 150.0),
            },
        );
        let request = harness.feed(
            &mut pointer,
            HostEvent::PointerUp {
                position: Point::new(250.0, 150.0),
            },
        );
        assert!(request.is_none());
        assert_eq!(harness.capture.phase(), GesturePhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn native_path_counts_nested_enters() {
        let mut harness = Harness::new();
        let mut native = NativeAdapter;
        let body = ElementKey::from("archive-body");

        harness.feed(
            &mut native,
            HostEvent::NativeDragStart {
                element: ElementKey::from("memo"),
            },
        );
        assert_eq!(harness.capture.phase(), GesturePhase::Dragging);

        harness.feed(&mut native, HostEvent::NativeDragEnter { element: body.clone() });
        harness.feed(&mut native, HostEvent::NativeDragEnter { element: body.clone() });
        harness.feed(&mut native, HostEvent::NativeDragLeave { element: body.clone() });
        assert_eq!(harness.highlights.len(), 1);
        assert!(harness.capture.session().expect("session").zone.is_some());

        let request = harness
            .feed(
                &mut native,
                HostEvent::NativeDrop {
                    element: Some(body.clone()),
                },
            )
            .expect("request");
        assert_eq!(request.target.placement, Placement::Append);
        assert_eq!(harness.highlights.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn native_drag_end_without_drop_cancels() {
        let mut harness = Harness::new();
        let mut native = NativeAdapter;
        harness.feed(
            &mut native,
            HostEvent::NativeDragStart {
                element: ElementKey::from("memo"),
            },
        );
        harness.feed(&mut native, HostEvent::NativeDragEnd);
        assert_eq!(harness.capture.phase(), GesturePhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn pointer_release_is_ignored_for_native_sessions() {
        let mut harness = Harness::new();
        let mut native = NativeAdapter;
        let mut pointer = PointerFallbackAdapter::default();
        harness.feed(
            &mut native,
            HostEvent::NativeDragStart {
                element: ElementKey::from("memo"),
            },
        );
        let request = harness.feed(
            &mut pointer,
            HostEvent::PointerUp {
                position: Point::new(10.0, 10.0),
            },
        );
        assert!(request.is_none());
        assert_eq!(harness.capture.owner(), Some(InputModality::Native));
    }

    #[tokio::test(start_paused = true)]
    async fn native_drop_commits_pointer_armed_session() {
        let mut harness = Harness::new();
        let mut native = NativeAdapter;
        let mut pointer = PointerFallbackAdapter::default();
        harness.feed(
            &mut pointer,
            HostEvent::PointerDown {
                position: Point::new(10.0, 65.0),
                button: PointerButton::Primary,
            },
        );
        harness.feed(
            &mut native,
            HostEvent::NativeDragStart {
                element: ElementKey::from("memo"),
            },
        );
        assert_eq!(harness.capture.phase(), GesturePhase::Dragging);
        assert_eq!(harness.capture.owner(), Some(InputModality::SyntheticFallback));

        let request = harness.feed(
            &mut native,
            HostEvent::NativeDrop {
                element: Some(ElementKey::from("archive-body")),
            },
        );
        assert!(request.is_some());
        let release = harness.feed(
            &mut pointer,
            HostEvent::PointerUp {
                position: Point::new(350.0, 50.0),
            },
        );
        assert!(release.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn pointer_press_on_other_item_inside_claim_window_is_ignored() {
        let mut harness = Harness::new();
        let mut native = NativeAdapter;
        let mut pointer = PointerFallbackAdapter::default();
        harness.feed(
            &mut native,
            HostEvent::NativeDragStart {
                element: ElementKey::from("memo"),
            },
        );
        harness.feed(
            &mut pointer,
            HostEvent::PointerDown {
                position: Point::new(10.0, 35.0),
                button: PointerButton::Primary,
            },
        );

        assert_eq!(harness.capture.owner(), Some(InputModality::Native));
        assert_eq!(
            harness.capture.session().expect("session").source.id.as_str(),
            "13"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn pointer_press_after_lost_native_drag_end_takes_over() {
        let mut harness = Harness::new();
        let mut native = NativeAdapter;
        let mut pointer = PointerFallbackAdapter::default();
        harness.feed(
            &mut native,
            HostEvent::NativeDragStart {
                element: ElementKey::from("memo"),
            },
        );
        tokio::time::advance(Duration::from_secs(5)).await;

        harness.feed(
            &mut pointer,
            HostEvent::PointerDown {
                position: Point::new(10.0, 35.0),
                button: PointerButton::Primary,
            },
        );
        assert_eq!(harness.capture.owner(), Some(InputModality::SyntheticFallback));
        assert_eq!(harness.capture.phase(), GesturePhase::Armed);

        harness.feed(
            &mut pointer,
            HostEvent::PointerMove {
                position: Point::new(350.0, 50.0),
            },
        );
        let request = harness
            .feed(
                &mut pointer,
                HostEvent::PointerUp {
                    position: Point::new(350.0, 50.0),
                },
            )
            .expect("request");
        assert_eq!(request.source.id.as_str(), "12");
        assert_eq!(request.target.folder_id.as_str(), "20");
    }
}
