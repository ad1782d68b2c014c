//! Gesture capture: one canonical drag session fed by pluggable input adapters.
//!
//! # Responsibility
//! - Own the single active `DragSession` and drive its lifecycle
//!   (`idle -> armed -> dragging -> dropping -> idle`).
//! - Turn a committed session into a `MutationRequest`.
//!
//! # Invariants
//! - At most one session exists. Within the claim window the first
//!   `begin_candidate` wins; later claims for another source supersede it.
//! - Cancellation has no side effects beyond dropping the session.
//! - A committed session never outlives `commit()`.

pub mod adapter;
pub mod event;
pub mod targets;

use crate::model::drag::{DragSession, DragSource, DragState, DropZone, InputModality, Point};
use crate::model::mutation::{DropTarget, MutationRequest};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Externally visible capture phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    Idle,
    Armed,
    Dragging,
    Dropping,
}

/// Why a session ended without a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    EscapeKey,
    OutsideZone,
    Timeout,
    /// Press on a different source replaced the session.
    Superseded,
    /// Release without crossing the drag threshold.
    NoMovement,
    /// Native drag ended without a drop.
    NativeDragEnd,
    /// Host asked for it.
    Requested,
}

impl CancelReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EscapeKey => "escape_key",
            Self::OutsideZone => "outside_zone",
            Self::Timeout => "timeout",
            Self::Superseded => "superseded",
            Self::NoMovement => "no_movement",
            Self::NativeDragEnd => "native_drag_end",
            Self::Requested => "requested",
        }
    }
}

/// Result of one `begin_candidate` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginOutcome {
    Started(Uuid),
    /// A prior session for a different source was cancelled first.
    Replaced { cancelled: Uuid, started: Uuid },
    /// Another claim already owns the session.
    Ignored,
}

impl BeginOutcome {
    pub fn started(self) -> bool {
        !matches!(self, Self::Ignored)
    }
}

/// Session owner and lifecycle driver.
#[derive(Debug)]
pub struct GestureCapture {
    session: Option<DragSession>,
    session_timeout: Duration,
    claim_window: Duration,
    drag_threshold: f64,
}

impl GestureCapture {
    pub fn new(session_timeout: Duration, claim_window: Duration, drag_threshold: f64) -> Self {
        Self {
            session: None,
            session_timeout,
            claim_window,
            drag_threshold,
        }
    }

    pub fn phase(&self) -> GesturePhase {
        match self.session.as_ref().map(|session| session.state) {
            None => GesturePhase::Idle,
            Some(DragState::Armed) => GesturePhase::Armed,
            Some(DragState::Dragging) => GesturePhase::Dragging,
            Some(DragState::Dropping) => GesturePhase::Dropping,
        }
    }

    pub fn session(&self) -> Option<&DragSession> {
        self.session.as_ref()
    }

    /// Modality that owns the active session.
    pub fn owner(&self) -> Option<InputModality> {
        self.session.as_ref().map(|session| session.modality)
    }

    /// Claims the session for `source`.
    ///
    /// A claim for the active source is ignored, as is a claim from the other
    /// modality inside the claim window (both signals of one gesture). Any
    /// other claim cancels the prior session and starts a new one.
    pub fn begin_candidate(&mut self, source: DragSource, modality: InputModality) -> BeginOutcome {
        self.expire_stale();

        let mut cancelled = None;
        if let Some(active) = self.session.as_ref() {
            let same_gesture = active.modality != modality
                && active.started_at.elapsed() < self.claim_window;
            if same_gesture || active.source.id == source.id {
                log::debug!(
                    "event=session_claim_ignored module=gesture status=ok owner={:?} claimant={:?} source={}",
                    active.modality,
                    modality,
                    source.id
                );
                return BeginOutcome::Ignored;
            }
            cancelled = self
                .cancel(CancelReason::Superseded)
                .map(|session| session.id);
        }

        let session = DragSession::new(source, modality, Instant::now());
        let started = session.id;
        log::info!(
            "event=session_begin module=gesture status=ok session={} source={} modality={:?}",
            started,
            session.source.id,
            modality
        );
        self.session = Some(session);
        match cancelled {
            Some(cancelled) => BeginOutcome::Replaced { cancelled, started },
            None => BeginOutcome::Started(started),
        }
    }

    /// Records where the press happened, for the movement threshold.
    pub fn set_press_origin(&mut self, origin: Point) {
        if let Some(session) = self.session.as_mut() {
            session.press_origin = Some(origin);
        }
    }

    /// Moves an armed session to dragging.
    pub fn mark_dragging(&mut self) {
        if let Some(session) = self.session.as_mut() {
            if session.state == DragState::Armed {
                session.state = DragState::Dragging;
                log::debug!(
                    "event=session_dragging module=gesture status=ok session={}",
                    session.id
                );
            }
        }
    }

    /// Feeds pointer movement; returns `true` when it crossed the threshold.
    pub fn pointer_moved(&mut self, position: Point) -> bool {
        let threshold = self.drag_threshold;
        let crossed = match self.session.as_ref() {
            Some(session) if session.state == DragState::Armed => session
                .press_origin
                .map(|origin| origin.distance_to(position) >= threshold)
                .unwrap_or(true),
            _ => false,
        };
        if crossed {
            self.mark_dragging();
        }
        crossed
    }

    /// Sets the hovered zone; zones that reject the source kind count as none.
    ///
    /// Returns `true` when the current zone changed.
    pub fn update_target(&mut self, zone: Option<DropZone>) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.state != DragState::Dragging {
            return false;
        }
        let zone = zone.filter(|zone| zone.accepts.accepts(session.source.kind));
        if session.zone == zone {
            return false;
        }
        session.zone = zone;
        true
    }

    /// Ends the session and produces the move request, if it landed on a zone.
    pub fn commit(&mut self) -> Option<MutationRequest> {
        self.expire_stale();
        let mut session = self.session.take()?;
        if session.state == DragState::Armed {
            log_cancel(&session, CancelReason::NoMovement);
            return None;
        }
        session.state = DragState::Dropping;

        let Some(zone) = session.zone.take() else {
            log_cancel(&session, CancelReason::OutsideZone);
            return None;
        };
        let request = MutationRequest::new(
            session.source,
            DropTarget {
                placement: zone.placement(),
                folder_id: zone.folder_id,
                folder_title: zone.folder_title,
            },
            session.modality,
        );
        log::info!(
            "event=session_commit module=gesture status=ok session={} request={} key={}",
            session.id,
            request.id,
            request.dedupe_key()
        );
        Some(request)
    }

    /// Drops the active session without side effects.
    pub fn cancel(&mut self, reason: CancelReason) -> Option<DragSession> {
        let session = self.session.take()?;
        log_cancel(&session, reason);
        Some(session)
    }

    /// Cancels the session if it outlived the timeout.
    pub fn expire_stale(&mut self) -> bool {
        let expired = self
            .session
            .as_ref()
            .is_some_and(|session| session.started_at.elapsed() >= self.session_timeout);
        if expired {
            self.cancel(CancelReason::Timeout);
        }
        expired
    }
}

fn log_cancel(session: &DragSession, reason: CancelReason) {
    log::info!(
        "event=session_cancel module=gesture status=ok session={} source={} reason={}",
        session.id,
        session.source.id,
        reason.as_str()
    );
}
