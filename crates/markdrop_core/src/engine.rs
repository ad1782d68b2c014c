//! Drag-and-drop reorder engine facade.
//!
//! # Responsibility
//! - Route host events through the probed input adapters into one
//!   `GestureCapture`.
//! - Gate, validate and map committed drops before they reach the queue.
//! - Expose mirror, registry and event access to the host.
//!
//! # Invariants
//! - Rejected submissions (debounced, protected, cyclic, no-op) issue zero
//!   store calls.
//! - Escape and session timeout are handled here, independent of adapters.
//! - Shared locks are released before any `.await`.

use crate::config::{ConfigError, EngineConfig};
use crate::debounce::{DebounceRejection, HoverCounter, OperationDebouncer};
use crate::events::{EngineEvent, EventBus, StatusLevel};
use crate::gesture::adapter::{probe_adapters, GestureContext, HostCapabilities, InputAdapter};
use crate::gesture::event::{HostEvent, Key};
use crate::gesture::targets::TargetRegistry;
use crate::gesture::{CancelReason, GestureCapture, GesturePhase};
use crate::guard::{MoveCheck, ProtectionGuard, ValidationRejection};
use crate::mapper::{self, IndexOutOfRange};
use crate::model::mutation::MutationRequest;
use crate::model::node::Destination;
use crate::model::tree::BookmarkTree;
use crate::queue::{MutationQueue, PendingMove, QueueClosed, QueueContext};
use crate::reconcile::{spawn_change_listener, Reconciler};
use crate::recovery::{ErrorRecovery, RetryPolicy};
use crate::store::{Store, StoreError};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Engine start-up failure.
#[derive(Debug)]
pub enum EngineError {
    Config(ConfigError),
    /// Capability probe left no usable input path.
    NoInputAdapter,
    /// Initial mirror load failed.
    Store(StoreError),
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "invalid engine config: {err}"),
            Self::NoInputAdapter => write!(f, "host offers neither native drag nor pointer events"),
            Self::Store(err) => write!(f, "initial bookmark load failed: {err}"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::NoInputAdapter => None,
            Self::Store(err) => Some(err),
        }
    }
}

impl From<ConfigError> for EngineError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Why a committed drop did not reach the queue.
#[derive(Debug)]
pub enum SubmitError {
    Debounced(DebounceRejection),
    Rejected(ValidationRejection),
    Mapping(IndexOutOfRange),
    QueueClosed,
}

impl Display for SubmitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debounced(err) => write!(f, "submission debounced: {err}"),
            Self::Rejected(err) => write!(f, "move rejected: {err}"),
            Self::Mapping(err) => write!(f, "index mapping failed: {err}"),
            Self::QueueClosed => write!(f, "mutation queue is closed"),
        }
    }
}

impl Error for SubmitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Debounced(err) => Some(err),
            Self::Rejected(err) => Some(err),
            Self::Mapping(err) => Some(err),
            Self::QueueClosed => None,
        }
    }
}

impl From<DebounceRejection> for SubmitError {
    fn from(value: DebounceRejection) -> Self {
        Self::Debounced(value)
    }
}

impl From<ValidationRejection> for SubmitError {
    fn from(value: ValidationRejection) -> Self {
        Self::Rejected(value)
    }
}

impl From<IndexOutOfRange> for SubmitError {
    fn from(value: IndexOutOfRange) -> Self {
        Self::Mapping(value)
    }
}

impl From<QueueClosed> for SubmitError {
    fn from(_: QueueClosed) -> Self {
        Self::QueueClosed
    }
}

/// Host-facing engine.
pub struct DragDropEngine {
    config: EngineConfig,
    store: Arc<dyn Store>,
    adapters: Vec<Box<dyn InputAdapter>>,
    capture: GestureCapture,
    hover: HoverCounter,
    registry: Arc<Mutex<TargetRegistry>>,
    debouncer: OperationDebouncer,
    guard: Arc<ProtectionGuard>,
    reconciler: Reconciler,
    queue: MutationQueue,
    events: EventBus,
    listener: JoinHandle<()>,
}

impl DragDropEngine {
    /// Validates config, probes adapters, loads the mirror and starts workers.
    pub async fn start(
        store: Arc<dyn Store>,
        config: EngineConfig,
        capabilities: HostCapabilities,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let adapters = probe_adapters(capabilities);
        if adapters.is_empty() {
            log::error!("event=engine_start module=engine status=error reason=no_input_adapter");
            return Err(EngineError::NoInputAdapter);
        }

        let reconciler = Reconciler::new();
        let listener = spawn_change_listener(store.subscribe(), reconciler.clone());
        if let Err(err) = reconciler
            .refresh(store.as_ref(), config.store_timeout())
            .await
        {
            listener.abort();
            log::error!(
                "event=engine_start module=engine status=error reason=initial_load error={}",
                err
            );
            return Err(err.into());
        }

        let registry = Arc::new(Mutex::new(TargetRegistry::new()));
        let guard = Arc::new(ProtectionGuard::new(
            &config.extra_protected_ids,
            &config.extra_protected_titles,
        ));
        let events = EventBus::new();
        let queue = MutationQueue::spawn(QueueContext {
            store: Arc::clone(&store),
            guard: Arc::clone(&guard),
            reconciler: reconciler.clone(),
            recovery: ErrorRecovery::new(Arc::clone(&registry)),
            retry: RetryPolicy::from_config(&config.retry),
            events: events.clone(),
            store_timeout: config.store_timeout(),
        });

        log::info!(
            "event=engine_start module=engine status=ok adapters={} nodes={}",
            adapters.len(),
            reconciler.with_tree_ref(BookmarkTree::len)
        );
        Ok(Self {
            capture: GestureCapture::new(
                config.session_timeout(),
                config.claim_window(),
                config.drag_threshold_px,
            ),
            debouncer: OperationDebouncer::new(config.debounce_window()),
            hover: HoverCounter::new(),
            config,
            store,
            adapters,
            registry,
            guard,
            reconciler,
            queue,
            events,
            listener,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn phase(&self) -> GesturePhase {
        self.capture.phase()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Shared element registry; hosts register sources and zones here.
    pub fn registry(&self) -> Arc<Mutex<TargetRegistry>> {
        Arc::clone(&self.registry)
    }

    /// Runs `edit` with the registry locked.
    pub fn with_registry<R>(&self, edit: impl FnOnce(&mut TargetRegistry) -> R) -> R {
        edit(&mut lock(&self.registry))
    }

    pub fn mirror(&self) -> BookmarkTree {
        self.reconciler.snapshot()
    }

    pub fn mirror_is_stale(&self) -> bool {
        self.reconciler.is_stale()
    }

    /// Refetches the canonical tree into the mirror.
    pub async fn refresh_mirror(&self) -> Result<u64, StoreError> {
        self.reconciler
            .refresh(self.store.as_ref(), self.config.store_timeout())
            .await
    }

    /// Feeds one host event; returns the queued move when a drop committed.
    pub fn handle_event(&mut self, event: HostEvent) -> Result<Option<PendingMove>, SubmitError> {
        let mut highlights = Vec::new();
        self.capture.expire_stale();
        let prior_session = self.capture.session().map(|session| session.id);

        let request = if let HostEvent::KeyDown { key } = &event {
            if *key == Key::Escape && self.capture.cancel(CancelReason::EscapeKey).is_some() {
                highlights.extend(self.hover.reset());
            }
            None
        } else {
            let registry = lock(&self.registry);
            let mut committed = None;
            for adapter in self.adapters.iter_mut() {
                if !adapter.accepts(&event) {
                    continue;
                }
                let mut ctx = GestureContext {
                    capture: &mut self.capture,
                    targets: &registry,
                    hover: &mut self.hover,
                    highlights: &mut highlights,
                };
                if let Some(request) = adapter.handle(&event, &mut ctx) {
                    committed.get_or_insert(request);
                }
            }
            committed
        };

        let current_session = self.capture.session().map(|session| session.id);
        let superseded = matches!(
            (prior_session, current_session),
            (Some(prior), Some(current)) if prior != current
        );
        if superseded || self.capture.phase() == GesturePhase::Idle {
            highlights.extend(self.hover.reset());
            for adapter in self.adapters.iter_mut() {
                adapter.reset();
            }
        }
        for change in highlights {
            self.events.publish(EngineEvent::Highlight {
                element: change.element,
                active: change.active,
            });
        }

        match request {
            Some(request) => self.submit(request).map(Some),
            None => Ok(None),
        }
    }

    /// Ends the active session without side effects.
    pub fn cancel(&mut self) -> bool {
        let cancelled = self.capture.cancel(CancelReason::Requested).is_some();
        for change in self.hover.reset() {
            self.events.publish(EngineEvent::Highlight {
                element: change.element,
                active: change.active,
            });
        }
        for adapter in self.adapters.iter_mut() {
            adapter.reset();
        }
        cancelled
    }

    /// Gates, validates and maps one request, then hands it to the queue.
    pub fn submit(&self, request: MutationRequest) -> Result<PendingMove, SubmitError> {
        let lease = self.debouncer.admit(&request).map_err(|err| {
            log::info!(
                "event=move_submit module=engine status=debounced request={} error={}",
                request.id,
                err
            );
            err
        })?;

        let destination = match self.precheck(&request) {
            Ok(destination) => destination,
            Err(err) => {
                log::info!(
                    "event=move_submit module=engine status=rejected request={} error={}",
                    request.id,
                    err
                );
                if let SubmitError::Rejected(rejection) = &err {
                    if let Some(message) = rejection.user_message() {
                        self.events
                            .status(StatusLevel::Failure, message, Some(request.id));
                    }
                }
                return Err(err);
            }
        };

        let ticket = self
            .reconciler
            .apply_optimistic(request.id, request.source_id(), &destination);
        let request_id = request.id;
        match self.queue.enqueue(request, ticket.clone(), lease) {
            Ok(pending) => Ok(pending),
            Err(err) => {
                if let Some(ticket) = ticket.as_ref() {
                    self.reconciler.rollback(ticket);
                }
                log::error!(
                    "event=move_submit module=engine status=error request={} error={}",
                    request_id,
                    err
                );
                Err(err.into())
            }
        }
    }

    /// Mirror-based validation; protection itself never depends on the mirror.
    fn precheck(&self, request: &MutationRequest) -> Result<Destination, SubmitError> {
        let source_id = request.source_id();
        let folder_id = &request.target.folder_id;
        self.reconciler.with_tree_ref(|tree| -> Result<Destination, SubmitError> {
            let children = tree.children_of(folder_id).unwrap_or(&[]);
            let destination =
                mapper::resolve(request.target.placement, source_id, folder_id, children)?;
            let ancestry = tree.ancestry(folder_id);
            let current = tree.position_of(source_id);
            let source_is_root = tree
                .find(source_id)
                .is_some_and(|node| node.parent_id.is_none());
            self.guard.check_move(MoveCheck {
                source_id,
                source_kind: request.source.kind,
                source_title: &request.source.title,
                source_is_root,
                destination: &destination,
                destination_title: &request.target.folder_title,
                destination_ancestry: &ancestry,
                current_position: current.as_ref(),
            })?;
            Ok(destination)
        })
    }

    /// Stops the queue after draining accepted moves.
    pub async fn shutdown(self) {
        self.queue.shutdown().await;
        self.listener.abort();
        log::info!("event=engine_stop module=engine status=ok");
    }
}

fn lock(registry: &Mutex<TargetRegistry>) -> MutexGuard<'_, TargetRegistry> {
    registry
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
