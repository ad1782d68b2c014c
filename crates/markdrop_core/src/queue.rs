//! Strict FIFO execution of move requests against the store.
//!
//! # Responsibility
//! - Run one move at a time: fetch, revalidate, move, verify.
//! - Reconcile the mirror and publish events before taking the next job.
//! - Hand every submitter a future that resolves with the job's outcome.
//!
//! # Invariants
//! - Job n+1 does not issue a store call until job n fully resolved.
//! - The queue worker is the only caller of `Store::move_node`.
//! - A job's `KeyLease` is released before its submitter is answered.

use crate::debounce::KeyLease;
use crate::events::{EngineEvent, EventBus, StatusLevel};
use crate::guard::{MoveCheck, ProtectionGuard, ValidationRejection};
use crate::mapper;
use crate::model::mutation::MutationRequest;
use crate::model::node::{BookmarkNode, Destination, NodeId};
use crate::reconcile::{OptimisticTicket, Reconciler};
use crate::recovery::{ConsistencyError, ErrorRecovery, MutationError, RetryPolicy};
use crate::store::{timed, Store, StoreError, StoreOp};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Confirmed result of one queued move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub request_id: Uuid,
    /// Id the store moved; differs from the request when remediation remapped it.
    pub item_id: NodeId,
    pub from: Destination,
    pub to: Destination,
    pub attempts: u32,
    /// A verification failure was seen on the way to success.
    pub recovered_from_inconsistency: bool,
}

/// Submission refused because the worker has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueClosed;

impl Display for QueueClosed {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "mutation queue is closed")
    }
}

impl Error for QueueClosed {}

/// Future answering one submission.
#[derive(Debug)]
pub struct PendingMove {
    request_id: Uuid,
    receiver: oneshot::Receiver<Result<MoveOutcome, MutationError>>,
}

impl PendingMove {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }
}

impl Future for PendingMove {
    type Output = Result<MoveOutcome, MutationError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(MutationError::Interrupted)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Collaborators the worker needs.
pub struct QueueContext {
    pub store: Arc<dyn Store>,
    pub guard: Arc<ProtectionGuard>,
    pub reconciler: Reconciler,
    pub recovery: ErrorRecovery,
    pub retry: RetryPolicy,
    pub events: EventBus,
    pub store_timeout: Duration,
}

struct Job {
    request: MutationRequest,
    ticket: Option<OptimisticTicket>,
    lease: KeyLease,
    reply: oneshot::Sender<Result<MoveOutcome, MutationError>>,
}

/// Handle to the single queue worker.
pub struct MutationQueue {
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MutationQueue {
    /// Spawns the worker on the current tokio runtime.
    pub fn spawn(context: QueueContext) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(Worker { context }.run(receiver));
        Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Appends one admitted request to the queue.
    pub fn enqueue(
        &self,
        request: MutationRequest,
        ticket: Option<OptimisticTicket>,
        lease: KeyLease,
    ) -> Result<PendingMove, QueueClosed> {
        let (reply, receiver) = oneshot::channel();
        let request_id = request.id;
        let key = request.dedupe_key();
        let sender = lock(&self.sender);
        let sender = sender.as_ref().ok_or(QueueClosed)?;
        sender
            .send(Job {
                request,
                ticket,
                lease,
                reply,
            })
            .map_err(|_| QueueClosed)?;
        log::info!(
            "event=move_enqueued module=queue status=ok request={} key={}",
            request_id,
            key
        );
        Ok(PendingMove {
            request_id,
            receiver,
        })
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.sender)
            .as_ref()
            .map_or(true, |sender| sender.is_closed())
    }

    /// Stops accepting jobs, then waits for accepted ones to drain.
    pub async fn shutdown(&self) {
        lock(&self.sender).take();
        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                log::error!(
                    "event=queue_worker_join module=queue status=error error={}",
                    err
                );
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Per-job state carried across retry attempts.
struct AttemptTrack {
    source_id: NodeId,
    folder_id: NodeId,
    origin: Option<Destination>,
    inconsistent: bool,
    lease: KeyLease,
}

struct Worker {
    context: QueueContext,
}

impl Worker {
    async fn run(self, mut receiver: mpsc::UnboundedReceiver<Job>) {
        log::debug!("event=queue_worker_started module=queue status=ok");
        while let Some(job) = receiver.recv().await {
            self.process(job).await;
        }
        log::debug!("event=queue_worker_stopped module=queue status=ok");
    }

    async fn process(&self, job: Job) {
        let Job {
            request,
            ticket,
            lease,
            reply,
        } = job;
        log::info!(
            "event=move_started module=queue status=ok request={} key={} modality={:?}",
            request.id,
            request.dedupe_key(),
            request.modality
        );

        let track = Mutex::new(AttemptTrack {
            source_id: request.source_id().clone(),
            folder_id: request.target.folder_id.clone(),
            origin: None,
            inconsistent: false,
            lease,
        });
        let request_ref = &request;
        let track_ref = &track;
        let result = self
            .context
            .retry
            .run(
                move |attempt| self.attempt(request_ref, attempt, track_ref),
                MutationError::is_retryable,
            )
            .await;

        self.reconcile(&request, ticket.as_ref(), &result).await;
        drop(track);
        if reply.send(result).is_err() {
            log::debug!(
                "event=move_reply_dropped module=queue status=ok request={}",
                request.id
            );
        }
    }

    async fn attempt(
        &self,
        request: &MutationRequest,
        attempt: u32,
        track: &Mutex<AttemptTrack>,
    ) -> Result<MoveOutcome, MutationError> {
        if attempt > 0 {
            let report = self
                .context
                .recovery
                .remediate(self.context.store.as_ref(), self.context.store_timeout)
                .await?;
            let mut state = lock(track);
            if let Some(new_id) = report.resolve(&state.source_id).cloned() {
                log::info!(
                    "event=source_remapped module=queue status=ok request={} old={} new={}",
                    request.id,
                    state.source_id,
                    new_id
                );
                state.lease.rebind(new_id.clone());
                state.source_id = new_id;
            }
            if let Some(new_id) = report.resolve(&state.folder_id).cloned() {
                state.folder_id = new_id;
            }
        }

        let result = self.execute(request, track).await;
        let mut state = lock(track);
        match result {
            Err(MutationError::Consistency(err)) => {
                state.inconsistent = true;
                log::error!(
                    "event=move_verification_failed module=queue status=error request={} attempt={} error={}",
                    request.id,
                    attempt + 1,
                    err
                );
                Err(MutationError::Consistency(err))
            }
            // A retried move that already landed shows up as a no-op.
            Err(MutationError::Validation(ValidationRejection::NoOp { source, position }))
                if attempt > 0 =>
            {
                match state.origin.clone() {
                    Some(from) if from != position => Ok(MoveOutcome {
                        request_id: request.id,
                        item_id: source,
                        from,
                        to: position,
                        attempts: attempt + 1,
                        recovered_from_inconsistency: state.inconsistent,
                    }),
                    _ => Err(MutationError::Validation(ValidationRejection::NoOp {
                        source,
                        position,
                    })),
                }
            }
            Ok(mut outcome) => {
                outcome.attempts = attempt + 1;
                outcome.recovered_from_inconsistency = state.inconsistent;
                Ok(outcome)
            }
            Err(err) => Err(err),
        }
    }

    async fn execute(
        &self,
        request: &MutationRequest,
        track: &Mutex<AttemptTrack>,
    ) -> Result<MoveOutcome, MutationError> {
        let store = self.context.store.as_ref();
        let limit = self.context.store_timeout;
        let (source_id, folder_id) = {
            let state = lock(track);
            (state.source_id.clone(), state.folder_id.clone())
        };

        // Fetch authoritative source, siblings and destination state.
        let source = timed(StoreOp::Get, limit, store.get(source_id.clone())).await?;
        let mut current_position = None;
        let mut siblings = Vec::new();
        if let Some(parent_id) = source.parent_id.clone() {
            siblings = timed(
                StoreOp::GetChildren,
                limit,
                store.get_children(parent_id.clone()),
            )
            .await?;
            let index = siblings
                .iter()
                .position(|child| child.id == source_id)
                .unwrap_or(source.index);
            current_position = Some(Destination { parent_id, index });
        }
        {
            let mut state = lock(track);
            if state.origin.is_none() {
                state.origin = current_position.clone();
            }
        }

        let destination = timed(StoreOp::Get, limit, store.get(folder_id.clone())).await?;
        if !destination.is_folder() {
            return Err(ValidationRejection::IncompatibleTarget {
                source: source_id,
                kind: destination.kind(),
            }
            .into());
        }
        let children = match current_position.as_ref() {
            Some(position) if position.parent_id == folder_id => siblings,
            _ => {
                timed(
                    StoreOp::GetChildren,
                    limit,
                    store.get_children(folder_id.clone()),
                )
                .await?
            }
        };
        let ancestry = self.fetch_ancestry(&destination).await?;

        // Revalidate against the fresh snapshot and re-map the placement.
        let to = mapper::resolve(request.target.placement, &source_id, &folder_id, &children)?;
        self.context.guard.check_move(MoveCheck {
            source_id: &source_id,
            source_kind: source.kind(),
            source_title: &source.title,
            source_is_root: source.parent_id.is_none(),
            destination: &to,
            destination_title: &destination.title,
            destination_ancestry: &ancestry,
            current_position: current_position.as_ref(),
        })?;
        let from = current_position.ok_or_else(|| ValidationRejection::ProtectedSource {
            id: source_id.clone(),
            title: source.title.clone(),
        })?;

        timed(
            StoreOp::Move,
            limit,
            store.move_node(source_id.clone(), to.clone()),
        )
        .await?;

        let settled = self.verify(&source_id, &to, &children).await?;
        log::info!(
            "event=move_confirmed module=queue status=ok request={} source={} from={} to={}",
            request.id,
            source_id,
            from,
            settled
        );
        Ok(MoveOutcome {
            request_id: request.id,
            item_id: source_id,
            from,
            to: settled,
            attempts: 1,
            recovered_from_inconsistency: false,
        })
    }

    /// Destination id followed by its ancestors, read from the store.
    async fn fetch_ancestry(&self, destination: &BookmarkNode) -> Result<Vec<NodeId>, StoreError> {
        let mut chain = vec![destination.id.clone()];
        let mut visited: HashSet<NodeId> = chain.iter().cloned().collect();
        let mut cursor = destination.parent_id.clone();
        while let Some(id) = cursor {
            if !visited.insert(id.clone()) {
                log::warn!(
                    "event=ancestry_loop module=queue status=error node={}",
                    id
                );
                break;
            }
            let node = timed(
                StoreOp::Get,
                self.context.store_timeout,
                self.context.store.get(id.clone()),
            )
            .await?;
            chain.push(node.id.clone());
            cursor = node.parent_id;
        }
        Ok(chain)
    }

    /// Reads the node back and checks it sits in the expected parent.
    async fn verify(
        &self,
        source_id: &NodeId,
        expected: &Destination,
        destination_children: &[BookmarkNode],
    ) -> Result<Destination, MutationError> {
        let node = match timed(
            StoreOp::Get,
            self.context.store_timeout,
            self.context.store.get(source_id.clone()),
        )
        .await
        {
            Ok(node) => node,
            Err(StoreError::NotFound(id)) => {
                return Err(ConsistencyError::Missing(id).into());
            }
            Err(err) => return Err(err.into()),
        };

        if node.parent_id.as_ref() != Some(&expected.parent_id) {
            return Err(ConsistencyError::WrongParent {
                id: source_id.clone(),
                expected: expected.parent_id.clone(),
                actual: node.parent_id,
            }
            .into());
        }
        let child_count = destination_children
            .iter()
            .filter(|child| &child.id != source_id)
            .count()
            + 1;
        if node.index >= child_count {
            return Err(ConsistencyError::IndexOutOfRange {
                id: source_id.clone(),
                index: node.index,
                child_count,
            }
            .into());
        }
        if node.index != expected.index {
            log::warn!(
                "event=move_index_drift module=queue status=ok source={} expected={} actual={}",
                source_id,
                expected.index,
                node.index
            );
        }
        Ok(Destination {
            parent_id: expected.parent_id.clone(),
            index: node.index,
        })
    }

    async fn reconcile(
        &self,
        request: &MutationRequest,
        ticket: Option<&OptimisticTicket>,
        result: &Result<MoveOutcome, MutationError>,
    ) {
        let context = &self.context;
        match result {
            Ok(outcome) => {
                if let Some(ticket) = ticket {
                    context.reconciler.confirm(ticket);
                }
                context.events.publish(EngineEvent::ItemMoved {
                    item_id: outcome.item_id.clone(),
                    from_parent_id: outcome.from.parent_id.clone(),
                    to_parent_id: outcome.to.parent_id.clone(),
                    index: outcome.to.index,
                });
                if outcome.recovered_from_inconsistency {
                    context.events.status(
                        StatusLevel::Critical,
                        format!(
                            "Bookmark store reported an inconsistent state for \"{}\"; the move was retried.",
                            request.source.title
                        ),
                        Some(request.id),
                    );
                } else {
                    context.events.status(
                        StatusLevel::Success,
                        format!("Moved \"{}\".", request.source.title),
                        Some(request.id),
                    );
                }
            }
            Err(err) => {
                if let Some(ticket) = ticket {
                    context.reconciler.rollback(ticket);
                }
                context.reconciler.invalidate();
                log::warn!(
                    "event=move_failed module=queue status=error request={} class={} error={}",
                    request.id,
                    err.class().as_str(),
                    err
                );
                if let Some(status) = ErrorRecovery::status_for(err, request.id) {
                    context.events.publish(EngineEvent::Status(status));
                }
            }
        }

        if let Err(err) = context
            .reconciler
            .refresh(context.store.as_ref(), context.store_timeout)
            .await
        {
            log::warn!(
                "event=mirror_refresh module=queue status=error request={} error={}",
                request.id,
                err
            );
        }
    }
}
