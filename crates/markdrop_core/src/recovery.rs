//! Failure classification, bounded retry and remediation.
//!
//! # Responsibility
//! - Classify every failure into one of three classes.
//! - Provide the single bounded-retry utility used for store remediation.
//! - Rebuild the UI element to node id mapping before a retry.
//!
//! # Invariants
//! - Validation rejections are never retried.
//! - Attempts never exceed `RetryPolicy::max_attempts`.

use crate::config::{BackoffConfig, RetryConfig};
use crate::events::{StatusEvent, StatusLevel};
use crate::gesture::targets::{RemapReport, TargetRegistry};
use crate::guard::ValidationRejection;
use crate::mapper::IndexOutOfRange;
use crate::model::node::NodeId;
use crate::model::tree::BookmarkTree;
use crate::store::{timed, Store, StoreError, StoreOp};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Rejected locally; no store call was issued.
    ValidationRejection,
    /// Store call errored or timed out.
    StoreFailure,
    /// Post-move verification disagreed with the requested move.
    ConsistencyFailure,
}

impl FailureClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ValidationRejection => "validation_rejection",
            Self::StoreFailure => "store_failure",
            Self::ConsistencyFailure => "consistency_failure",
        }
    }
}

/// Post-move verification failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyError {
    /// Node vanished after a reported move.
    Missing(NodeId),
    /// Node sits under a different parent than requested.
    WrongParent {
        id: NodeId,
        expected: NodeId,
        actual: Option<NodeId>,
    },
    /// Node index lies outside its parent's child range.
    IndexOutOfRange {
        id: NodeId,
        index: usize,
        child_count: usize,
    },
}

impl Display for ConsistencyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(id) => write!(f, "node {id} missing after move"),
            Self::WrongParent {
                id,
                expected,
                actual,
            } => match actual {
                Some(actual) => write!(
                    f,
                    "node {id} expected under {expected}, found under {actual}"
                ),
                None => write!(f, "node {id} expected under {expected}, found at root"),
            },
            Self::IndexOutOfRange {
                id,
                index,
                child_count,
            } => write!(
                f,
                "node {id} at index {index} outside {child_count} children"
            ),
        }
    }
}

impl Error for ConsistencyError {}

/// Error raised while executing one queued move.
#[derive(Debug)]
pub enum MutationError {
    Validation(ValidationRejection),
    Store(StoreError),
    Consistency(ConsistencyError),
    /// Destination snapshot produced an index outside its child range.
    Mapping(IndexOutOfRange),
    /// Queue worker stopped before answering.
    Interrupted,
}

impl MutationError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Validation(_) => FailureClass::ValidationRejection,
            Self::Store(_) | Self::Interrupted => FailureClass::StoreFailure,
            Self::Consistency(_) | Self::Mapping(_) => FailureClass::ConsistencyFailure,
        }
    }

    /// Whether bounded remediation applies.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Store(_) | Self::Consistency(_) | Self::Mapping(_)
        )
    }
}

impl Display for MutationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "move rejected: {err}"),
            Self::Store(err) => write!(f, "store failure: {err}"),
            Self::Consistency(err) => write!(f, "store state inconsistent: {err}"),
            Self::Mapping(err) => write!(f, "index mapping failed: {err}"),
            Self::Interrupted => write!(f, "mutation queue stopped before the move resolved"),
        }
    }
}

impl Error for MutationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Consistency(err) => Some(err),
            Self::Mapping(err) => Some(err),
            Self::Interrupted => None,
        }
    }
}

impl From<ValidationRejection> for MutationError {
    fn from(value: ValidationRejection) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for MutationError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<ConsistencyError> for MutationError {
    fn from(value: ConsistencyError) -> Self {
        Self::Consistency(value)
    }
}

impl From<IndexOutOfRange> for MutationError {
    fn from(value: IndexOutOfRange) -> Self {
        Self::Mapping(value)
    }
}

/// Bounded retry with fixed or capped exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: BackoffConfig,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: BackoffConfig) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.backoff.clone())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `retry` (0 before the second attempt).
    pub fn delay_for(&self, retry: u32) -> Duration {
        match &self.backoff {
            BackoffConfig::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            BackoffConfig::Exponential { initial_ms, max_ms } => {
                let factor = 1_u64.checked_shl(retry).unwrap_or(u64::MAX);
                Duration::from_millis(initial_ms.saturating_mul(factor).min(*max_ms))
            }
        }
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or runs out of attempts. `operation` receives the 0-based attempt number.
    pub async fn run<T, E, Op, Fut>(
        &self,
        mut operation: Op,
        retryable: impl Fn(&E) -> bool,
    ) -> Result<T, E>
    where
        Op: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let last = attempt + 1 >= self.max_attempts;
                    if last || !retryable(&err) {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt);
                    log::warn!(
                        "event=retry_scheduled module=recovery status=retrying attempt={} delay_ms={} error={}",
                        attempt + 1,
                        delay.as_millis(),
                        err
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

/// Remediation and reporting for queued-move failures.
#[derive(Clone)]
pub struct ErrorRecovery {
    registry: Arc<Mutex<TargetRegistry>>,
}

impl ErrorRecovery {
    pub fn new(registry: Arc<Mutex<TargetRegistry>>) -> Self {
        Self { registry }
    }

    /// Refreshes the element to node id mapping from a fresh store tree.
    pub async fn remediate(
        &self,
        store: &dyn Store,
        limit: Duration,
    ) -> Result<RemapReport, StoreError> {
        let roots = timed(StoreOp::GetTree, limit, store.get_tree()).await?;
        let tree = BookmarkTree::new(roots);
        let report = self
            .registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remap(&tree);
        Ok(report)
    }

    /// Builds the user-visible status signal for one failure.
    pub fn status_for(error: &MutationError, request_id: Uuid) -> Option<StatusEvent> {
        let level = match error.class() {
            FailureClass::ValidationRejection => match error {
                MutationError::Validation(rejection) => {
                    let message = rejection.user_message()?;
                    return Some(StatusEvent::new(
                        StatusLevel::Failure,
                        message,
                        Some(request_id),
                    ));
                }
                _ => StatusLevel::Failure,
            },
            FailureClass::StoreFailure => StatusLevel::Failure,
            FailureClass::ConsistencyFailure => StatusLevel::Critical,
        };
        Some(StatusEvent::new(
            level,
            format!("Bookmark move failed: {error}"),
            Some(request_id),
        ))
    }
}
