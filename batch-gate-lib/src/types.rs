//! Core data types for batch execution.
//!
//! This module defines the work units fed into the executor, the per-unit
//! outcomes it produces, the aggregated batch result and the tuning knobs.

use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Upper bound applied by [`BatchConfig::with_concurrency`].
pub const MAX_CONCURRENCY: usize = 1000;

/// One unit of asynchronous work.
///
/// The action is a future, so nothing runs until the executor admits the
/// unit through the gate and starts polling it. Errors of any displayable type
/// are accepted and kept as their message.
pub struct WorkUnit<T> {
    label: String,
    action: BoxFuture<'static, Result<T, String>>,
}

impl<T> WorkUnit<T> {
    /// Wrap an action future under a human-readable label (e.g. a URL).
    pub fn new<L, F, E>(label: L, action: F) -> Self
    where
        L: Into<String>,
        F: Future<Output = Result<T, E>> + Send + 'static,
        E: fmt::Display,
    {
        Self {
            label: label.into(),
            action: action.map(|result| result.map_err(|e| e.to_string())).boxed(),
        }
    }

    /// Build a unit from a closure that creates the action when admitted.
    pub fn from_fn<L, F, Fut, E>(label: L, f: F) -> Self
    where
        L: Into<String>,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: fmt::Display,
    {
        Self::new(label, async move { f().await })
    }

    /// The label given at construction.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn into_parts(self) -> (String, BoxFuture<'static, Result<T, String>>) {
        (self.label, self.action)
    }
}

impl<T> fmt::Debug for WorkUnit<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkUnit")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Why a unit did not produce a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The action returned an error
    Action,
    /// The batch was cancelled before or while the unit ran
    Cancelled,
    /// The action panicked
    Panicked,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Action => write!(f, "failed"),
            FailureKind::Cancelled => write!(f, "cancelled"),
            FailureKind::Panicked => write!(f, "panicked"),
        }
    }
}

/// Description of a failed unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl UnitFailure {
    pub fn action<M: Into<String>>(message: M) -> Self {
        Self {
            kind: FailureKind::Action,
            message: message.into(),
        }
    }

    pub fn cancelled<M: Into<String>>(message: M) -> Self {
        Self {
            kind: FailureKind::Cancelled,
            message: message.into(),
        }
    }

    pub fn panicked<M: Into<String>>(message: M) -> Self {
        Self {
            kind: FailureKind::Panicked,
            message: message.into(),
        }
    }
}

impl fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Result of one completed work unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Outcome<T> {
    Success(T),
    Failure(UnitFailure),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    /// Whether the unit failed because the batch was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Outcome::Failure(UnitFailure {
                kind: FailureKind::Cancelled,
                ..
            })
        )
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&UnitFailure> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(failure) => Some(failure),
        }
    }

    pub fn into_result(self) -> Result<T, UnitFailure> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(failure) => Err(failure),
        }
    }
}

/// One position of a [`BatchResult`].
#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry<T> {
    /// Position of the unit in the submitted sequence
    pub index: usize,
    /// Label of the unit
    pub label: String,
    pub outcome: Outcome<T>,
}

/// Outcomes of a whole batch, one per submitted unit, in input order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult<T> {
    entries: Vec<BatchEntry<T>>,
    /// Wall-clock time from submission until the last unit finished
    duration: Duration,
}

impl<T> BatchResult<T> {
    pub(crate) fn new(entries: Vec<BatchEntry<T>>, duration: Duration) -> Self {
        Self { entries, duration }
    }

    pub(crate) fn empty() -> Self {
        Self::new(Vec::new(), Duration::ZERO)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Outcome of the unit submitted at `index`.
    pub fn get(&self, index: usize) -> Option<&Outcome<T>> {
        self.entries.get(index).map(|entry| &entry.outcome)
    }

    pub fn entries(&self) -> &[BatchEntry<T>] {
        &self.entries
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &Outcome<T>> {
        self.entries.iter().map(|entry| &entry.outcome)
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn success_count(&self) -> usize {
        self.outcomes().filter(|o| o.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes().filter(|o| o.is_failure()).count()
    }

    pub fn cancelled_count(&self) -> usize {
        self.outcomes().filter(|o| o.is_cancelled()).count()
    }

    pub fn into_outcomes(self) -> Vec<Outcome<T>> {
        self.entries.into_iter().map(|entry| entry.outcome).collect()
    }
}

/// Configuration options for batch execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum number of units holding the gate at once
    /// Default: 20, Range: 1-1000
    pub concurrency: usize,

    /// Deadline for the whole batch; units still waiting or running when it
    /// passes are cancelled
    /// Default: none
    #[serde(skip)]
    pub batch_timeout: Option<Duration>,

    /// Timeout applied by HTTP work units to each request
    /// Default: 5 seconds
    #[serde(skip)]
    pub request_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 20,
            batch_timeout: None,
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl BatchConfig {
    /// Set the concurrency limit, clamped to `1..=MAX_CONCURRENCY`.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        self
    }

    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = Some(timeout);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
