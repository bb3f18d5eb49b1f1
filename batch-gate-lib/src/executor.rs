//! Batch executor.
//!
//! This module provides the `BatchExecutor` that drives a batch of
//! [`WorkUnit`]s through a [`BoundedGate`] and collects exactly one
//! [`Outcome`] per unit. Units run as tokio tasks tracked in a `JoinSet`, so
//! the executor knows deterministically when the batch is done.

use crate::error::BatchGateError;
use crate::gate::BoundedGate;
use crate::types::{BatchConfig, BatchEntry, BatchResult, Outcome, UnitFailure, WorkUnit};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{BoxStream, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn, Instrument};

/// Stream of finished units, in completion order.
pub type OutcomeStream<T> = BoxStream<'static, BatchEntry<T>>;

/// Runs batches of work units with bounded concurrency.
///
/// # Example
///
/// ```rust,no_run
/// use batch_gate_lib::{BatchExecutor, BoundedGate, WorkUnit};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let executor = BatchExecutor::with_gate(BoundedGate::new(20)?);
///     let units: Vec<WorkUnit<usize>> = (0..200)
///         .map(|i| WorkUnit::new(format!("job-{}", i), async move { Ok::<_, String>(i * 2) }))
///         .collect();
///
///     let result = executor.run_batch(units).await?;
///     println!("{} succeeded, {} failed", result.success_count(), result.failure_count());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    gate: Option<BoundedGate>,
    batch_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl BatchExecutor {
    /// Create an executor without a gate.
    ///
    /// A gate must be supplied with [`BatchExecutor::set_gate`] before running
    /// a batch, otherwise `run_batch` fails with `InvalidConfiguration`.
    pub fn new() -> Self {
        Self {
            gate: None,
            batch_timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Create an executor that admits units through `gate`.
    pub fn with_gate(gate: BoundedGate) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    /// Create an executor with a fresh gate sized by `config.concurrency`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCapacity` when `config.concurrency` is zero.
    pub fn with_config(config: &BatchConfig) -> Result<Self, BatchGateError> {
        let gate = BoundedGate::new(config.concurrency)?;
        Ok(Self {
            gate: Some(gate),
            batch_timeout: config.batch_timeout,
            cancel: CancellationToken::new(),
        })
    }

    /// Cancel every batch still running when `timeout` has elapsed.
    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = Some(timeout);
        self
    }

    pub fn set_gate(&mut self, gate: BoundedGate) {
        self.gate = Some(gate);
    }

    pub fn gate(&self) -> Option<&BoundedGate> {
        self.gate.as_ref()
    }

    /// Token that cancels every batch of this executor, current and future.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel all outstanding units.
    ///
    /// Units still waiting for a slot fail without taking one; running units
    /// are dropped and give their slot back. Both report
    /// `FailureKind::Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Run every unit and wait for all of them.
    ///
    /// Returns one outcome per unit, at the unit's input index. A unit that
    /// fails, panics or is cancelled never affects the others.
    ///
    /// Panics become `Failure(Panicked)` only when the crate is built with
    /// `panic = "unwind"`. Under `panic = "abort"` a panicking unit aborts the
    /// whole process.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration`, before starting any unit, when no gate
    /// has been configured.
    pub async fn run_batch<T>(
        &self,
        units: Vec<WorkUnit<T>>,
    ) -> Result<BatchResult<T>, BatchGateError>
    where
        T: Send + 'static,
    {
        let gate = self.require_gate()?;
        Ok(execute(gate, units, &self.cancel, self.batch_timeout).await)
    }

    /// Run every unit and yield each one as it finishes.
    ///
    /// Admission is bounded exactly as in [`BatchExecutor::run_batch`].
    /// Dropping the stream early aborts the remaining units and returns their
    /// slots. Must be called from within a tokio runtime.
    pub fn run_batch_stream<T>(
        &self,
        units: Vec<WorkUnit<T>>,
    ) -> Result<OutcomeStream<T>, BatchGateError>
    where
        T: Send + 'static,
    {
        let gate = self.require_gate()?;
        Ok(start(gate, units, &self.cancel, self.batch_timeout))
    }

    fn require_gate(&self) -> Result<&BoundedGate, BatchGateError> {
        self.gate.as_ref().ok_or_else(|| {
            BatchGateError::invalid_configuration("no gate configured for this executor")
        })
    }
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `units` through `gate` and wait for all of them.
///
/// Equivalent to a [`BatchExecutor`] holding `gate` with no timeout and no
/// external cancellation.
pub async fn run_batch<T>(units: Vec<WorkUnit<T>>, gate: &BoundedGate) -> BatchResult<T>
where
    T: Send + 'static,
{
    execute(gate, units, &CancellationToken::new(), None).await
}

async fn execute<T>(
    gate: &BoundedGate,
    units: Vec<WorkUnit<T>>,
    parent: &CancellationToken,
    timeout: Option<Duration>,
) -> BatchResult<T>
where
    T: Send + 'static,
{
    if units.is_empty() {
        return BatchResult::empty();
    }

    let total = units.len();
    let span = tracing::info_span!("batch", units = total, capacity = gate.capacity());

    async move {
        let started = Instant::now();
        let mut slots: Vec<Option<BatchEntry<T>>> = (0..total).map(|_| None).collect();

        let mut stream = start(gate, units, parent, timeout);
        while let Some(entry) = stream.next().await {
            let index = entry.index;
            slots[index] = Some(entry);
        }

        let entries: Vec<BatchEntry<T>> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| BatchEntry {
                    index,
                    label: String::new(),
                    outcome: Outcome::Failure(UnitFailure::panicked(
                        "unit task was aborted before reporting",
                    )),
                })
            })
            .collect();

        let result = BatchResult::new(entries, started.elapsed());
        info!(
            succeeded = result.success_count(),
            failed = result.failure_count(),
            cancelled = result.cancelled_count(),
            elapsed_ms = result.duration().as_millis() as u64,
            "batch finished"
        );
        result
    }
    .instrument(span)
    .await
}

/// Spawn one task per unit under a child of `parent` and stream their entries.
fn start<T>(
    gate: &BoundedGate,
    units: Vec<WorkUnit<T>>,
    parent: &CancellationToken,
    timeout: Option<Duration>,
) -> OutcomeStream<T>
where
    T: Send + 'static,
{
    if units.is_empty() {
        return futures::stream::empty().boxed();
    }

    let batch_token = parent.child_token();
    if let Some(limit) = timeout {
        spawn_watchdog(batch_token.clone(), limit);
    }

    let mut tasks = JoinSet::new();
    for (index, unit) in units.into_iter().enumerate() {
        let (label, action) = unit.into_parts();
        let gate = gate.clone();
        let cancel = batch_token.clone();
        tasks.spawn(async move {
            let outcome = run_unit(&gate, &cancel, index, &label, action).await;
            BatchEntry {
                index,
                label,
                outcome,
            }
        });
    }

    let inflight = Inflight {
        tasks,
        _guard: batch_token.drop_guard(),
    };

    futures::stream::unfold(inflight, |mut inflight| async move {
        loop {
            match inflight.tasks.join_next().await {
                None => return None,
                Some(Ok(entry)) => return Some((entry, inflight)),
                Some(Err(err)) => error!(error = %err, "unit task did not complete"),
            }
        }
    })
    .boxed()
}

/// Tasks of one batch. Dropping it aborts what is left and cancels the
/// batch token, which also stops the watchdog.
struct Inflight<T> {
    tasks: JoinSet<BatchEntry<T>>,
    _guard: DropGuard,
}

fn spawn_watchdog(token: CancellationToken, limit: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(limit) => {
                warn!(limit_ms = limit.as_millis() as u64, "batch timeout elapsed, cancelling outstanding units");
                token.cancel();
            }
        }
    });
}

/// Admit, run and release one unit.
///
/// Panic capture relies on unwinding; with `panic = "abort"` there is nothing
/// to catch.
async fn run_unit<T>(
    gate: &BoundedGate,
    cancel: &CancellationToken,
    index: usize,
    label: &str,
    action: BoxFuture<'static, Result<T, String>>,
) -> Outcome<T> {
    let permit = match gate.acquire_with_cancel(cancel).await {
        Ok(permit) => permit,
        Err(err) => {
            debug!(index, label, "unit cancelled before admission");
            return Outcome::Failure(UnitFailure::cancelled(err.to_string()));
        }
    };
    debug!(index, label, held = gate.held(), "unit admitted");

    let finished = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = AssertUnwindSafe(action).catch_unwind() => Some(result),
    };
    permit.release();
    debug!(index, label, "unit released its slot");

    match finished {
        None => Outcome::Failure(UnitFailure::cancelled("cancelled while running")),
        Some(Ok(Ok(value))) => Outcome::Success(value),
        Some(Ok(Err(message))) => Outcome::Failure(UnitFailure::action(message)),
        Some(Err(payload)) => Outcome::Failure(UnitFailure::panicked(panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unit panicked".to_string()
    }
}
