//! Counting admission gate.
//!
//! A `BoundedGate` lets at most `capacity` holders in at any instant. Holders
//! normally receive a [`GatePermit`], a scoped handle that frees its slot when
//! dropped, so a slot cannot leak on an error, a panic or a cancelled task.
//!
//! The gate knows nothing about the work it admits: it can guard network
//! calls, disk writes or CPU-bound jobs alike.

use crate::error::BatchGateError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Debug)]
struct GateState {
    /// Free slots
    slots: Arc<Semaphore>,
    capacity: usize,
    /// Slots currently held, scoped and detached
    held: AtomicUsize,
    /// Slots taken through `acquire_detached` and not yet released
    detached: AtomicUsize,
}

/// A counting admission gate with a fixed capacity.
///
/// Cloning a gate is cheap and every clone shares the same slots, which is how
/// one gate is handed to many concurrent tasks. Independent gates never
/// interact, so batches with different capacities can run side by side.
///
/// # Example
///
/// ```rust
/// use batch_gate_lib::BoundedGate;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let gate = BoundedGate::new(2)?;
///     let permit = gate.acquire().await?;
///     assert_eq!(gate.available(), 1);
///     drop(permit);
///     assert_eq!(gate.available(), 2);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct BoundedGate {
    state: Arc<GateState>,
}

impl BoundedGate {
    /// Create a gate with `capacity` free slots.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCapacity` when `capacity` is zero or exceeds the
    /// largest permit count the runtime supports.
    pub fn new(capacity: usize) -> Result<Self, BatchGateError> {
        if capacity == 0 {
            return Err(BatchGateError::invalid_capacity(
                capacity,
                "capacity must be at least 1",
            ));
        }
        if capacity > Semaphore::MAX_PERMITS {
            return Err(BatchGateError::invalid_capacity(
                capacity,
                format!("capacity must not exceed {}", Semaphore::MAX_PERMITS),
            ));
        }

        Ok(Self {
            state: Arc::new(GateState {
                slots: Arc::new(Semaphore::new(capacity)),
                capacity,
                held: AtomicUsize::new(0),
                detached: AtomicUsize::new(0),
            }),
        })
    }

    /// Wait for a free slot and take it.
    ///
    /// Suspends only the calling task. Waiters are admitted in arrival order,
    /// so every caller is eventually let in as long as holders keep releasing.
    pub async fn acquire(&self) -> Result<GatePermit, BatchGateError> {
        let permit = self
            .state
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| BatchGateError::cancelled("waiting for a slot on a closed gate"))?;
        Ok(self.admit(permit))
    }

    /// Wait for a free slot unless `cancel` fires first.
    ///
    /// A cancelled wait returns `Cancelled` and takes no slot. An already
    /// cancelled token fails immediately even when slots are free.
    pub async fn acquire_with_cancel(
        &self,
        cancel: &CancellationToken,
    ) -> Result<GatePermit, BatchGateError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BatchGateError::cancelled("waiting for a gate slot")),
            permit = self.acquire() => permit,
        }
    }

    /// Take a slot if one is free right now.
    pub fn try_acquire(&self) -> Option<GatePermit> {
        self.state
            .slots
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| self.admit(permit))
    }

    /// Take a slot without a scoped handle.
    ///
    /// The caller must pair this with exactly one [`BoundedGate::release`].
    /// Prefer [`BoundedGate::acquire`] wherever a permit can be held.
    pub async fn acquire_detached(&self) -> Result<(), BatchGateError> {
        self.acquire().await?.detach();
        Ok(())
    }

    /// Return a slot taken with [`BoundedGate::acquire_detached`].
    ///
    /// # Errors
    ///
    /// Returns `ImbalancedRelease` and leaves the gate untouched when there is
    /// no outstanding detached acquisition. Releasing is not idempotent.
    pub fn release(&self) -> Result<(), BatchGateError> {
        self.state
            .detached
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map_err(|_| BatchGateError::ImbalancedRelease {
                capacity: self.state.capacity,
            })?;

        self.state.held.fetch_sub(1, Ordering::AcqRel);
        self.state.slots.add_permits(1);
        trace!(available = self.available(), "detached slot released");
        Ok(())
    }

    /// Fixed number of slots.
    pub fn capacity(&self) -> usize {
        self.state.capacity
    }

    /// Slots free right now.
    pub fn available(&self) -> usize {
        self.state.slots.available_permits()
    }

    /// Slots held right now.
    pub fn held(&self) -> usize {
        self.state.held.load(Ordering::Acquire)
    }

    fn admit(&self, permit: OwnedSemaphorePermit) -> GatePermit {
        let held = self.state.held.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(held, capacity = self.state.capacity, "slot acquired");
        GatePermit {
            permit: Some(permit),
            state: Arc::clone(&self.state),
        }
    }
}

/// One held slot of a [`BoundedGate`].
///
/// The slot is freed exactly once: when the permit is dropped or passed to
/// [`GatePermit::release`].
#[derive(Debug)]
#[must_use = "dropping a GatePermit releases its slot immediately"]
pub struct GatePermit {
    permit: Option<OwnedSemaphorePermit>,
    state: Arc<GateState>,
}

impl GatePermit {
    /// Free the slot now.
    pub fn release(self) {
        drop(self);
    }

    /// Capacity of the gate this permit belongs to.
    pub fn capacity(&self) -> usize {
        self.state.capacity
    }

    fn detach(mut self) {
        if let Some(permit) = self.permit.take() {
            permit.forget();
            self.state.detached.fetch_add(1, Ordering::AcqRel);
        }
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        // held drops before the semaphore permit returns, so available + held
        // never exceeds capacity.
        if let Some(permit) = self.permit.take() {
            self.state.held.fetch_sub(1, Ordering::AcqRel);
            drop(permit);
            trace!(
                available = self.state.slots.available_permits(),
                "slot released"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready_ok, task};

    #[test]
    fn test_new_rejects_zero_capacity() {
        let err = BoundedGate::new(0).unwrap_err();
        assert!(matches!(
            err,
            BatchGateError::InvalidCapacity { capacity: 0, .. }
        ));
    }

    #[test]
    fn test_new_rejects_oversized_capacity() {
        let err = BoundedGate::new(Semaphore::MAX_PERMITS + 1).unwrap_err();
        assert!(matches!(err, BatchGateError::InvalidCapacity { .. }));
    }

    #[tokio::test]
    async fn test_acquire_and_drop_restore_available() {
        let gate = BoundedGate::new(3).unwrap();
        assert_eq!(gate.capacity(), 3);
        assert_eq!(gate.available(), 3);

        let first = gate.acquire().await.unwrap();
        let second = gate.acquire().await.unwrap();
        assert_eq!(gate.available(), 1);
        assert_eq!(gate.held(), 2);

        first.release();
        assert_eq!(gate.available(), 2);
        assert_eq!(gate.held(), 1);

        drop(second);
        assert_eq!(gate.available(), 3);
        assert_eq!(gate.held(), 0);
    }

    #[test]
    fn test_acquire_waits_for_release() {
        let gate = BoundedGate::new(1).unwrap();
        let holder = gate.try_acquire().expect("slot should be free");

        let mut waiter = task::spawn(gate.acquire());
        assert_pending!(waiter.poll());

        drop(holder);
        assert!(waiter.is_woken());
        let permit = assert_ready_ok!(waiter.poll());
        assert_eq!(gate.held(), 1);
        drop(permit);
        assert_eq!(gate.available(), 1);
    }

    #[test]
    fn test_try_acquire_when_full() {
        let gate = BoundedGate::new(1).unwrap();
        let _permit = gate.try_acquire().unwrap();
        assert!(gate.try_acquire().is_none());
    }

    #[tokio::test]
    async fn test_clones_share_slots() {
        let gate = BoundedGate::new(2).unwrap();
        let other = gate.clone();

        let _a = gate.acquire().await.unwrap();
        let _b = other.acquire().await.unwrap();
        assert_eq!(gate.available(), 0);
        assert!(other.try_acquire().is_none());
    }

    #[tokio::test]
    async fn test_independent_gates_do_not_interact() {
        let narrow = BoundedGate::new(1).unwrap();
        let wide = BoundedGate::new(4).unwrap();

        let _held = narrow.acquire().await.unwrap();
        assert_eq!(narrow.available(), 0);
        assert_eq!(wide.available(), 4);
    }

    #[tokio::test]
    async fn test_cancelled_wait_takes_no_slot() {
        let gate = BoundedGate::new(1).unwrap();
        let _holder = gate.acquire().await.unwrap();
        let cancel = CancellationToken::new();

        let waiter = {
            let gate = gate.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { gate.acquire_with_cancel(&cancel).await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        cancel.cancel();

        let result = waiter.await.unwrap();
        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(gate.available(), 0);
        assert_eq!(gate.held(), 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_token_fails_even_with_free_slots() {
        let gate = BoundedGate::new(2).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = gate.acquire_with_cancel(&cancel).await;
        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(gate.available(), 2);
    }

    #[tokio::test]
    async fn test_detached_acquire_and_release() {
        let gate = BoundedGate::new(2).unwrap();
        gate.acquire_detached().await.unwrap();
        assert_eq!(gate.available(), 1);
        assert_eq!(gate.held(), 1);

        gate.release().unwrap();
        assert_eq!(gate.available(), 2);
        assert_eq!(gate.held(), 0);
    }

    #[tokio::test]
    async fn test_release_without_acquire_is_imbalanced() {
        let gate = BoundedGate::new(2).unwrap();
        let err = gate.release().unwrap_err();
        assert!(matches!(
            err,
            BatchGateError::ImbalancedRelease { capacity: 2 }
        ));
        assert_eq!(gate.available(), 2);

        // A scoped permit is not something `release` may return.
        let _permit = gate.acquire().await.unwrap();
        assert!(gate.release().is_err());
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn test_double_release_is_imbalanced() {
        let gate = BoundedGate::new(1).unwrap();
        gate.acquire_detached().await.unwrap();
        gate.release().unwrap();
        assert!(gate.release().is_err());
        assert_eq!(gate.available(), 1);
    }
}
