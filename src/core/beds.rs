//! Bounded bed pool with scoped, cancel-safe acquisition.
//!
//! Capacity is fixed for the lifetime of a run. A [`BedPermit`] releases its
//! slot on drop, so every exit path of a stage, including cancellation, gives
//! the bed back. Waiters are served in FIFO order (the fairness policy of the
//! underlying semaphore); callers must rely only on the capacity bound.

use thiserror::Error;
use tokio::sync::{Semaphore, SemaphorePermit};

/// Errors surfaced by [`BedPool::acquire`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BedPoolError {
    /// The pool was closed; no permit was taken.
    #[error("bed pool is closed")]
    Closed,
}

/// Fixed-capacity pool of beds shared by every workflow in a run.
#[derive(Debug)]
pub struct BedPool {
    beds: Semaphore,
    capacity: usize,
}

impl BedPool {
    /// Create a pool with `capacity` beds.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            beds: Semaphore::new(capacity),
            capacity,
        }
    }

    /// Wait until a bed is free and claim it.
    ///
    /// Suspends only the calling workflow. Dropping the returned future while
    /// it is still waiting never consumes a permit, so a workflow cancelled
    /// mid-wait cannot leak capacity.
    ///
    /// # Errors
    ///
    /// Returns [`BedPoolError::Closed`] once [`BedPool::close`] has been
    /// called.
    pub async fn acquire(&self) -> Result<BedPermit<'_>, BedPoolError> {
        let permit = self.beds.acquire().await.map_err(|_| BedPoolError::Closed)?;
        Ok(BedPermit { _permit: permit })
    }

    /// Number of beds currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.beds.available_permits()
    }

    /// Configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fail all current and future acquisitions.
    ///
    /// Used during teardown so late waiters degrade to the bed-less path
    /// instead of waiting on a pool nobody will drain.
    pub fn close(&self) {
        self.beds.close();
    }

    /// Whether [`BedPool::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.beds.is_closed()
    }
}

/// Exclusive hold on one bed; the slot frees when this is dropped.
#[derive(Debug)]
pub struct BedPermit<'a> {
    _permit: SemaphorePermit<'a>,
}
