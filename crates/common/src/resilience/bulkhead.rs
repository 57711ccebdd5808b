//! Bulkhead: a resizable pool of concurrency slots
//!
//! Callers await [`Bulkhead::acquire`] and hold the returned permit for the
//! duration of their work. Waiting suspends only the awaiting task. The pool
//! can be resized at runtime; shrinking below the number of slots in use is
//! settled lazily by retiring permits as they are released.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument};

use crate::error::{CommonError, CommonResult};

/// Metrics for bulkhead monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkheadMetrics {
    /// Permits handed out since creation
    pub total_operations: u64,
    /// Permits currently held
    pub current_concurrent: usize,
    /// Tasks currently waiting for a permit
    pub waiting: usize,
    /// Configured number of slots
    pub max_concurrent: usize,
}

impl BulkheadMetrics {
    /// Current utilization as a fraction (0.0 to 1.0, may exceed 1.0 briefly
    /// after a shrink)
    pub fn utilization(&self) -> f64 {
        self.current_concurrent as f64 / self.max_concurrent.max(1) as f64
    }

    /// Whether every slot is taken
    pub fn is_at_capacity(&self) -> bool {
        self.current_concurrent >= self.max_concurrent
    }

    /// Human-readable status line
    pub fn status_message(&self) -> String {
        format!(
            "Bulkhead: {}/{} concurrent ({:.1}% utilized), {} waiting",
            self.current_concurrent,
            self.max_concurrent,
            self.utilization() * 100.0,
            self.waiting
        )
    }
}

#[derive(Debug)]
struct Capacity {
    max: usize,
    /// Held permits that must be retired instead of returned
    pending_shrink: usize,
}

#[derive(Debug)]
struct Shared {
    name: String,
    semaphore: Arc<Semaphore>,
    capacity: Mutex<Capacity>,
    total_operations: AtomicU64,
    waiting: AtomicUsize,
}

/// Slot held for the lifetime of one operation
pub struct BulkheadPermit {
    permit: Option<OwnedSemaphorePermit>,
    shared: Arc<Shared>,
}

impl fmt::Debug for BulkheadPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkheadPermit").field("bulkhead", &self.shared.name).finish()
    }
}

impl Drop for BulkheadPermit {
    fn drop(&mut self) {
        let mut capacity = self.shared.capacity.lock();
        if capacity.pending_shrink > 0 {
            capacity.pending_shrink -= 1;
            if let Some(permit) = self.permit.take() {
                permit.forget();
            }
        }
    }
}

struct WaitGuard<'a>(&'a AtomicUsize);

impl<'a> WaitGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Concurrency limiter with a runtime-adjustable bound
#[derive(Clone)]
pub struct Bulkhead {
    shared: Arc<Shared>,
}

impl Bulkhead {
    /// Create a bulkhead with `max_concurrent` slots (clamped to at least 1)
    pub fn new<S: Into<String>>(name: S, max_concurrent: usize) -> Self {
        let max = max_concurrent.max(1);
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                semaphore: Arc::new(Semaphore::new(max)),
                capacity: Mutex::new(Capacity { max, pending_shrink: 0 }),
                total_operations: AtomicU64::new(0),
                waiting: AtomicUsize::new(0),
            }),
        }
    }

    /// Wait for a free slot
    ///
    /// Fails only after [`close`](Self::close) was called.
    #[instrument(skip(self), fields(bulkhead = %self.shared.name))]
    pub async fn acquire(&self) -> CommonResult<BulkheadPermit> {
        let permit = {
            let _waiting = WaitGuard::enter(&self.shared.waiting);
            Arc::clone(&self.shared.semaphore)
                .acquire_owned()
                .await
                .map_err(|_| CommonError::task_cancelled(&self.shared.name, "bulkhead closed"))?
        };
        self.shared.total_operations.fetch_add(1, Ordering::Relaxed);
        Ok(BulkheadPermit { permit: Some(permit), shared: Arc::clone(&self.shared) })
    }

    /// Take a free slot without waiting
    pub fn try_acquire(&self) -> Option<BulkheadPermit> {
        let permit = Arc::clone(&self.shared.semaphore).try_acquire_owned().ok()?;
        self.shared.total_operations.fetch_add(1, Ordering::Relaxed);
        Some(BulkheadPermit { permit: Some(permit), shared: Arc::clone(&self.shared) })
    }

    /// Change the number of slots, returning the effective bound
    ///
    /// Values below 1 are clamped to 1. Growing takes effect immediately;
    /// shrinking retires free slots now and busy slots as they are released.
    pub fn resize(&self, max_concurrent: usize) -> usize {
        let target = max_concurrent.max(1);
        let mut capacity = self.shared.capacity.lock();

        if target > capacity.max {
            let grow = target - capacity.max;
            let cancelled = grow.min(capacity.pending_shrink);
            capacity.pending_shrink -= cancelled;
            self.shared.semaphore.add_permits(grow - cancelled);
        } else if target < capacity.max {
            let shrink = capacity.max - target;
            let retired = self.shared.semaphore.forget_permits(shrink);
            capacity.pending_shrink += shrink - retired;
        }

        debug!(
            bulkhead = %self.shared.name,
            from = capacity.max,
            to = target,
            "Bulkhead resized"
        );
        capacity.max = target;
        target
    }

    /// Stop handing out permits; pending and future waits fail
    pub fn close(&self) {
        self.shared.semaphore.close();
    }

    /// Whether [`close`](Self::close) was called
    pub fn is_closed(&self) -> bool {
        self.shared.semaphore.is_closed()
    }

    /// Configured number of slots
    pub fn max_concurrent(&self) -> usize {
        self.shared.capacity.lock().max
    }

    /// Permits currently held
    pub fn current_concurrent(&self) -> usize {
        let capacity = self.shared.capacity.lock();
        let outstanding = capacity.max + capacity.pending_shrink;
        outstanding.saturating_sub(self.shared.semaphore.available_permits())
    }

    /// Snapshot of the bulkhead counters
    pub fn metrics(&self) -> BulkheadMetrics {
        BulkheadMetrics {
            total_operations: self.shared.total_operations.load(Ordering::Acquire),
            current_concurrent: self.current_concurrent(),
            waiting: self.shared.waiting.load(Ordering::Acquire),
            max_concurrent: self.max_concurrent(),
        }
    }
}

impl fmt::Debug for Bulkhead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bulkhead")
            .field("name", &self.shared.name)
            .field("max_concurrent", &self.max_concurrent())
            .field("current_concurrent", &self.current_concurrent())
            .finish()
    }
}
