use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::config::PoolConfig;
use crate::error::Rejection;

/// Caps the number of simultaneous outbound fetches. Requests beyond the cap
/// wait in a bounded queue; once that is full too they are turned away.
pub struct FetchPool {
    slots: Arc<Semaphore>,
    waiting: AtomicUsize,
    max_queued: usize,
}

#[derive(Debug)]
pub struct PoolPermit {
    _permit: OwnedSemaphorePermit,
}

struct QueueSlot<'a>(&'a AtomicUsize);

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FetchPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            waiting: AtomicUsize::new(0),
            max_queued: config.max_queued,
        }
    }

    pub async fn acquire(&self) -> Result<PoolPermit, Rejection> {
        match self.slots.clone().try_acquire_owned() {
            Ok(permit) => return Ok(PoolPermit { _permit: permit }),
            Err(TryAcquireError::Closed) => return Err(Rejection::Overloaded),
            Err(TryAcquireError::NoPermits) => {}
        }

        self.waiting
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_queued).then_some(n + 1)
            })
            .map_err(|_| Rejection::Overloaded)?;
        let _slot = QueueSlot(&self.waiting);

        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Rejection::Overloaded)?;
        Ok(PoolPermit { _permit: permit })
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn queued(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }
}
