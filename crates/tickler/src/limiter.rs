use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// One admitted job. Dropping the slot releases it.
pub(crate) type Slot = OwnedSemaphorePermit;

/// Counting admission gate with a fixed ceiling.
///
/// The dispatch loop only ever acquires without waiting; a full gate means
/// "stop dispatching this round", never "block".
#[derive(Debug)]
pub(crate) struct ConcurrencyLimiter {
    permits: Arc<Semaphore>,
    limit: usize,
}

impl ConcurrencyLimiter {
    pub fn new(limit: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Take a slot if one is free.
    pub fn try_acquire(&self) -> Option<Slot> {
        Arc::clone(&self.permits).try_acquire_owned().ok()
    }

    pub fn in_flight(&self) -> usize {
        self.limit - self.permits.available_permits()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_up_to_limit() {
        let limiter = ConcurrencyLimiter::new(2);
        let a = limiter.try_acquire();
        let b = limiter.try_acquire();
        assert!(a.is_some() && b.is_some());
        assert!(limiter.try_acquire().is_none());
        assert_eq!(limiter.in_flight(), 2);

        drop(a);
        assert_eq!(limiter.in_flight(), 1);
        assert!(limiter.try_acquire().is_some());
    }

    #[test]
    fn limit_reported() {
        let limiter = ConcurrencyLimiter::new(5);
        assert_eq!(limiter.limit(), 5);
        assert_eq!(limiter.in_flight(), 0);
    }
}
