use std::sync::Arc;

use tokio::sync::{Semaphore, SemaphorePermit};

/// Configurable-max in-flight order-submission limiter. `try_acquire`
/// returns `None` (not an error) when the limiter is saturated, matching the
/// boolean-acquire contract in the data model.
#[derive(Clone)]
pub struct InFlightLimiter {
    semaphore: Arc<Semaphore>,
}

impl InFlightLimiter {
    pub fn new(max: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max.max(1))),
        }
    }

    pub fn try_acquire(&self) -> Option<SemaphorePermit<'_>> {
        self.semaphore.try_acquire().ok()
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limiter_respects_max() {
        let limiter = InFlightLimiter::new(2);
        let p1 = limiter.try_acquire();
        let p2 = limiter.try_acquire();
        let p3 = limiter.try_acquire();
        assert!(p1.is_some());
        assert!(p2.is_some());
        assert!(p3.is_none(), "third acquire should fail at max=2");
    }

    #[test]
    fn test_limiter_releases_on_drop() {
        let limiter = InFlightLimiter::new(1);
        {
            let _p = limiter.try_acquire().unwrap();
            assert_eq!(limiter.available(), 0);
        }
        assert_eq!(limiter.available(), 1);
    }
}
