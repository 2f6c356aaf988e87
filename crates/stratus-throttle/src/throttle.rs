//! Process-wide concurrency cap and stagger jitter.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::debug;

use crate::limits::RateLimitConfig;

/// Caps the total number of simultaneous provider-connection-processing
/// tasks across *all* providers combined, so one provider's generous
/// per-provider limits cannot starve the others during a sweep.
#[derive(Clone)]
pub struct GlobalThrottle {
    permits: Arc<Semaphore>,
    capacity: usize,
}

/// RAII permit; dropping it releases the slot.
pub struct ThrottlePermit {
    _permit: OwnedSemaphorePermit,
}

impl GlobalThrottle {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_parallel)),
            capacity: max_parallel,
        }
    }

    /// Wait for a slot.
    pub async fn acquire(&self) -> ThrottlePermit {
        // The semaphore is owned by this struct and never closed.
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .expect("throttle semaphore closed");
        debug!(available = self.permits.available_permits(), "throttle permit acquired");
        ThrottlePermit { _permit: permit }
    }

    /// Take a slot without waiting, if one is free.
    pub fn try_acquire(&self) -> Option<ThrottlePermit> {
        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => Some(ThrottlePermit { _permit: permit }),
            Err(TryAcquireError::NoPermits) => None,
            Err(TryAcquireError::Closed) => None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Uniform random delay within the provider's configured stagger range,
/// applied before a unit of work's first external call so bulk sweeps
/// don't land on the provider all at once.
pub fn stagger_delay(cfg: &RateLimitConfig) -> Duration {
    let ms = rand::thread_rng().gen_range(cfg.stagger_min_ms..=cfg.stagger_max_ms);
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn throttle_bounds_concurrency() {
        let throttle = GlobalThrottle::new(3);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let throttle = throttle.clone();
            let current = current.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _permit = throttle.acquire().await;
                let n = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(n, Ordering::SeqCst);
                tokio::task::yield_now().await;
                current.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn try_acquire_refuses_when_exhausted() {
        let throttle = GlobalThrottle::new(1);
        let held = throttle.try_acquire().expect("first slot free");
        assert!(throttle.try_acquire().is_none());
        drop(held);
        assert!(throttle.try_acquire().is_some());
    }

    #[test]
    fn stagger_stays_within_configured_range() {
        let cfg = RateLimitConfig {
            max_concurrent_regions: 1,
            max_concurrent_per_region: 1,
            stagger_min_ms: 100,
            stagger_max_ms: 500,
        };
        for _ in 0..100 {
            let d = stagger_delay(&cfg);
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(500));
        }
    }

    #[test]
    fn zero_width_stagger_range() {
        let cfg = RateLimitConfig {
            stagger_min_ms: 250,
            stagger_max_ms: 250,
            ..RateLimitConfig::default()
        };
        assert_eq!(stagger_delay(&cfg), Duration::from_millis(250));
    }
}
