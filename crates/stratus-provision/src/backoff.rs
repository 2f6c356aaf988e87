//! Adaptive backoff for polling long-running external operations.
//!
//! The wait between status reads follows a logistic curve over elapsed
//! time versus the expected completion duration: waits start near the
//! maximum (completion is unlikely early, don't hammer the service) and
//! shrink toward the minimum as the expected completion approaches and
//! passes (poll tightly once it's due). Once elapsed time exceeds the
//! expected duration the wait collapses to the minimum.
//!
//! `backoff_wait` is a pure function; the schedule is exercised in tests
//! under tokio's paused clock, without real sleeps.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::{ProvisionError, ProvisionResult};

pub const MIN_WAIT: Duration = Duration::from_secs(10);
pub const MAX_WAIT: Duration = Duration::from_secs(120);

const STEEPNESS: f64 = 16.0;
/// Inflection point, as a fraction of the expected duration.
const INFLECTION: f64 = 0.65;

/// Compute the wait before the next poll, within `[MIN_WAIT, MAX_WAIT]`.
pub fn backoff_wait(elapsed: Duration, expected: Duration) -> Duration {
    backoff_wait_in(elapsed, expected, MIN_WAIT, MAX_WAIT)
}

/// [`backoff_wait`] with explicit bounds.
pub fn backoff_wait_in(
    elapsed: Duration,
    expected: Duration,
    min: Duration,
    max: Duration,
) -> Duration {
    if expected.is_zero() || elapsed >= expected {
        return min;
    }
    let progress = elapsed.as_secs_f64() / expected.as_secs_f64();
    let sigmoid = 1.0 / (1.0 + (-STEEPNESS * (progress - INFLECTION)).exp());
    let wait = min.as_secs_f64() + (max.as_secs_f64() - min.as_secs_f64()) * (1.0 - sigmoid);
    Duration::from_secs_f64(wait.clamp(min.as_secs_f64(), max.as_secs_f64()))
}

/// Bounds for one adaptive-backoff polling loop.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// How long the external operation is expected to take.
    pub expected: Duration,
    /// Absolute deadline for the whole loop.
    pub deadline: Duration,
}

/// Repeatedly run `probe` under the adaptive-backoff schedule until it
/// yields a value, errors, or the deadline passes.
///
/// `Ok(None)` means "not done yet, poll again"; an `Err` from the probe
/// is terminal and propagates unchanged. On deadline the loop returns
/// [`ProvisionError::DeadlineExceeded`] and whatever state the probe last
/// observed is left as-is.
pub async fn poll_until<T, F, Fut>(
    config: &PollConfig,
    what: &str,
    mut probe: F,
) -> ProvisionResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProvisionResult<Option<T>>>,
{
    let started = tokio::time::Instant::now();
    loop {
        if let Some(value) = probe().await? {
            return Ok(value);
        }
        let elapsed = started.elapsed();
        if elapsed >= config.deadline {
            return Err(ProvisionError::DeadlineExceeded(format!(
                "{what}: not complete after {}s",
                elapsed.as_secs()
            )));
        }
        let wait = backoff_wait(elapsed, config.expected).min(config.deadline - elapsed);
        debug!(%what, elapsed_s = elapsed.as_secs(), wait_s = wait.as_secs(), "poll pending");
        tokio::time::sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn s(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn wait_is_near_max_at_start() {
        let wait = backoff_wait(Duration::ZERO, s(600));
        assert!(MAX_WAIT - wait < Duration::from_secs(1), "got {wait:?}");
    }

    #[test]
    fn wait_is_min_at_and_after_expected() {
        let expected = s(600);
        assert_eq!(backoff_wait(expected, expected), MIN_WAIT);
        assert_eq!(backoff_wait(s(601), expected), MIN_WAIT);
        assert_eq!(backoff_wait(s(7200), expected), MIN_WAIT);
    }

    #[test]
    fn wait_stays_within_bounds_and_never_increases() {
        let expected = s(600);
        let mut previous = MAX_WAIT;
        for elapsed in (0..=600).step_by(10) {
            let wait = backoff_wait(s(elapsed), expected);
            assert!(wait >= MIN_WAIT && wait <= MAX_WAIT, "{elapsed}s -> {wait:?}");
            assert!(wait <= previous, "{elapsed}s -> {wait:?} > {previous:?}");
            previous = wait;
        }
    }

    #[test]
    fn wait_drops_through_the_inflection() {
        let expected = s(600);
        let early = backoff_wait(s(60), expected);
        let late = backoff_wait(s(500), expected);
        assert!(early > s(100), "early wait {early:?}");
        assert!(late < s(30), "late wait {late:?}");
    }

    #[test]
    fn zero_expected_collapses_to_min() {
        assert_eq!(backoff_wait(Duration::ZERO, Duration::ZERO), MIN_WAIT);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_until_returns_once_the_probe_yields() {
        let config = PollConfig {
            expected: s(60),
            deadline: s(3600),
        };
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let result = poll_until(&config, "probe", move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok((n >= 4).then_some(n))
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 4);
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_until_hits_the_deadline() {
        let config = PollConfig {
            expected: s(60),
            deadline: s(120),
        };
        let started = tokio::time::Instant::now();
        let result: ProvisionResult<()> =
            poll_until(&config, "never-done", || async { Ok(None) }).await;
        assert!(matches!(result, Err(ProvisionError::DeadlineExceeded(_))));
        // The last sleep is capped so the loop ends at the deadline.
        let elapsed = started.elapsed();
        assert!(elapsed >= s(120) && elapsed < s(121), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn poll_until_propagates_probe_errors_unchanged() {
        let config = PollConfig {
            expected: s(60),
            deadline: s(3600),
        };
        let result: ProvisionResult<()> = poll_until(&config, "broken", || async {
            Err(ProvisionError::Collaborator(
                "apply vpn-1 failed: quota exceeded".into(),
            ))
        })
        .await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }
}
