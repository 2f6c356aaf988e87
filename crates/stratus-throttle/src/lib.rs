//! stratus-throttle — provider-aware concurrency limits.
//!
//! Cloud providers throttle aggressively and unevenly: what AWS shrugs
//! off gets an OpenStack deployment rate-limited for minutes. This crate
//! carries the per-provider limits table, a process-wide cap on
//! simultaneous provider-connection processing, and the stagger jitter
//! applied before a unit of work's first external call.
//!
//! The limits are **advisory caps on concurrency, not hard scheduling
//! guarantees**: there is no token bucket here. Callers spawn no more
//! than the configured number of concurrent units and apply the stagger
//! delay themselves.

pub mod limits;
pub mod throttle;

pub use limits::{RateLimitConfig, rate_limit_config};
pub use throttle::{GlobalThrottle, ThrottlePermit, stagger_delay};
