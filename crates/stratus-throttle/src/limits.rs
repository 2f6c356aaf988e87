//! Per-provider rate-limit configuration.
//!
//! Read-only process-wide configuration with no lifecycle beyond process
//! start. Lookup is pure and total: unknown providers fall back to a
//! conservative default, never an error.

use serde::{Deserialize, Serialize};

/// Concurrency caps and stagger range for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Max regions of this provider scanned in parallel.
    pub max_concurrent_regions: u32,
    /// Max parallel VM/registration operations within one region.
    pub max_concurrent_per_region: u32,
    /// Lower bound of the randomized stagger delay, milliseconds.
    pub stagger_min_ms: u64,
    /// Upper bound of the randomized stagger delay, milliseconds.
    pub stagger_max_ms: u64,
}

impl Default for RateLimitConfig {
    /// Conservative fallback for providers without a named entry.
    fn default() -> Self {
        Self {
            max_concurrent_regions: 2,
            max_concurrent_per_region: 3,
            stagger_min_ms: 500,
            stagger_max_ms: 2000,
        }
    }
}

/// Look up the limits for a provider, case-insensitively.
pub fn rate_limit_config(provider: &str) -> RateLimitConfig {
    match provider.to_lowercase().as_str() {
        "aws" => RateLimitConfig {
            max_concurrent_regions: 8,
            max_concurrent_per_region: 10,
            stagger_min_ms: 100,
            stagger_max_ms: 500,
        },
        "azure" => RateLimitConfig {
            max_concurrent_regions: 5,
            max_concurrent_per_region: 6,
            stagger_min_ms: 200,
            stagger_max_ms: 800,
        },
        "gcp" => RateLimitConfig {
            max_concurrent_regions: 6,
            max_concurrent_per_region: 8,
            stagger_min_ms: 150,
            stagger_max_ms: 600,
        },
        "alibaba" => RateLimitConfig {
            max_concurrent_regions: 4,
            max_concurrent_per_region: 5,
            stagger_min_ms: 300,
            stagger_max_ms: 1000,
        },
        "tencent" => RateLimitConfig {
            max_concurrent_regions: 4,
            max_concurrent_per_region: 5,
            stagger_min_ms: 300,
            stagger_max_ms: 1000,
        },
        "ibm" => RateLimitConfig {
            max_concurrent_regions: 3,
            max_concurrent_per_region: 4,
            stagger_min_ms: 300,
            stagger_max_ms: 1200,
        },
        "ncp" | "nhn" | "kt" => RateLimitConfig {
            max_concurrent_regions: 2,
            max_concurrent_per_region: 3,
            stagger_min_ms: 500,
            stagger_max_ms: 1500,
        },
        "openstack" => RateLimitConfig {
            max_concurrent_regions: 1,
            max_concurrent_per_region: 2,
            stagger_min_ms: 1000,
            stagger_max_ms: 3000,
        },
        _ => RateLimitConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(rate_limit_config("AWS"), rate_limit_config("aws"));
        assert_eq!(rate_limit_config("OpenStack"), rate_limit_config("openstack"));
    }

    #[test]
    fn unknown_provider_gets_the_default() {
        assert_eq!(rate_limit_config("garage-cloud"), RateLimitConfig::default());
        assert_eq!(rate_limit_config(""), RateLimitConfig::default());
    }

    #[test]
    fn named_providers_have_sane_ranges() {
        for provider in ["aws", "azure", "gcp", "alibaba", "tencent", "ibm", "ncp", "nhn", "kt", "openstack"] {
            let cfg = rate_limit_config(provider);
            assert!(cfg.max_concurrent_regions >= 1);
            assert!(cfg.max_concurrent_per_region >= 1);
            assert!(cfg.stagger_min_ms <= cfg.stagger_max_ms);
        }
    }
}
