//! Collaborator endpoint configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for one collaborator endpoint.
///
/// Three timeout classes cover the range of calls the engine makes:
/// a very short probe timeout for health checks, a default timeout for
/// ordinary CRUD calls, and a long timeout for provider-side mutations
/// that can take many minutes (cluster creation and the like).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectConfig {
    /// Base URL of the service, e.g. `http://localhost:1024/provider`.
    pub endpoint: String,
    /// Health-probe timeout in seconds.
    pub probe_timeout_secs: u64,
    /// Default per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Timeout for long-running mutation calls in seconds.
    pub mutation_timeout_secs: u64,
}

impl ConnectConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            probe_timeout_secs: 2,
            request_timeout_secs: 90,
            mutation_timeout_secs: 20 * 60,
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn mutation_timeout(&self) -> Duration {
        Duration::from_secs(self.mutation_timeout_secs)
    }
}
