//! The hold/continue/withdraw gate.
//!
//! A creation workflow started with the hold option parks after its bare
//! record is written and before the expensive provider call, waiting for
//! an operator signal. Signals live in an in-process map keyed by
//! resource key; they are not persisted, so a restart silently drops
//! pending holds (an accepted limitation).
//!
//! The coordinator is an injectable service, instantiated once per
//! process and passed by reference. Tests instantiate isolated ones.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};

/// Control-plane-only tri-state for one held creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldSignal {
    Holding,
    Continue,
    Withdraw,
}

/// What a waiting workflow should do once the hold resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldOutcome {
    Continue,
    Withdraw,
}

/// Tracks held creations and delivers operator signals to them.
pub struct ProvisioningCoordinator {
    holds: Mutex<HashMap<String, HoldSignal>>,
    poll_interval: Duration,
}

impl Default for ProvisioningCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProvisioningCoordinator {
    pub fn new() -> Self {
        Self {
            holds: Mutex::new(HashMap::new()),
            poll_interval: Duration::from_secs(5),
        }
    }

    /// Override the signal polling interval (tests use a short one).
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            holds: Mutex::new(HashMap::new()),
            poll_interval,
        }
    }

    /// Register a hold for the given resource key.
    pub async fn hold(&self, key: &str) {
        self.holds
            .lock()
            .await
            .insert(key.to_string(), HoldSignal::Holding);
        info!(%key, "creation holding, awaiting signal");
    }

    /// Deliver an operator signal. Returns false when nothing is holding
    /// under that key (already consumed, or never held).
    pub async fn signal(&self, key: &str, signal: HoldSignal) -> bool {
        let mut holds = self.holds.lock().await;
        match holds.get_mut(key) {
            Some(entry) => {
                *entry = signal;
                debug!(%key, ?signal, "hold signaled");
                true
            }
            None => false,
        }
    }

    /// Whether a hold is currently registered under the key.
    pub async fn holding(&self, key: &str) -> bool {
        self.holds.lock().await.contains_key(key)
    }

    /// Drop a hold entry without resolving it (cleanup path).
    pub async fn release(&self, key: &str) {
        self.holds.lock().await.remove(key);
    }

    /// Poll the signal map until the hold resolves. A vanished entry is
    /// treated as continue. The consumed entry is removed; visibility of a
    /// signal is only guaranteed within one polling interval.
    pub async fn wait(&self, key: &str) -> HoldOutcome {
        loop {
            {
                let mut holds = self.holds.lock().await;
                match holds.get(key) {
                    None => return HoldOutcome::Continue,
                    Some(HoldSignal::Continue) => {
                        holds.remove(key);
                        return HoldOutcome::Continue;
                    }
                    Some(HoldSignal::Withdraw) => {
                        holds.remove(key);
                        return HoldOutcome::Withdraw;
                    }
                    Some(HoldSignal::Holding) => {}
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
