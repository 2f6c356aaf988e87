//! Driver for the infrastructure-generation service lifecycle.
//!
//! Composite resources (VPNs, managed databases) are materialized as
//! declarative infracode: issue a handle, initialize the provider
//! environment, generate the infracode, plan, apply, and — where the
//! provider side stays asynchronous — poll the refined enrichment status
//! until it converges. Teardown runs the same steps in reverse.
//!
//! Handles are issued under the resource's uid, so a retried workflow
//! reads back its existing handle instead of re-issuing one.

use std::sync::Arc;

use tracing::{debug, info, warn};

use stratus_connect::{EnrichmentStatus, HandleInfo, InfraGenClient};

use crate::backoff::{PollConfig, poll_until};
use crate::error::{ProvisionResult, collaborator_failure};

pub struct InfraDriver {
    client: Arc<dyn InfraGenClient>,
}

impl InfraDriver {
    pub fn new(client: Arc<dyn InfraGenClient>) -> Self {
        Self { client }
    }

    /// Issue (or read back) the handle for a workflow.
    pub async fn ensure_handle(&self, id: &str, description: &str) -> ProvisionResult<HandleInfo> {
        let handle = self
            .client
            .issue_handle(id, description)
            .await
            .map_err(|e| collaborator_failure("issue handle", id, e))?;
        debug!(handle = %handle.id, "infracode handle ready");
        Ok(handle)
    }

    /// Run init-env, generate, plan, and apply for one enrichment.
    pub async fn build(
        &self,
        handle: &str,
        enrichment: &str,
        providers: &[String],
        spec: serde_json::Value,
    ) -> ProvisionResult<()> {
        self.client
            .init_env(handle, enrichment, providers)
            .await
            .map_err(|e| collaborator_failure("init env for", handle, e))?;
        self.client
            .generate_infracode(handle, enrichment, spec)
            .await
            .map_err(|e| collaborator_failure("generate infracode for", handle, e))?;
        self.client
            .plan(handle, enrichment)
            .await
            .map_err(|e| collaborator_failure("plan", handle, e))?;
        self.client
            .apply(handle, enrichment)
            .await
            .map_err(|e| collaborator_failure("apply", handle, e))?;
        info!(%handle, %enrichment, "infracode applied");
        Ok(())
    }

    /// Poll the refined status under the adaptive backoff until it reports
    /// success. A terminal `failed` status errors out; transient status-read
    /// failures are logged and retried within the deadline.
    pub async fn await_success(
        &self,
        handle: &str,
        enrichment: &str,
        config: &PollConfig,
    ) -> ProvisionResult<EnrichmentStatus> {
        let what = format!("{enrichment} enrichment on {handle}");
        poll_until(config, &what, move || {
            let client = self.client.clone();
            async move {
                match client.status(handle, enrichment).await {
                    Ok(s) if s.is_success() => Ok(Some(s)),
                    Ok(s) if s.is_failed() => Err(collaborator_failure(
                        "apply",
                        handle,
                        format!("enrichment reported failed: {}", s.detail),
                    )),
                    Ok(s) => {
                        debug!(%handle, %enrichment, status = %s.status, "enrichment pending");
                        Ok(None)
                    }
                    Err(e) => {
                        warn!(%handle, %enrichment, error = %e, "status read failed, will retry");
                        Ok(None)
                    }
                }
            }
        })
        .await
    }

    /// Destroy the applied infrastructure, remove the provider environment,
    /// and delete the handle, in that order.
    pub async fn teardown(&self, handle: &str, enrichment: &str) -> ProvisionResult<()> {
        self.client
            .destroy(handle, enrichment)
            .await
            .map_err(|e| collaborator_failure("destroy", handle, e))?;
        self.client
            .delete_env(handle, enrichment)
            .await
            .map_err(|e| collaborator_failure("delete env for", handle, e))?;
        self.client
            .delete_handle(handle)
            .await
            .map_err(|e| collaborator_failure("delete handle", handle, e))?;
        info!(%handle, %enrichment, "infracode torn down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use stratus_connect::{ConnectError, ConnectResult};

    use crate::error::ProvisionError;

    /// Scripted fake: records the call sequence and serves a fixed list of
    /// status responses.
    #[derive(Default)]
    struct FakeInfraGen {
        calls: StdMutex<Vec<String>>,
        statuses: StdMutex<Vec<EnrichmentStatus>>,
        fail_apply: bool,
    }

    impl FakeInfraGen {
        fn with_statuses(statuses: Vec<&str>) -> Self {
            Self {
                statuses: StdMutex::new(
                    statuses
                        .into_iter()
                        .map(|s| EnrichmentStatus {
                            status: s.to_string(),
                            detail: serde_json::Value::Null,
                        })
                        .collect(),
                ),
                ..Default::default()
            }
        }

        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }
    }

    #[async_trait]
    impl InfraGenClient for FakeInfraGen {
        async fn issue_handle(&self, id: &str, _description: &str) -> ConnectResult<HandleInfo> {
            self.record(format!("issue {id}"));
            Ok(HandleInfo {
                id: id.to_string(),
                ..Default::default()
            })
        }

        async fn get_handle(&self, id: &str) -> ConnectResult<HandleInfo> {
            self.record(format!("get {id}"));
            Ok(HandleInfo {
                id: id.to_string(),
                ..Default::default()
            })
        }

        async fn init_env(&self, _id: &str, _e: &str, _p: &[String]) -> ConnectResult<()> {
            self.record("init_env");
            Ok(())
        }

        async fn generate_infracode(
            &self,
            _id: &str,
            _e: &str,
            _spec: serde_json::Value,
        ) -> ConnectResult<()> {
            self.record("infracode");
            Ok(())
        }

        async fn plan(&self, _id: &str, _e: &str) -> ConnectResult<()> {
            self.record("plan");
            Ok(())
        }

        async fn apply(&self, _id: &str, _e: &str) -> ConnectResult<()> {
            self.record("apply");
            if self.fail_apply {
                return Err(ConnectError::Api("cidr overlap between sites".into()));
            }
            Ok(())
        }

        async fn status(&self, _id: &str, _e: &str) -> ConnectResult<EnrichmentStatus> {
            self.record("status");
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.is_empty() {
                return Ok(EnrichmentStatus {
                    status: "pending".into(),
                    detail: serde_json::Value::Null,
                });
            }
            Ok(statuses.remove(0))
        }

        async fn destroy(&self, _id: &str, _e: &str) -> ConnectResult<()> {
            self.record("destroy");
            Ok(())
        }

        async fn delete_env(&self, _id: &str, _e: &str) -> ConnectResult<()> {
            self.record("delete_env");
            Ok(())
        }

        async fn delete_handle(&self, id: &str) -> ConnectResult<()> {
            self.record(format!("delete_handle {id}"));
            Ok(())
        }
    }

    fn config() -> PollConfig {
        PollConfig {
            expected: Duration::from_secs(60),
            deadline: Duration::from_secs(600),
        }
    }

    #[tokio::test]
    async fn build_runs_the_lifecycle_in_order() {
        let client = Arc::new(FakeInfraGen::default());
        let driver = InfraDriver::new(client.clone());

        driver.ensure_handle("u1", "vpn for ns1").await.unwrap();
        driver
            .build("u1", "vpn", &["aws".into(), "gcp".into()], serde_json::json!({}))
            .await
            .unwrap();

        let calls = client.calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["issue u1", "init_env", "infracode", "plan", "apply"]);
    }

    #[tokio::test(start_paused = true)]
    async fn await_success_polls_until_converged() {
        let client = Arc::new(FakeInfraGen::with_statuses(vec![
            "pending", "pending", "Success",
        ]));
        let driver = InfraDriver::new(client.clone());

        let status = driver.await_success("u1", "vpn", &config()).await.unwrap();
        assert!(status.is_success());
        assert_eq!(
            client.calls.lock().unwrap().iter().filter(|c| *c == "status").count(),
            3
        );
    }

    #[tokio::test(start_paused = true)]
    async fn await_success_errors_on_terminal_failure() {
        let client = Arc::new(FakeInfraGen::with_statuses(vec!["pending", "failed"]));
        let driver = InfraDriver::new(client);

        let err = driver.await_success("u1", "vpn", &config()).await.unwrap_err();
        assert!(err.to_string().contains("apply u1 failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn await_success_times_out_on_endless_pending() {
        let client = Arc::new(FakeInfraGen::default());
        let driver = InfraDriver::new(client);

        let err = driver.await_success("u1", "vpn", &config()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::DeadlineExceeded(_)));
    }

    #[tokio::test]
    async fn apply_failure_keeps_the_raw_detail() {
        let client = Arc::new(FakeInfraGen {
            fail_apply: true,
            ..Default::default()
        });
        let driver = InfraDriver::new(client);

        let err = driver
            .build("u1", "vpn", &["aws".into()], serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("apply u1 failed"));
        assert!(err.to_string().contains("cidr overlap"));
    }

    #[tokio::test]
    async fn teardown_runs_in_reverse_order() {
        let client = Arc::new(FakeInfraGen::default());
        let driver = InfraDriver::new(client.clone());

        driver.teardown("u1", "vpn").await.unwrap();
        let calls = client.calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["destroy", "delete_env", "delete_handle u1"]);
    }
}
