//! Infrastructure-generation service client.
//!
//! The infrastructure-generation service materializes declarative
//! infracode for composite cross-provider resources (site-to-site VPNs,
//! managed databases). Its lifecycle is: issue a handle (`POST /tr`),
//! initialize the provider environment, generate infracode, plan, apply,
//! and — for operations that stay asynchronous on the provider side —
//! poll the enrichment status until it reports success. Teardown runs the
//! same steps in reverse order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ConnectConfig;
use crate::error::{ConnectError, ConnectResult};

/// A handle identifying one infracode workspace on the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandleInfo {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub description: String,
}

/// Refined status of one enrichment within a handle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub detail: serde_json::Value,
}

impl EnrichmentStatus {
    /// Whether the enrichment has converged.
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }

    /// Whether the enrichment has failed terminally.
    pub fn is_failed(&self) -> bool {
        self.status.eq_ignore_ascii_case("failed")
    }
}

/// Interface to the infrastructure-generation service.
///
/// Implementations must tolerate `issue_handle` being called for a handle
/// that already exists (the retry path): the existing handle is read back
/// instead of re-issued.
#[async_trait]
pub trait InfraGenClient: Send + Sync {
    /// Issue a new handle, or read back an existing one with the same id.
    async fn issue_handle(&self, id: &str, description: &str) -> ConnectResult<HandleInfo>;

    /// Read a handle by id.
    async fn get_handle(&self, id: &str) -> ConnectResult<HandleInfo>;

    /// Initialize the provider environment for an enrichment.
    async fn init_env(&self, id: &str, enrichment: &str, providers: &[String]) -> ConnectResult<()>;

    /// Generate infracode from the given specification.
    async fn generate_infracode(
        &self,
        id: &str,
        enrichment: &str,
        spec: serde_json::Value,
    ) -> ConnectResult<()>;

    /// Dry-run the generated infracode.
    async fn plan(&self, id: &str, enrichment: &str) -> ConnectResult<()>;

    /// Apply the generated infracode. Returns once the apply is accepted;
    /// provider-side convergence is observed via [`Self::status`].
    async fn apply(&self, id: &str, enrichment: &str) -> ConnectResult<()>;

    /// Cheap status read for an enrichment (`detail=refined`).
    async fn status(&self, id: &str, enrichment: &str) -> ConnectResult<EnrichmentStatus>;

    /// Destroy the applied infrastructure.
    async fn destroy(&self, id: &str, enrichment: &str) -> ConnectResult<()>;

    /// Remove the provider environment.
    async fn delete_env(&self, id: &str, enrichment: &str) -> ConnectResult<()>;

    /// Delete the handle itself.
    async fn delete_handle(&self, id: &str) -> ConnectResult<()>;
}

/// HTTP implementation of [`InfraGenClient`].
pub struct HttpInfraGenClient {
    client: reqwest::Client,
    config: ConnectConfig,
}

impl HttpInfraGenClient {
    pub fn new(config: ConnectConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    async fn post_empty(&self, url: String) -> ConnectResult<()> {
        let resp = self
            .client
            .post(&url)
            .timeout(self.config.mutation_timeout())
            .send()
            .await?;
        check(resp).await.map(|_| ())
    }

    async fn delete_empty(&self, url: String) -> ConnectResult<()> {
        let resp = self
            .client
            .delete(&url)
            .timeout(self.config.mutation_timeout())
            .send()
            .await?;
        check(resp).await.map(|_| ())
    }
}

async fn check(resp: reqwest::Response) -> ConnectResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        let body = resp.text().await.unwrap_or_default();
        Err(ConnectError::from_response(status, body))
    }
}

#[async_trait]
impl InfraGenClient for HttpInfraGenClient {
    async fn issue_handle(&self, id: &str, description: &str) -> ConnectResult<HandleInfo> {
        #[derive(Serialize)]
        struct IssueRequest<'a> {
            id: &'a str,
            description: &'a str,
        }
        let url = format!("{}/tr", self.config.endpoint);
        let resp = self
            .client
            .post(&url)
            .timeout(self.config.request_timeout())
            .json(&IssueRequest { id, description })
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::CONFLICT {
            // Handle already exists — the retry path reads it back.
            debug!(%id, "handle already issued, reading back");
            return self.get_handle(id).await;
        }
        let resp = check(resp).await?;
        resp.json::<HandleInfo>()
            .await
            .map_err(|e| ConnectError::Decode(e.to_string()))
    }

    async fn get_handle(&self, id: &str) -> ConnectResult<HandleInfo> {
        let url = format!("{}/tr/{}", self.config.endpoint, id);
        let resp = self
            .client
            .get(&url)
            .timeout(self.config.request_timeout())
            .send()
            .await?;
        let resp = check(resp).await?;
        resp.json::<HandleInfo>()
            .await
            .map_err(|e| ConnectError::Decode(e.to_string()))
    }

    async fn init_env(
        &self,
        id: &str,
        enrichment: &str,
        providers: &[String],
    ) -> ConnectResult<()> {
        let url = format!(
            "{}/tr/{}/{}/env?providers={}",
            self.config.endpoint,
            id,
            enrichment,
            providers.join(",")
        );
        self.post_empty(url).await
    }

    async fn generate_infracode(
        &self,
        id: &str,
        enrichment: &str,
        spec: serde_json::Value,
    ) -> ConnectResult<()> {
        let url = format!(
            "{}/tr/{}/{}/infracode",
            self.config.endpoint, id, enrichment
        );
        let resp = self
            .client
            .post(&url)
            .timeout(self.config.mutation_timeout())
            .json(&spec)
            .send()
            .await?;
        check(resp).await.map(|_| ())
    }

    async fn plan(&self, id: &str, enrichment: &str) -> ConnectResult<()> {
        self.post_empty(format!(
            "{}/tr/{}/{}/plan",
            self.config.endpoint, id, enrichment
        ))
        .await
    }

    async fn apply(&self, id: &str, enrichment: &str) -> ConnectResult<()> {
        self.post_empty(format!(
            "{}/tr/{}/{}",
            self.config.endpoint, id, enrichment
        ))
        .await
    }

    async fn status(&self, id: &str, enrichment: &str) -> ConnectResult<EnrichmentStatus> {
        let url = format!(
            "{}/tr/{}/{}?detail=refined",
            self.config.endpoint, id, enrichment
        );
        let resp = self
            .client
            .get(&url)
            .timeout(self.config.request_timeout())
            .send()
            .await?;
        let resp = check(resp).await?;
        resp.json::<EnrichmentStatus>()
            .await
            .map_err(|e| ConnectError::Decode(e.to_string()))
    }

    async fn destroy(&self, id: &str, enrichment: &str) -> ConnectResult<()> {
        self.delete_empty(format!(
            "{}/tr/{}/{}",
            self.config.endpoint, id, enrichment
        ))
        .await
    }

    async fn delete_env(&self, id: &str, enrichment: &str) -> ConnectResult<()> {
        self.delete_empty(format!(
            "{}/tr/{}/{}/env",
            self.config.endpoint, id, enrichment
        ))
        .await
    }

    async fn delete_handle(&self, id: &str) -> ConnectResult<()> {
        self.delete_empty(format!("{}/tr/{}", self.config.endpoint, id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrichment_status_success_detection() {
        let s: EnrichmentStatus =
            serde_json::from_str(r#"{ "status": "Success", "detail": {} }"#).unwrap();
        assert!(s.is_success());
        assert!(!s.is_failed());

        let s: EnrichmentStatus = serde_json::from_str(r#"{ "status": "failed" }"#).unwrap();
        assert!(s.is_failed());
    }

    #[test]
    fn handle_info_tolerates_missing_fields() {
        let h: HandleInfo = serde_json::from_str(r#"{ "id": "tr-01" }"#).unwrap();
        assert_eq!(h.id, "tr-01");
        assert!(h.status.is_empty());
    }
}
