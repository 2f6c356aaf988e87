//! Kubernetes cluster creation workflow.
//!
//! State machine: `absent -> configuring (-> holding -> continuing |
//! withdrawn) -> provisioned | failed`. The bare record is written before
//! any external call so a crash mid-creation still leaves a discoverable,
//! deletable record; any later failure triggers a deferred cleanup that
//! deletes the bare record and returns the original error unchanged.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use stratus_connect::ProviderClient;
use stratus_label::LabelIndex;
use stratus_state::{
    NodeGroup, ResourcePayload, ResourceRecord, ResourceStore, ResourceType, resource_key, status,
};
use stratus_throttle::{GlobalThrottle, rate_limit_config, stagger_delay};

use crate::coordinator::{HoldOutcome, ProvisioningCoordinator};
use crate::error::{ProvisionError, ProvisionResult, collaborator_failure};
use crate::resolve::{provider_of, resolve_csp_name};

/// Request to create one managed Kubernetes cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClusterRequest {
    pub name: String,
    pub connection_name: String,
    #[serde(default)]
    pub description: String,
    pub version: String,
    pub node_groups: Vec<NodeGroup>,
}

/// Caller-selected workflow behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateOptions {
    /// Park after the bare record is written, awaiting an operator signal.
    pub hold: bool,
    /// Read back a partially built record instead of failing Conflict.
    pub retry: bool,
}

/// Drives cluster creation against the provider-abstraction service.
pub struct ClusterEngine {
    store: ResourceStore,
    labels: LabelIndex,
    provider: Arc<dyn ProviderClient>,
    coordinator: Arc<ProvisioningCoordinator>,
    throttle: GlobalThrottle,
}

impl ClusterEngine {
    pub fn new(
        store: ResourceStore,
        labels: LabelIndex,
        provider: Arc<dyn ProviderClient>,
        coordinator: Arc<ProvisioningCoordinator>,
        throttle: GlobalThrottle,
    ) -> Self {
        Self {
            store,
            labels,
            provider,
            coordinator,
            throttle,
        }
    }

    pub async fn create(
        &self,
        ns: &str,
        req: CreateClusterRequest,
        opts: CreateOptions,
    ) -> ProvisionResult<ResourceRecord> {
        validate_request(&req)?;
        let ty = ResourceType::K8sCluster;
        let id = req.name.clone();

        let rec = if self.store.exists(ns, ty, &id)? {
            if !opts.retry {
                return Err(ProvisionError::Conflict(format!("{ty} {id}")));
            }
            info!(%ns, %id, "retrying over a partially built record");
            self.store.get(ns, ty, &id).await?
        } else {
            let mut rec = ResourceRecord::new(
                &id,
                &req.name,
                &req.connection_name,
                ResourcePayload::K8sCluster {
                    version: req.version.clone(),
                    node_groups: req.node_groups.clone(),
                },
            );
            rec.description = req.description.clone();
            self.store.create(ns, &rec)?;
            let key = resource_key(ns, ty, &id);
            if let Err(e) = self
                .labels
                .create_or_update_label(ty, &rec.uid, &key, &LabelIndex::system_labels(ns, &rec))
                .await
            {
                self.cleanup(ns, &rec).await;
                return Err(e.into());
            }
            rec
        };

        if opts.hold {
            let key = resource_key(ns, ty, &id);
            self.coordinator.hold(&key).await;
            if self.coordinator.wait(&key).await == HoldOutcome::Withdraw {
                self.cleanup(ns, &rec).await;
                return Err(ProvisionError::Withdrawn(format!(
                    "create {ty} {id} failed: withdrawn while holding"
                )));
            }
        }

        match self.provision(ns, rec.clone(), &req).await {
            Ok(done) => Ok(done),
            Err(e) => {
                self.cleanup(ns, &rec).await;
                Err(e)
            }
        }
    }

    /// Resolve node-group sub-resources, then make the provider call under
    /// the global throttle with the provider's stagger applied first.
    async fn provision(
        &self,
        ns: &str,
        mut rec: ResourceRecord,
        req: &CreateClusterRequest,
    ) -> ProvisionResult<ResourceRecord> {
        let mut node_groups = Vec::with_capacity(req.node_groups.len());
        for group in &req.node_groups {
            node_groups.push(json!({
                "Name": group.name,
                "ImageName":
                    resolve_csp_name(&self.store, ns, ResourceType::Image, &group.image_id).await?,
                "VMSpecName":
                    resolve_csp_name(&self.store, ns, ResourceType::Spec, &group.spec_id).await?,
                "KeyPairName":
                    resolve_csp_name(&self.store, ns, ResourceType::SshKey, &group.ssh_key_id)
                        .await?,
                "DesiredNodeSize": group.desired_size.to_string(),
                "MinNodeSize": group.min_size.to_string(),
                "MaxNodeSize": group.max_size.to_string(),
            }));
        }
        let req_info = json!({
            "Name": req.name,
            "Version": req.version,
            "NodeGroupList": node_groups,
        });

        let limits = rate_limit_config(provider_of(&rec.connection_name));
        tokio::time::sleep(stagger_delay(&limits)).await;
        let _permit = self.throttle.acquire().await;

        let created = self
            .provider
            .create_resource("cluster", &rec.connection_name, req_info)
            .await
            .map_err(|e| collaborator_failure("create k8sCluster", &rec.id, e))?;

        rec.csp_resource_id = created.iid.system_id.clone();
        rec.csp_resource_name = created.iid.name_id.clone();
        rec.status = created
            .attr("Status")
            .unwrap_or(status::AVAILABLE)
            .to_string();
        self.store.update(ns, &rec).await?;
        info!(ns, id = %rec.id, csp_id = %rec.csp_resource_id, "cluster provisioned");
        Ok(rec)
    }

    /// Delete the bare record through the regular deletion path. The csp
    /// fields are still empty, so no provider call is made.
    async fn cleanup(&self, ns: &str, rec: &ResourceRecord) {
        if let Err(e) = self
            .store
            .delete(ns, ResourceType::K8sCluster, &rec.id, true)
            .await
        {
            warn!(ns, id = %rec.id, error = %e, "cleanup of bare cluster record failed");
        }
    }
}

fn validate_request(req: &CreateClusterRequest) -> ProvisionResult<()> {
    if req.version.is_empty() {
        return Err(ProvisionError::Validation(format!(
            "cluster {}: version must be set",
            req.name
        )));
    }
    if req.connection_name.is_empty() {
        return Err(ProvisionError::Validation(format!(
            "cluster {}: connectionName must be set",
            req.name
        )));
    }
    if req.node_groups.is_empty() {
        return Err(ProvisionError::Validation(format!(
            "cluster {}: at least one node group is required",
            req.name
        )));
    }
    for group in &req.node_groups {
        if group.image_id.is_empty() || group.spec_id.is_empty() || group.ssh_key_id.is_empty() {
            return Err(ProvisionError::Validation(format!(
                "cluster {} node group {}: imageId, specId and sshKeyId must be set",
                req.name, group.name
            )));
        }
        if !(group.min_size <= group.desired_size && group.desired_size <= group.max_size) {
            return Err(ProvisionError::Validation(format!(
                "cluster {} node group {}: sizes must satisfy min <= desired <= max",
                req.name, group.name
            )));
        }
    }
    Ok(())
}
