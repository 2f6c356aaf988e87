//! Managed SQL database workflow.
//!
//! Shares the infracode lifecycle with the VPN workflow but stays
//! synchronous on the provider side: once the apply call returns, the
//! database is up, so there is no refined-status polling here.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use stratus_label::LabelIndex;
use stratus_state::{
    ResourcePayload, ResourceRecord, ResourceStore, ResourceType, resource_key, status,
};

use crate::error::{ProvisionError, ProvisionResult};
use crate::infra::InfraDriver;
use crate::resolve::provider_of;

const ENRICHMENT: &str = "sqldb";

/// Request to create one managed SQL database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSqlDbRequest {
    pub name: String,
    pub connection_name: String,
    #[serde(default)]
    pub description: String,
    pub engine: String,
    pub engine_version: String,
}

pub struct SqlDbEngine {
    store: ResourceStore,
    labels: LabelIndex,
    infra: InfraDriver,
}

impl SqlDbEngine {
    pub fn new(store: ResourceStore, labels: LabelIndex, infra: InfraDriver) -> Self {
        Self {
            store,
            labels,
            infra,
        }
    }

    pub async fn create(
        &self,
        ns: &str,
        req: CreateSqlDbRequest,
        retry: bool,
    ) -> ProvisionResult<ResourceRecord> {
        validate_request(&req)?;
        let ty = ResourceType::SqlDb;
        let id = req.name.clone();

        let mut rec = if self.store.exists(ns, ty, &id)? {
            if !retry {
                return Err(ProvisionError::Conflict(format!("{ty} {id}")));
            }
            info!(%ns, %id, "retrying over a partially built database record");
            self.store.get(ns, ty, &id).await?
        } else {
            let mut rec = ResourceRecord::new(
                &id,
                &req.name,
                &req.connection_name,
                ResourcePayload::SqlDb {
                    engine: req.engine.clone(),
                    engine_version: req.engine_version.clone(),
                    handle_id: None,
                },
            );
            rec.description = req.description.clone();
            self.store.create(ns, &rec)?;
            if let Err(e) = self
                .labels
                .create_or_update_label(
                    ty,
                    &rec.uid,
                    &resource_key(ns, ty, &id),
                    &LabelIndex::system_labels(ns, &rec),
                )
                .await
            {
                self.store.remove_record(ns, ty, &id, &rec.uid)?;
                return Err(e.into());
            }
            rec
        };

        let handle = self.infra.ensure_handle(&rec.uid, &req.description).await?;
        rec.payload = ResourcePayload::SqlDb {
            engine: req.engine.clone(),
            engine_version: req.engine_version.clone(),
            handle_id: Some(handle.id.clone()),
        };
        self.store.update(ns, &rec).await?;

        let providers = vec![provider_of(&req.connection_name).to_string()];
        let spec = json!({
            "sqlDb": {
                "name": req.name,
                "connectionName": req.connection_name,
                "engine": req.engine,
                "engineVersion": req.engine_version,
            }
        });

        match self
            .infra
            .build(&handle.id, ENRICHMENT, &providers, spec)
            .await
        {
            Ok(()) => {
                rec.csp_resource_id = handle.id.clone();
                rec.status = status::AVAILABLE.to_string();
                self.store.update(ns, &rec).await?;
                info!(%ns, %id, handle = %handle.id, "database provisioned");
                Ok(rec)
            }
            Err(e) => {
                rec.status = status::FAILED.to_string();
                if let Err(update_err) = self.store.update(ns, &rec).await {
                    warn!(%ns, %id, error = %update_err, "marking database failed did not persist");
                }
                Err(e)
            }
        }
    }

    /// Tear down through the infracode lifecycle, then drop the record.
    pub async fn delete(&self, ns: &str, id: &str) -> ProvisionResult<()> {
        let ty = ResourceType::SqlDb;
        let mut rec = self.store.get(ns, ty, id).await?;
        let handle_id = match &rec.payload {
            ResourcePayload::SqlDb {
                handle_id: Some(h), ..
            } => h.clone(),
            _ => {
                self.store.remove_record(ns, ty, id, &rec.uid)?;
                return Ok(());
            }
        };

        rec.status = status::DELETING.to_string();
        self.store.update(ns, &rec).await?;
        self.infra.teardown(&handle_id, ENRICHMENT).await?;
        self.store.remove_record(ns, ty, id, &rec.uid)?;
        info!(%ns, %id, "database deleted");
        Ok(())
    }
}

fn validate_request(req: &CreateSqlDbRequest) -> ProvisionResult<()> {
    if req.connection_name.is_empty() {
        return Err(ProvisionError::Validation(format!(
            "sqlDb {}: connectionName must be set",
            req.name
        )));
    }
    if req.engine.is_empty() || req.engine_version.is_empty() {
        return Err(ProvisionError::Validation(format!(
            "sqlDb {}: engine and engineVersion must be set",
            req.name
        )));
    }
    Ok(())
}
