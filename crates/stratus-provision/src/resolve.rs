//! Sub-resource name resolution.
//!
//! Workflow requests reference images, specs, and SSH keys by local id.
//! Resolution checks the caller's namespace first, then falls back to the
//! namespace reserved for common/shared resources; when both miss, the
//! failure message names both namespaces searched.

use stratus_state::{ResourceRecord, ResourceStore, ResourceType};

use crate::error::{ProvisionError, ProvisionResult};

/// Namespace holding shared resources visible to every caller.
pub const SYSTEM_NAMESPACE: &str = "system";

/// Provider name portion of a connection name (`aws-us-east-1` -> `aws`).
pub fn provider_of(connection_name: &str) -> &str {
    connection_name
        .split('-')
        .next()
        .unwrap_or(connection_name)
}

/// Look up a resource in `ns`, falling back to [`SYSTEM_NAMESPACE`].
pub async fn resolve_resource(
    store: &ResourceStore,
    ns: &str,
    ty: ResourceType,
    id: &str,
) -> ProvisionResult<ResourceRecord> {
    let first = match store.get(ns, ty, id).await {
        Ok(rec) => return Ok(rec),
        Err(e) if e.is_not_found() => e,
        Err(e) => return Err(e.into()),
    };
    match store.get(SYSTEM_NAMESPACE, ty, id).await {
        Ok(rec) => Ok(rec),
        Err(second) => Err(ProvisionError::NotFound(format!(
            "{ty} {id}: not in namespace {ns} ({first}) and not in namespace {SYSTEM_NAMESPACE} ({second})"
        ))),
    }
}

/// Resolve a local id to the provider-native name the provider call needs.
pub async fn resolve_csp_name(
    store: &ResourceStore,
    ns: &str,
    ty: ResourceType,
    id: &str,
) -> ProvisionResult<String> {
    let rec = resolve_resource(store, ns, ty, id).await?;
    Ok(rec.csp_name().to_string())
}
