//! The label index: one queryable label map per resource.
//!
//! Entries live at `/label/{type}/{uid}` in the same KV store as the
//! resource records. Provider tag synchronization is best-effort and
//! fully asynchronous: its failures are logged, never surfaced, and the
//! primary operation's outcome is independent of it.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use stratus_connect::{ProviderClient, TagEntry};
use stratus_state::{KvStore, ResourceRecord, ResourceType, label_key, label_prefix};

use crate::error::{LabelError, LabelResult};
use crate::selector::matches_label_selector;

/// System-reserved label keys, always present on every resource.
pub mod syskeys {
    pub const MANAGER: &str = "sys.manager";
    pub const NAMESPACE: &str = "sys.namespace";
    pub const ID: &str = "sys.id";
    pub const NAME: &str = "sys.name";
    pub const UID: &str = "sys.uid";
    pub const CONNECTION_NAME: &str = "sys.connectionName";
    pub const DESCRIPTION: &str = "sys.description";

    /// The manager value stamped on everything this engine creates.
    pub const MANAGER_VALUE: &str = "stratus";
}

/// The stored label entry for one resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelInfo {
    pub resource_key: String,
    pub labels: BTreeMap<String, String>,
}

/// Label CRUD and selector-driven discovery.
#[derive(Clone)]
pub struct LabelIndex {
    kv: Arc<dyn KvStore>,
    provider: Arc<dyn ProviderClient>,
}

impl LabelIndex {
    pub fn new(kv: Arc<dyn KvStore>, provider: Arc<dyn ProviderClient>) -> Self {
        Self { kv, provider }
    }

    /// Build the reserved label set for a record.
    pub fn system_labels(ns: &str, rec: &ResourceRecord) -> BTreeMap<String, String> {
        BTreeMap::from([
            (syskeys::MANAGER.to_string(), syskeys::MANAGER_VALUE.to_string()),
            (syskeys::NAMESPACE.to_string(), ns.to_string()),
            (syskeys::ID.to_string(), rec.id.clone()),
            (syskeys::NAME.to_string(), rec.name.clone()),
            (syskeys::UID.to_string(), rec.uid.clone()),
            (syskeys::CONNECTION_NAME.to_string(), rec.connection_name.clone()),
            (syskeys::DESCRIPTION.to_string(), rec.description.clone()),
        ])
    }

    /// Fetch the labels for a resource. Returns an empty [`LabelInfo`]
    /// (not an error) when nothing is stored yet.
    pub fn get_labels(&self, ty: ResourceType, uid: &str) -> LabelResult<LabelInfo> {
        match self.kv.get(&label_key(ty, uid))? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| LabelError::Deserialize(format!("label {ty}/{uid}: {e}"))),
            None => Ok(LabelInfo::default()),
        }
    }

    /// Merge `labels` into the resource's label entry; the given labels
    /// win on key conflict. When the entry carries a connection name (and
    /// the type participates in tag sync), provider tags are enriched and
    /// pushed in the background, best-effort.
    pub async fn create_or_update_label(
        &self,
        ty: ResourceType,
        uid: &str,
        resource_key: &str,
        labels: &BTreeMap<String, String>,
    ) -> LabelResult<LabelInfo> {
        let mut info = self.get_labels(ty, uid)?;
        info.resource_key = resource_key.to_string();
        for (k, v) in labels {
            info.labels.insert(k.clone(), v.clone());
        }
        self.write(ty, uid, &info)?;
        debug!(%ty, %uid, count = info.labels.len(), "labels updated");

        if info.labels.contains_key(syskeys::CONNECTION_NAME) && ty.has_csp_tag_sync() {
            let index = self.clone();
            let uid = uid.to_string();
            tokio::spawn(async move {
                if let Err(e) = index.sync_csp_tags(ty, &uid).await {
                    warn!(%ty, %uid, error = %e, "csp tag sync failed");
                }
            });
        }
        Ok(info)
    }

    /// Remove one label key. Errors if the resource has no label entry or
    /// the key is not present; best-effort mirrors the removal to the
    /// provider tag API.
    pub async fn remove_label(&self, ty: ResourceType, uid: &str, key: &str) -> LabelResult<()> {
        let raw = self
            .kv
            .get(&label_key(ty, uid))?
            .ok_or_else(|| LabelError::NotFound(format!("no labels stored for {ty} {uid}")))?;
        let mut info: LabelInfo = serde_json::from_str(&raw)
            .map_err(|e| LabelError::Deserialize(format!("label {ty}/{uid}: {e}")))?;
        if info.labels.remove(key).is_none() {
            return Err(LabelError::NotFound(format!(
                "label {key} not present on {ty} {uid}"
            )));
        }
        self.write(ty, uid, &info)?;

        if ty.has_csp_tag_sync() {
            if let Some((connection, system_id)) = self.csp_target(&info) {
                let provider = self.provider.clone();
                let key = key.to_string();
                let ty_for_log = ty;
                tokio::spawn(async move {
                    if let Err(e) = provider.remove_tag(&connection, &system_id, &key).await {
                        warn!(ty = %ty_for_log, %key, error = %e, "csp tag removal failed");
                    }
                });
            }
        }
        Ok(())
    }

    /// Scan all label entries of `label_type`, evaluate the selector, and
    /// load the full record for every match. Unknown type names are an
    /// explicit error, not a silent empty result.
    pub fn resources_by_label_selector(
        &self,
        label_type: &str,
        selector: &str,
    ) -> LabelResult<Vec<ResourceRecord>> {
        let ty = ResourceType::parse(label_type)
            .ok_or_else(|| LabelError::UnsupportedType(label_type.to_string()))?;

        let mut results = Vec::new();
        for entry in self.kv.list_by_prefix(&label_prefix(ty))? {
            let info: LabelInfo = serde_json::from_str(&entry.value)
                .map_err(|e| LabelError::Deserialize(format!("{}: {e}", entry.key)))?;
            if !matches_label_selector(&info.labels, selector) {
                continue;
            }
            match self.kv.get(&info.resource_key)? {
                Some(raw) => {
                    let rec: ResourceRecord = serde_json::from_str(&raw).map_err(|e| {
                        LabelError::Deserialize(format!("{}: {e}", info.resource_key))
                    })?;
                    results.push(rec);
                }
                // Deletion window between the record and its label entry.
                None => warn!(resource_key = %info.resource_key, "label points at missing record"),
            }
        }
        Ok(results)
    }

    fn write(&self, ty: ResourceType, uid: &str, info: &LabelInfo) -> LabelResult<()> {
        let raw = serde_json::to_string(info)
            .map_err(|e| LabelError::Serialize(e.to_string()))?;
        self.kv.put(&label_key(ty, uid), &raw)?;
        Ok(())
    }

    /// Connection name + provider-native system id of the labeled record,
    /// if it is far enough along to carry tags.
    fn csp_target(&self, info: &LabelInfo) -> Option<(String, String)> {
        let connection = info.labels.get(syskeys::CONNECTION_NAME)?.clone();
        let raw = self.kv.get(&info.resource_key).ok()??;
        let rec: ResourceRecord = serde_json::from_str(&raw).ok()?;
        if rec.csp_resource_id.is_empty() {
            return None;
        }
        Some((connection, rec.csp_resource_id))
    }

    /// Pull provider-native tags into the label entry (never overwriting
    /// local labels) and push local non-system labels out to the provider.
    async fn sync_csp_tags(&self, ty: ResourceType, uid: &str) -> LabelResult<()> {
        let mut info = self.get_labels(ty, uid)?;
        let Some((connection, system_id)) = self.csp_target(&info) else {
            return Ok(());
        };

        let csp_tags = self
            .provider
            .get_tags(&connection, &system_id)
            .await
            .map_err(|e| LabelError::TagSync(e.to_string()))?;
        let mut changed = false;
        for tag in csp_tags {
            // Local labels take precedence over provider-sourced values.
            if !info.labels.contains_key(&tag.key) {
                info.labels.insert(tag.key, tag.value);
                changed = true;
            }
        }
        if changed {
            self.write(ty, uid, &info)?;
        }

        let outgoing: Vec<TagEntry> = info
            .labels
            .iter()
            .filter(|(k, _)| !k.starts_with("sys."))
            .map(|(k, v)| TagEntry {
                key: k.clone(),
                value: v.clone(),
            })
            .collect();
        if !outgoing.is_empty() {
            self.provider
                .merge_tags(&connection, &system_id, &outgoing)
                .await
                .map_err(|e| LabelError::TagSync(e.to_string()))?;
        }
        Ok(())
    }
}
