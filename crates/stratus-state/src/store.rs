//! ResourceStore — typed CRUD and enumeration over the KV backend.
//!
//! The store is independent of resource type: the envelope/payload enum
//! carries the type-specific fields, and the store plumbs provider-side
//! effects (status refresh, deletion) through the provider-abstraction
//! client where a type requires them. Absence of a KV entry is the sole
//! existence signal.

use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info, warn};

use stratus_connect::ProviderClient;

use crate::error::{StateError, StateResult};
use crate::keys::{label_key, resource_key, resource_prefix, validate_id};
use crate::kv::KvStore;
use crate::lock::LockRegistry;
use crate::types::{ResourceRecord, ResourceType};

/// Operation selector for association-list maintenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationOp {
    Add,
    Remove,
}

/// Thread-safe resource store shared across async tasks.
#[derive(Clone)]
pub struct ResourceStore {
    kv: Arc<dyn KvStore>,
    locks: Arc<LockRegistry>,
    provider: Arc<dyn ProviderClient>,
}

impl ResourceStore {
    pub fn new(kv: Arc<dyn KvStore>, provider: Arc<dyn ProviderClient>) -> Self {
        Self {
            kv,
            locks: Arc::new(LockRegistry::new()),
            provider,
        }
    }

    /// The per-key lock registry, shared with the provisioning engine so
    /// all read-modify-writes on one key serialize through the same locks.
    pub fn locks(&self) -> Arc<LockRegistry> {
        self.locks.clone()
    }

    /// The underlying KV store (the label index shares it).
    pub fn kv(&self) -> Arc<dyn KvStore> {
        self.kv.clone()
    }

    fn read_record(&self, key: &str) -> StateResult<Option<ResourceRecord>> {
        match self.kv.get(key)? {
            Some(value) => {
                let rec = serde_json::from_str(&value)
                    .map_err(|e| StateError::Deserialize(format!("{key}: {e}")))?;
                Ok(Some(rec))
            }
            None => Ok(None),
        }
    }

    fn write_record(&self, key: &str, rec: &ResourceRecord) -> StateResult<()> {
        let value =
            serde_json::to_string(rec).map_err(|e| StateError::Serialize(e.to_string()))?;
        self.kv.put(key, &value)
    }

    /// True iff the KV key is present. Non-existence is not an error.
    pub fn exists(&self, ns: &str, ty: ResourceType, id: &str) -> StateResult<bool> {
        validate_id("namespace", ns)?;
        validate_id("id", id)?;
        Ok(self.kv.get(&resource_key(ns, ty, id))?.is_some())
    }

    /// Create a record; fails with `Conflict` if the id is already taken.
    pub fn create(&self, ns: &str, rec: &ResourceRecord) -> StateResult<()> {
        validate_id("namespace", ns)?;
        validate_id("id", &rec.id)?;
        let ty = rec.resource_type();
        let key = resource_key(ns, ty, &rec.id);
        if self.kv.get(&key)?.is_some() {
            return Err(StateError::Conflict(format!("{ty} {}", rec.id)));
        }
        self.write_record(&key, rec)?;
        debug!(%key, uid = %rec.uid, "resource created");
        Ok(())
    }

    /// Overwrite an existing record under its key lock, skipping the KV
    /// write when the new value is structurally equal to the stored one.
    /// This equality gate bounds KV write volume on hot refresh paths.
    pub async fn update(&self, ns: &str, rec: &ResourceRecord) -> StateResult<()> {
        let ty = rec.resource_type();
        let key = resource_key(ns, ty, &rec.id);
        let _guard = self.locks.acquire(&key).await;
        let current = self
            .read_record(&key)?
            .ok_or_else(|| StateError::NotFound(format!("{ty} {} in namespace {ns}", rec.id)))?;
        if current == *rec {
            debug!(%key, "update skipped, record unchanged");
            return Ok(());
        }
        self.write_record(&key, rec)
    }

    /// Fetch a record; `NotFound` if absent. Types whose provider-side
    /// status can drift (custom images, data disks) are transparently
    /// refreshed against the provider before returning, with the refreshed
    /// record written back only if it differs.
    pub async fn get(&self, ns: &str, ty: ResourceType, id: &str) -> StateResult<ResourceRecord> {
        validate_id("namespace", ns)?;
        validate_id("id", id)?;
        let key = resource_key(ns, ty, id);
        let rec = self
            .read_record(&key)?
            .ok_or_else(|| StateError::NotFound(format!("{ty} {id} in namespace {ns}")))?;
        if ty.has_provider_refresh() {
            self.refresh_from_provider(&key, ty, rec).await
        } else {
            Ok(rec)
        }
    }

    async fn refresh_from_provider(
        &self,
        key: &str,
        ty: ResourceType,
        rec: ResourceRecord,
    ) -> StateResult<ResourceRecord> {
        let Some(segment) = ty.provider_path_segment() else {
            return Ok(rec);
        };
        let _guard = self.locks.acquire(key).await;
        // Re-read under the lock so concurrent refreshes don't clobber
        // each other's write-backs.
        let stored = self.read_record(key)?.unwrap_or(rec);
        let looked_up = self
            .provider
            .get_resource(segment, &stored.connection_name, stored.csp_name())
            .await
            .map_err(|e| {
                StateError::Collaborator(format!("refresh {ty} {} failed: {e}", stored.id))
            })?;

        let mut refreshed = stored.clone();
        if let Some(status) = looked_up.attr("Status") {
            refreshed.status = status.to_string();
        }
        if refreshed.csp_resource_id.is_empty() {
            refreshed.csp_resource_id = looked_up.iid.system_id.clone();
        }
        if refreshed.csp_resource_name.is_empty() {
            refreshed.csp_resource_name = looked_up.iid.name_id.clone();
        }
        if refreshed != stored {
            self.write_record(key, &refreshed)?;
            debug!(%key, status = %refreshed.status, "record refreshed from provider");
        }
        Ok(refreshed)
    }

    /// List all records of one type in a namespace. When `filter_key` is
    /// set, both it and `filter_val` must appear as case-insensitive
    /// substrings of the serialized record (an AND, not field-scoped,
    /// filter by design).
    pub fn list(
        &self,
        ns: &str,
        ty: ResourceType,
        filter_key: Option<&str>,
        filter_val: Option<&str>,
    ) -> StateResult<Vec<ResourceRecord>> {
        validate_id("namespace", ns)?;
        let prefix = resource_prefix(ns, ty);
        let mut results = Vec::new();
        for entry in self.kv.list_by_prefix(&prefix)? {
            // Skip child-resource entries that share the prefix.
            if entry.key[prefix.len()..].contains('/') {
                continue;
            }
            if let Some(fk) = filter_key {
                let haystack = entry.value.to_lowercase();
                if !haystack.contains(&fk.to_lowercase()) {
                    continue;
                }
                if let Some(fv) = filter_val {
                    if !haystack.contains(&fv.to_lowercase()) {
                        continue;
                    }
                }
            }
            let rec: ResourceRecord = serde_json::from_str(&entry.value)
                .map_err(|e| StateError::Deserialize(format!("{}: {e}", entry.key)))?;
            results.push(rec);
        }
        Ok(results)
    }

    /// List the ids of all records of one type in a namespace. Keys with
    /// an extra `/` (child-resource leakage) are excluded by construction.
    pub fn list_ids(&self, ns: &str, ty: ResourceType) -> StateResult<Vec<String>> {
        validate_id("namespace", ns)?;
        let prefix = resource_prefix(ns, ty);
        let ids = self
            .kv
            .list_by_prefix(&prefix)?
            .into_iter()
            .filter_map(|entry| {
                let tail = &entry.key[prefix.len()..];
                (!tail.contains('/')).then(|| tail.to_string())
            })
            .collect();
        Ok(ids)
    }

    /// Delete a record: provider-side deletion first (for types the
    /// provider backs), then the KV entry, the relational mirror row, and
    /// the label entry, in that order. The three removals are not
    /// transactional; a crash between them is an accepted inconsistency
    /// window. `force` tells the provider to ignore dependency errors.
    pub async fn delete(
        &self,
        ns: &str,
        ty: ResourceType,
        id: &str,
        force: bool,
    ) -> StateResult<()> {
        validate_id("namespace", ns)?;
        validate_id("id", id)?;
        if matches!(ty, ResourceType::Vpn | ResourceType::SqlDb) {
            return Err(StateError::Validation(format!(
                "delete {ty} {id} failed: composite resources are torn down through their provisioning workflow"
            )));
        }
        let key = resource_key(ns, ty, id);
        let rec = self
            .read_record(&key)?
            .ok_or_else(|| StateError::NotFound(format!("{ty} {id} in namespace {ns}")))?;

        if let Some(segment) = ty.provider_path_segment() {
            // Nothing to tear down provider-side for a record that never
            // finished provisioning.
            if !rec.csp_resource_id.is_empty() || !rec.csp_resource_name.is_empty() {
                self.provider
                    .delete_resource(segment, &rec.connection_name, rec.csp_name(), force)
                    .await
                    .map_err(|e| {
                        StateError::Collaborator(format!("delete {ty} {id} failed: {e}"))
                    })?;
            }
        }

        self.remove_record(ns, ty, id, &rec.uid)?;
        info!(%key, "resource deleted");
        Ok(())
    }

    /// Remove a record's KV entry, mirror row, and label entry without
    /// touching the provider. Used by the deletion path above and by
    /// workflows that tear down provider state themselves.
    pub fn remove_record(&self, ns: &str, ty: ResourceType, id: &str, uid: &str) -> StateResult<()> {
        let key = resource_key(ns, ty, id);
        self.kv.delete(&key)?;
        // Relational mirror removal would go here for mirrored types; the
        // mirror is a non-authoritative secondary index.
        self.kv.delete(&label_key(ty, uid))?;
        Ok(())
    }

    /// Delete every record of one type whose id contains `substring`
    /// (empty matches all), fanning out one task per candidate.
    ///
    /// Each task sleeps a random duration in `[0, candidates/10]` seconds
    /// before acting, so a large sweep doesn't hammer one provider all at
    /// once. Individual failures never fail the sweep: every attempted id
    /// comes back as `[Done] id` or `[Failed] id (reason)`. Only failing
    /// to list candidates at all is a top-level error.
    pub async fn delete_all(
        &self,
        ns: &str,
        ty: ResourceType,
        substring: &str,
        force: bool,
    ) -> StateResult<Vec<String>> {
        let ids: Vec<String> = self
            .list_ids(ns, ty)?
            .into_iter()
            .filter(|id| substring.is_empty() || id.contains(substring))
            .collect();

        let total = ids.len();
        let results = Arc::new(tokio::sync::Mutex::new(Vec::with_capacity(total)));
        // Buffered to the candidate count so producers never block on it.
        let (err_tx, mut err_rx) = tokio::sync::mpsc::channel::<String>(total.max(1));

        let mut handles = Vec::with_capacity(total);
        for id in ids {
            let store = self.clone();
            let ns = ns.to_string();
            let results = results.clone();
            let err_tx = err_tx.clone();
            handles.push(tokio::spawn(async move {
                let jitter_secs = rand::thread_rng().gen_range(0..=(total as u64 / 10));
                tokio::time::sleep(std::time::Duration::from_secs(jitter_secs)).await;
                match store.delete(&ns, ty, &id, force).await {
                    Ok(()) => results.lock().await.push(format!("[Done] {id}")),
                    Err(e) => {
                        results.lock().await.push(format!("[Failed] {id} ({e})"));
                        let _ = err_tx.send(format!("{ty} {id}: {e}")).await;
                    }
                }
            }));
        }
        drop(err_tx);

        // Barrier: every spawned deletion finishes before we return.
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "bulk delete task panicked");
            }
        }
        while let Some(item_error) = err_rx.recv().await {
            warn!(%item_error, "bulk delete item failed");
        }

        let results = results.lock().await.clone();
        info!(%ns, %ty, total, "bulk delete finished");
        Ok(results)
    }

    /// Maintain a record's association list under its key lock. `Add`
    /// fails if the object key is already present; `Remove` fails if it
    /// is absent. Returns the resulting list.
    pub async fn update_associated_objects(
        &self,
        ns: &str,
        ty: ResourceType,
        id: &str,
        op: AssociationOp,
        object_key: &str,
    ) -> StateResult<Vec<String>> {
        validate_id("namespace", ns)?;
        validate_id("id", id)?;
        let key = resource_key(ns, ty, id);
        let _guard = self.locks.acquire(&key).await;

        let mut rec = self
            .read_record(&key)?
            .ok_or_else(|| StateError::NotFound(format!("{ty} {id} in namespace {ns}")))?;

        match op {
            AssociationOp::Add => {
                if rec.associated_objects.iter().any(|k| k == object_key) {
                    return Err(StateError::Conflict(format!(
                        "{object_key} already associated with {ty} {id}"
                    )));
                }
                rec.associated_objects.push(object_key.to_string());
            }
            AssociationOp::Remove => {
                let before = rec.associated_objects.len();
                rec.associated_objects.retain(|k| k != object_key);
                if rec.associated_objects.len() == before {
                    return Err(StateError::NotFound(format!(
                        "{object_key} not associated with {ty} {id}"
                    )));
                }
            }
        }
        self.write_record(&key, &rec)?;
        Ok(rec.associated_objects)
    }
}
