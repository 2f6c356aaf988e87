//! The KV interface and the embedded redb implementation.
//!
//! The resource store consumes the key-value collaborator only through
//! [`KvStore`]: put/get/delete plus an ordered prefix scan. Values are
//! JSON strings; the hierarchical structure lives entirely in the keys.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tracing::debug;

use crate::error::{StateError, StateResult};

/// All records live in one `&str -> &[u8]` table; hierarchical keys carry
/// the namespace/type structure.
const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// One key/value pair returned from a prefix scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

/// The transactional interface the resource store requires of its
/// key-value backend.
///
/// Absence of a key is not an error: `get` returns `None` and `delete`
/// returns `false`. `list_by_prefix` returns entries ordered by key
/// ascending.
pub trait KvStore: Send + Sync {
    fn put(&self, key: &str, value: &str) -> StateResult<()>;
    fn get(&self, key: &str) -> StateResult<Option<String>>;
    fn delete(&self, key: &str) -> StateResult<bool>;
    fn list_by_prefix(&self, prefix: &str) -> StateResult<Vec<KeyValue>>;
}

/// Thread-safe KV store backed by redb.
#[derive(Clone)]
pub struct RedbKvStore {
    db: Arc<Database>,
}

impl RedbKvStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_table()?;
        debug!(?path, "kv store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_table()?;
        debug!("in-memory kv store opened");
        Ok(store)
    }

    /// Create the records table if it doesn't exist yet.
    fn ensure_table(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(RECORDS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

impl KvStore for RedbKvStore {
    fn put(&self, key: &str, value: &str) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_bytes())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get(&self, key: &str) -> StateResult<Option<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value =
                    String::from_utf8(guard.value().to_vec()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn delete(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    fn list_by_prefix(&self, prefix: &str) -> StateResult<Vec<KeyValue>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RECORDS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        // redb iterates in key order, so results come back key-ascending.
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let value =
                    String::from_utf8(value.value().to_vec()).map_err(map_err!(Deserialize))?;
                results.push(KeyValue {
                    key: key.value().to_string(),
                    value,
                });
            }
        }
        Ok(results)
    }
}
