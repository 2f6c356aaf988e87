//! stratus-state — namespaced resource store for Stratus.
//!
//! The canonical record of every infrastructure object lives in a
//! key-value store under hierarchical keys
//! (`/ns/{namespace}/resources/{type}/{id}`). A record exists if and only
//! if its KV entry exists; everything else (label index, relational
//! mirrors) is secondary. The shipped backend is an embedded
//! [redb](https://docs.rs/redb) database behind the small transactional
//! [`KvStore`] interface, with an in-memory variant for testing.
//!
//! # Architecture
//!
//! - [`kv`] — the KV interface and the redb implementation
//! - [`keys`] — hierarchical resource keys and `+`-joined provider
//!   catalog keys
//! - [`types`] — the [`ResourceRecord`] envelope and its closed payload
//!   enum
//! - [`lock`] — per-key locks serializing read-modify-write sequences
//! - [`store`] — typed CRUD, enumeration, association maintenance, and
//!   the jittered bulk-delete fan-out
//!
//! The [`ResourceStore`] is `Clone` + `Send` + `Sync` (Arc-backed) and can
//! be shared across async tasks.

pub mod error;
pub mod keys;
pub mod kv;
pub mod lock;
pub mod store;
pub mod types;

pub use error::{StateError, StateResult};
pub use keys::{
    label_key, label_prefix, provider_catalog_key, resolve_provider_catalog_key, resource_key,
    resource_prefix,
};
pub use kv::{KeyValue, KvStore, RedbKvStore};
pub use lock::{KeyGuard, LockRegistry};
pub use store::{AssociationOp, ResourceStore};
pub use types::*;
