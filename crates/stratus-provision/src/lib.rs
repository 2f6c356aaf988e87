//! stratus-provision — multi-step provisioning workflows.
//!
//! Drives long-running creation and teardown of composite resources
//! against the two collaborator services, on top of the resource store
//! and label index.
//!
//! # Architecture
//!
//! - [`coordinator`] — the hold/continue/withdraw gate for held creations
//! - [`backoff`] — sigmoid backoff schedule and the deadline-bounded
//!   polling loop
//! - [`resolve`] — sub-resource name resolution with the shared-namespace
//!   fallback
//! - [`cluster`] — Kubernetes cluster creation against the
//!   provider-abstraction service
//! - [`infra`] — the infracode lifecycle driver
//! - [`vpn`], [`sqldb`] — composite workflows built on the driver
//!
//! Every engine takes its dependencies by injection; nothing in this
//! crate is a process-wide singleton.

pub mod backoff;
pub mod cluster;
pub mod coordinator;
pub mod error;
pub mod infra;
pub mod resolve;
pub mod sqldb;
pub mod vpn;

pub use backoff::{MAX_WAIT, MIN_WAIT, PollConfig, backoff_wait, poll_until};
pub use cluster::{ClusterEngine, CreateClusterRequest, CreateOptions};
pub use coordinator::{HoldOutcome, HoldSignal, ProvisioningCoordinator};
pub use error::{ProvisionError, ProvisionResult};
pub use infra::InfraDriver;
pub use resolve::{SYSTEM_NAMESPACE, provider_of, resolve_csp_name, resolve_resource};
pub use sqldb::{CreateSqlDbRequest, SqlDbEngine};
pub use vpn::{CreateVpnRequest, VpnEngine, VpnSiteRequest};
