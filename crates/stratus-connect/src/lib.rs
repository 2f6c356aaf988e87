//! stratus-connect — clients for the external collaborator services.
//!
//! Stratus talks to two HTTP services: the **provider-abstraction service**,
//! which translates uniform requests into provider-native cloud API calls,
//! and the **infrastructure-generation service**, which materializes
//! declarative infracode for composite cross-provider resources (VPNs,
//! managed databases).
//!
//! Both collaborators are consumed through traits so the orchestration
//! engine can be exercised against in-process fakes. The shipped
//! implementations are thin `reqwest` clients; a non-2xx response surfaces
//! the raw response body in the error so provider-specific diagnostics are
//! never lost.

pub mod config;
pub mod error;
pub mod infragen;
pub mod provider;

pub use config::ConnectConfig;
pub use error::{ConnectError, ConnectResult};
pub use infragen::{EnrichmentStatus, HandleInfo, HttpInfraGenClient, InfraGenClient};
pub use provider::{HttpProviderClient, Iid, ProviderClient, ProviderResource, TagEntry};
