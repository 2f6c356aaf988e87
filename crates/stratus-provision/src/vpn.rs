//! Site-to-site VPN workflow.
//!
//! A VPN spans two or more member networks on different providers, so it
//! is materialized through the infrastructure-generation service rather
//! than a single provider call. Site extraction reads the member network
//! records from the resource store; the infracode handle is issued under
//! the record's uid so a retried creation reads its handle back instead
//! of re-issuing one. Gateway convergence is observed by polling the
//! refined enrichment status under the adaptive backoff, bounded by a
//! one-hour deadline; hitting the deadline leaves the record in its
//! last-observed state for a later retry.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use stratus_label::LabelIndex;
use stratus_state::{
    ResourcePayload, ResourceRecord, ResourceStore, ResourceType, VpnSite, resource_key, status,
};

use crate::backoff::PollConfig;
use crate::error::{ProvisionError, ProvisionResult};
use crate::infra::InfraDriver;
use crate::resolve::provider_of;

const ENRICHMENT: &str = "vpn";

/// Request to create one site-to-site VPN.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVpnRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub sites: Vec<VpnSiteRequest>,
}

/// One requested VPN endpoint: a connection and the local network id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpnSiteRequest {
    pub connection_name: String,
    pub vnet_id: String,
}

pub struct VpnEngine {
    store: ResourceStore,
    labels: LabelIndex,
    infra: InfraDriver,
    poll: PollConfig,
}

impl VpnEngine {
    pub fn new(store: ResourceStore, labels: LabelIndex, infra: InfraDriver) -> Self {
        Self {
            store,
            labels,
            infra,
            // Gateways routinely take tens of minutes; hard stop at 1 h.
            poll: PollConfig {
                expected: Duration::from_secs(20 * 60),
                deadline: Duration::from_secs(60 * 60),
            },
        }
    }

    /// Override the polling bounds (tests use short ones).
    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub async fn create(
        &self,
        ns: &str,
        req: CreateVpnRequest,
        retry: bool,
    ) -> ProvisionResult<ResourceRecord> {
        validate_request(&req)?;
        let ty = ResourceType::Vpn;
        let id = req.name.clone();

        let sites = self.extract_sites(ns, &req).await?;

        let mut rec = if self.store.exists(ns, ty, &id)? {
            if !retry {
                return Err(ProvisionError::Conflict(format!("{ty} {id}")));
            }
            info!(%ns, %id, "retrying over a partially built vpn record");
            self.store.get(ns, ty, &id).await?
        } else {
            let mut rec = ResourceRecord::new(
                &id,
                &req.name,
                &sites[0].connection_name,
                ResourcePayload::Vpn {
                    sites: sites.clone(),
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

        // The uid doubles as the handle id; the issue call reads an
        // existing handle back, which is what makes retries resume.
        let handle = self.infra.ensure_handle(&rec.uid, &req.description).await?;
        rec.payload = ResourcePayload::Vpn {
            sites: sites.clone(),
            handle_id: Some(handle.id.clone()),
        };
        self.store.update(ns, &rec).await?;

        let providers: Vec<String> = sites
            .iter()
            .map(|s| provider_of(&s.connection_name).to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let spec = json!({
            "vpn": {
                "name": req.name,
                "sites": sites.iter().map(|s| json!({
                    "connectionName": s.connection_name,
                    "vnetName": s.csp_vnet_name,
                    "cidr": s.cidr,
                })).collect::<Vec<_>>(),
            }
        });

        let outcome = async {
            self.infra
                .build(&handle.id, ENRICHMENT, &providers, spec)
                .await?;
            self.infra
                .await_success(&handle.id, ENRICHMENT, &self.poll)
                .await
        }
        .await;

        match outcome {
            Ok(_) => {
                rec.csp_resource_id = handle.id.clone();
                rec.status = status::AVAILABLE.to_string();
                self.store.update(ns, &rec).await?;
                info!(%ns, %id, handle = %handle.id, "vpn provisioned");
                Ok(rec)
            }
            // Deadline leaves the record in its last-observed state; the
            // caller retries the whole creation with the retry flag.
            Err(e @ ProvisionError::DeadlineExceeded(_)) => Err(e),
            Err(e) => {
                rec.status = status::FAILED.to_string();
                if let Err(update_err) = self.store.update(ns, &rec).await {
                    warn!(%ns, %id, error = %update_err, "marking vpn failed did not persist");
                }
                Err(e)
            }
        }
    }

    /// Tear down a VPN: destroy the applied infracode, remove the provider
    /// environment and handle, then drop the record and its label entry.
    pub async fn delete(&self, ns: &str, id: &str) -> ProvisionResult<()> {
        let ty = ResourceType::Vpn;
        let mut rec = self.store.get(ns, ty, id).await?;
        let handle_id = match &rec.payload {
            ResourcePayload::Vpn {
                handle_id: Some(h), ..
            } => h.clone(),
            // Never got as far as a handle; only local state to drop.
            _ => {
                self.store.remove_record(ns, ty, id, &rec.uid)?;
                return Ok(());
            }
        };

        rec.status = status::DELETING.to_string();
        self.store.update(ns, &rec).await?;
        self.infra.teardown(&handle_id, ENRICHMENT).await?;
        self.store.remove_record(ns, ty, id, &rec.uid)?;
        info!(%ns, %id, "vpn deleted");
        Ok(())
    }

    /// Load each member network and turn it into a concrete site:
    /// provider-native network name plus its CIDR.
    async fn extract_sites(
        &self,
        ns: &str,
        req: &CreateVpnRequest,
    ) -> ProvisionResult<Vec<VpnSite>> {
        let mut sites = Vec::with_capacity(req.sites.len());
        for site in &req.sites {
            let vnet = self
                .store
                .get(ns, ResourceType::VNet, &site.vnet_id)
                .await?;
            let ResourcePayload::VNet { cidr_block, .. } = &vnet.payload else {
                return Err(ProvisionError::Validation(format!(
                    "vpn {}: {} is not a virtual network",
                    req.name, site.vnet_id
                )));
            };
            sites.push(VpnSite {
                connection_name: site.connection_name.clone(),
                vnet_id: site.vnet_id.clone(),
                csp_vnet_name: vnet.csp_name().to_string(),
                cidr: cidr_block.clone(),
            });
        }
        Ok(sites)
    }
}

fn validate_request(req: &CreateVpnRequest) -> ProvisionResult<()> {
    if req.sites.len() < 2 {
        return Err(ProvisionError::Validation(format!(
            "vpn {}: at least two sites are required",
            req.name
        )));
    }
    for site in &req.sites {
        if site.connection_name.is_empty() || site.vnet_id.is_empty() {
            return Err(ProvisionError::Validation(format!(
                "vpn {}: every site needs connectionName and vnetId",
                req.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    use async_trait::async_trait;
    use stratus_connect::{
        ConnectResult, EnrichmentStatus, HandleInfo, InfraGenClient, ProviderClient,
        ProviderResource, TagEntry,
    };
    use stratus_state::RedbKvStore;

    struct NullProvider;

    #[async_trait]
    impl ProviderClient for NullProvider {
        async fn create_resource(
            &self,
            _s: &str,
            _c: &str,
            _r: serde_json::Value,
        ) -> ConnectResult<ProviderResource> {
            Ok(ProviderResource::default())
        }
        async fn get_resource(
            &self,
            _s: &str,
            _c: &str,
            _n: &str,
        ) -> ConnectResult<ProviderResource> {
            Ok(ProviderResource::default())
        }
        async fn delete_resource(
            &self,
            _s: &str,
            _c: &str,
            _n: &str,
            _f: bool,
        ) -> ConnectResult<()> {
            Ok(())
        }
        async fn get_tags(&self, _c: &str, _s: &str) -> ConnectResult<Vec<TagEntry>> {
            Ok(vec![])
        }
        async fn merge_tags(&self, _c: &str, _s: &str, _t: &[TagEntry]) -> ConnectResult<()> {
            Ok(())
        }
        async fn remove_tag(&self, _c: &str, _s: &str, _k: &str) -> ConnectResult<()> {
            Ok(())
        }
    }

    /// Infra fake: records calls, serves scripted statuses (then endless
    /// pending), optionally fails apply.
    #[derive(Default)]
    struct FakeInfraGen {
        calls: StdMutex<Vec<String>>,
        statuses: StdMutex<Vec<String>>,
        fail_apply: bool,
    }

    impl FakeInfraGen {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }
    }

    #[async_trait]
    impl InfraGenClient for FakeInfraGen {
        async fn issue_handle(&self, id: &str, _d: &str) -> ConnectResult<HandleInfo> {
            self.record(format!("issue {id}"));
            Ok(HandleInfo {
                id: id.to_string(),
                ..Default::default()
            })
        }
        async fn get_handle(&self, id: &str) -> ConnectResult<HandleInfo> {
            Ok(HandleInfo {
                id: id.to_string(),
                ..Default::default()
            })
        }
        async fn init_env(&self, _i: &str, _e: &str, providers: &[String]) -> ConnectResult<()> {
            self.record(format!("init_env {}", providers.join(",")));
            Ok(())
        }
        async fn generate_infracode(
            &self,
            _i: &str,
            _e: &str,
            spec: serde_json::Value,
        ) -> ConnectResult<()> {
            self.record(format!("infracode {spec}"));
            Ok(())
        }
        async fn plan(&self, _i: &str, _e: &str) -> ConnectResult<()> {
            self.record("plan");
            Ok(())
        }
        async fn apply(&self, _i: &str, _e: &str) -> ConnectResult<()> {
            self.record("apply");
            if self.fail_apply {
                return Err(stratus_connect::ConnectError::Api(
                    "gateway quota exhausted".into(),
                ));
            }
            Ok(())
        }
        async fn status(&self, _i: &str, _e: &str) -> ConnectResult<EnrichmentStatus> {
            let mut statuses = self.statuses.lock().unwrap();
            let status = if statuses.is_empty() {
                "pending".to_string()
            } else {
                statuses.remove(0)
            };
            Ok(EnrichmentStatus {
                status,
                detail: serde_json::Value::Null,
            })
        }
        async fn destroy(&self, _i: &str, _e: &str) -> ConnectResult<()> {
            self.record("destroy");
            Ok(())
        }
        async fn delete_env(&self, _i: &str, _e: &str) -> ConnectResult<()> {
            self.record("delete_env");
            Ok(())
        }
        async fn delete_handle(&self, id: &str) -> ConnectResult<()> {
            self.record(format!("delete_handle {id}"));
            Ok(())
        }
    }

    struct Fixture {
        store: ResourceStore,
        infra: Arc<FakeInfraGen>,
        engine: VpnEngine,
    }

    fn fixture(infra: FakeInfraGen) -> Fixture {
        let provider: Arc<dyn ProviderClient> = Arc::new(NullProvider);
        let store = ResourceStore::new(
            Arc::new(RedbKvStore::open_in_memory().unwrap()),
            provider.clone(),
        );
        let labels = LabelIndex::new(store.kv(), provider);
        let infra = Arc::new(infra);
        let engine = VpnEngine::new(store.clone(), labels, InfraDriver::new(infra.clone()))
            .with_poll_config(PollConfig {
                expected: Duration::from_secs(60),
                deadline: Duration::from_secs(300),
            });
        Fixture {
            store,
            infra,
            engine,
        }
    }

    fn seed_vnet(store: &ResourceStore, ns: &str, id: &str, connection: &str, cidr: &str) {
        let mut rec = ResourceRecord::new(
            id,
            id,
            connection,
            ResourcePayload::VNet {
                cidr_block: cidr.into(),
                subnets: vec![],
            },
        );
        rec.csp_resource_name = format!("csp-{id}");
        rec.csp_resource_id = format!("vpc-{id}");
        store.create(ns, &rec).unwrap();
    }

    fn request() -> CreateVpnRequest {
        CreateVpnRequest {
            name: "vpn-1".into(),
            description: "cross-cloud link".into(),
            sites: vec![
                VpnSiteRequest {
                    connection_name: "aws-us-east-1".into(),
                    vnet_id: "net-a".into(),
                },
                VpnSiteRequest {
                    connection_name: "gcp-asia-northeast3".into(),
                    vnet_id: "net-g".into(),
                },
            ],
        }
    }

    fn seed_both(f: &Fixture) {
        seed_vnet(&f.store, "ns1", "net-a", "aws-us-east-1", "10.0.0.0/16");
        seed_vnet(&f.store, "ns1", "net-g", "gcp-asia-northeast3", "10.1.0.0/16");
    }

    #[tokio::test(start_paused = true)]
    async fn create_extracts_sites_and_converges() {
        let f = fixture(FakeInfraGen {
            statuses: StdMutex::new(vec!["pending".into(), "Success".into()]),
            ..Default::default()
        });
        seed_both(&f);

        let rec = f.engine.create("ns1", request(), false).await.unwrap();
        assert_eq!(rec.status, status::AVAILABLE);
        let ResourcePayload::Vpn { sites, handle_id } = &rec.payload else {
            panic!("wrong payload");
        };
        assert_eq!(handle_id.as_deref(), Some(rec.uid.as_str()));
        assert_eq!(sites[0].csp_vnet_name, "csp-net-a");
        assert_eq!(sites[1].cidr, "10.1.0.0/16");

        // Providers are deduplicated and sorted in the env init.
        let calls = f.infra.calls.lock().unwrap().clone();
        assert!(calls.iter().any(|c| c == "init_env aws,gcp"), "{calls:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn missing_member_network_fails_before_any_record() {
        let f = fixture(FakeInfraGen::default());
        // Only one of the two networks exists.
        seed_vnet(&f.store, "ns1", "net-a", "aws-us-east-1", "10.0.0.0/16");

        let err = f.engine.create("ns1", request(), false).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!f.store.exists("ns1", ResourceType::Vpn, "vpn-1").unwrap());
        assert!(f.infra.calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn apply_failure_marks_record_failed_but_keeps_it() {
        let f = fixture(FakeInfraGen {
            fail_apply: true,
            ..Default::default()
        });
        seed_both(&f);

        let err = f.engine.create("ns1", request(), false).await.unwrap_err();
        assert!(err.to_string().contains("gateway quota exhausted"));

        let rec = f.store.get("ns1", ResourceType::Vpn, "vpn-1").await.unwrap();
        assert_eq!(rec.status, status::FAILED);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_reuses_the_existing_handle() {
        let f = fixture(FakeInfraGen {
            statuses: StdMutex::new(vec!["Success".into(), "Success".into()]),
            ..Default::default()
        });
        seed_both(&f);

        let first = f.engine.create("ns1", request(), false).await.unwrap();
        let err = f.engine.create("ns1", request(), false).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Conflict(_)));

        let second = f.engine.create("ns1", request(), true).await.unwrap();
        assert_eq!(first.uid, second.uid);

        let calls = f.infra.calls.lock().unwrap().clone();
        let issues: Vec<_> = calls.iter().filter(|c| c.starts_with("issue ")).collect();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0], issues[1], "retry must reuse the handle id");
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_leaves_the_record_in_place() {
        // Endless pending; the poll deadline is the only way out.
        let f = fixture(FakeInfraGen::default());
        seed_both(&f);

        let err = f.engine.create("ns1", request(), false).await.unwrap_err();
        assert!(matches!(err, ProvisionError::DeadlineExceeded(_)));
        let rec = f.store.get("ns1", ResourceType::Vpn, "vpn-1").await.unwrap();
        assert_eq!(rec.status, status::CONFIGURING);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_tears_down_and_removes_the_record() {
        let f = fixture(FakeInfraGen {
            statuses: StdMutex::new(vec!["Success".into()]),
            ..Default::default()
        });
        seed_both(&f);
        let rec = f.engine.create("ns1", request(), false).await.unwrap();

        f.engine.delete("ns1", "vpn-1").await.unwrap();
        assert!(!f.store.exists("ns1", ResourceType::Vpn, "vpn-1").unwrap());

        let calls = f.infra.calls.lock().unwrap().clone();
        assert_eq!(
            calls[calls.len() - 3..],
            [
                "destroy".to_string(),
                "delete_env".to_string(),
                format!("delete_handle {}", rec.uid),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fewer_than_two_sites_is_invalid() {
        let f = fixture(FakeInfraGen::default());
        let mut req = request();
        req.sites.truncate(1);
        let err = f.engine.create("ns1", req, false).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Validation(_)));
    }
}
