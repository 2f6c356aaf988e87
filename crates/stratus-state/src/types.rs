//! Domain types for the Stratus resource store.
//!
//! A [`ResourceRecord`] is the canonical unit stored in the KV store: a
//! common envelope (ids, connection, status, associations) plus a closed
//! [`ResourcePayload`] enum carrying the type-specific fields. Dispatch
//! over resource types is a type/enum match, never a string switch with
//! unchecked downcasts.

use serde::{Deserialize, Serialize};

/// Lifecycle statuses the engine itself assigns. Provider-reported
/// statuses are free-form strings layered on top of these.
pub mod status {
    pub const CONFIGURING: &str = "configuring";
    pub const AVAILABLE: &str = "available";
    pub const FAILED: &str = "failed";
    pub const DELETING: &str = "deleting";
}

/// The closed set of resource types the engine manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceType {
    VNet,
    SecurityGroup,
    SshKey,
    Spec,
    Image,
    CustomImage,
    DataDisk,
    K8sCluster,
    Vpn,
    SqlDb,
}

impl ResourceType {
    /// The type's segment in resource keys and label keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::VNet => "vNet",
            ResourceType::SecurityGroup => "securityGroup",
            ResourceType::SshKey => "sshKey",
            ResourceType::Spec => "spec",
            ResourceType::Image => "image",
            ResourceType::CustomImage => "customImage",
            ResourceType::DataDisk => "dataDisk",
            ResourceType::K8sCluster => "k8sCluster",
            ResourceType::Vpn => "vpn",
            ResourceType::SqlDb => "sqlDb",
        }
    }

    /// Parse a type name as it appears in keys and label queries.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "vNet" => Some(ResourceType::VNet),
            "securityGroup" => Some(ResourceType::SecurityGroup),
            "sshKey" => Some(ResourceType::SshKey),
            "spec" => Some(ResourceType::Spec),
            "image" => Some(ResourceType::Image),
            "customImage" => Some(ResourceType::CustomImage),
            "dataDisk" => Some(ResourceType::DataDisk),
            "k8sCluster" => Some(ResourceType::K8sCluster),
            "vpn" => Some(ResourceType::Vpn),
            "sqlDb" => Some(ResourceType::SqlDb),
            _ => None,
        }
    }

    /// URL path segment on the provider-abstraction service, for types
    /// that are provisioned/deleted through it. Catalog entries (specs,
    /// images) and infracode-backed composites (VPNs, SQL databases) have
    /// none.
    pub fn provider_path_segment(&self) -> Option<&'static str> {
        match self {
            ResourceType::VNet => Some("vpc"),
            ResourceType::SecurityGroup => Some("securitygroup"),
            ResourceType::SshKey => Some("keypair"),
            ResourceType::CustomImage => Some("myimage"),
            ResourceType::DataDisk => Some("disk"),
            ResourceType::K8sCluster => Some("cluster"),
            ResourceType::Spec
            | ResourceType::Image
            | ResourceType::Vpn
            | ResourceType::SqlDb => None,
        }
    }

    /// Types whose provider-side status can drift while we hold a record:
    /// `get` refreshes these transparently before returning.
    pub fn has_provider_refresh(&self) -> bool {
        matches!(self, ResourceType::CustomImage | ResourceType::DataDisk)
    }

    /// VPNs are excluded from CSP tag synchronization; their tags exist
    /// only in the label index.
    pub fn has_csp_tag_sync(&self) -> bool {
        !matches!(self, ResourceType::Vpn)
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The canonical stored form of one infrastructure object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    /// Caller-chosen id, unique within namespace+type, immutable.
    pub id: String,
    /// System-generated uid, globally unique, stable across renames.
    pub uid: String,
    pub name: String,
    /// Selects the provider+region+credential triple.
    pub connection_name: String,
    /// Provider-native id, populated after provisioning.
    #[serde(default)]
    pub csp_resource_id: String,
    /// Provider-native name, populated after provisioning.
    #[serde(default)]
    pub csp_resource_name: String,
    pub status: String,
    #[serde(default)]
    pub description: String,
    /// Foreign keys of objects that reference this one. Informational
    /// only; deletion protection based on it is disabled.
    #[serde(default)]
    pub associated_objects: Vec<String>,
    pub payload: ResourcePayload,
}

impl ResourceRecord {
    /// Build a bare record in `configuring` state with a fresh uid.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        connection_name: impl Into<String>,
        payload: ResourcePayload,
    ) -> Self {
        Self {
            id: id.into(),
            uid: new_uid(),
            name: name.into(),
            connection_name: connection_name.into(),
            csp_resource_id: String::new(),
            csp_resource_name: String::new(),
            status: status::CONFIGURING.to_string(),
            description: String::new(),
            associated_objects: Vec::new(),
            payload,
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        self.payload.resource_type()
    }

    /// The provider-native name to address this resource by, falling back
    /// to the local name while provisioning is still in flight.
    pub fn csp_name(&self) -> &str {
        if self.csp_resource_name.is_empty() {
            &self.name
        } else {
            &self.csp_resource_name
        }
    }
}

/// Generate a fresh resource uid.
pub fn new_uid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Type-specific payload of a [`ResourceRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ResourcePayload {
    VNet {
        cidr_block: String,
        subnets: Vec<Subnet>,
    },
    SecurityGroup {
        vnet_id: String,
        rules: Vec<FirewallRule>,
    },
    SshKey {
        #[serde(default)]
        fingerprint: String,
        #[serde(default)]
        public_key: String,
    },
    Spec {
        provider: String,
        region: String,
        vcpu: u32,
        memory_gib: f32,
    },
    Image {
        provider: String,
        region: String,
        os_type: String,
    },
    CustomImage {
        source_vm: String,
    },
    DataDisk {
        disk_type: String,
        size_gb: u32,
    },
    K8sCluster {
        version: String,
        node_groups: Vec<NodeGroup>,
    },
    Vpn {
        sites: Vec<VpnSite>,
        /// Infracode workspace handle, once issued. Detecting an existing
        /// handle is what makes the retry path idempotent.
        #[serde(default)]
        handle_id: Option<String>,
    },
    SqlDb {
        engine: String,
        engine_version: String,
        #[serde(default)]
        handle_id: Option<String>,
    },
}

impl ResourcePayload {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            ResourcePayload::VNet { .. } => ResourceType::VNet,
            ResourcePayload::SecurityGroup { .. } => ResourceType::SecurityGroup,
            ResourcePayload::SshKey { .. } => ResourceType::SshKey,
            ResourcePayload::Spec { .. } => ResourceType::Spec,
            ResourcePayload::Image { .. } => ResourceType::Image,
            ResourcePayload::CustomImage { .. } => ResourceType::CustomImage,
            ResourcePayload::DataDisk { .. } => ResourceType::DataDisk,
            ResourcePayload::K8sCluster { .. } => ResourceType::K8sCluster,
            ResourcePayload::Vpn { .. } => ResourceType::Vpn,
            ResourcePayload::SqlDb { .. } => ResourceType::SqlDb,
        }
    }
}

/// One subnet within a virtual network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    pub name: String,
    pub ipv4_cidr: String,
    #[serde(default)]
    pub zone: String,
}

/// One ingress/egress rule within a security group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallRule {
    /// "inbound" or "outbound".
    pub direction: String,
    pub protocol: String,
    #[serde(default)]
    pub ports: String,
    pub cidr: String,
}

/// One node group within a Kubernetes cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroup {
    pub name: String,
    /// Local image id, resolved to a provider-native name at provisioning.
    pub image_id: String,
    /// Local spec id, resolved likewise.
    pub spec_id: String,
    /// Local SSH key id, resolved likewise.
    pub ssh_key_id: String,
    pub desired_size: u32,
    pub min_size: u32,
    pub max_size: u32,
}

/// One endpoint of a site-to-site VPN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpnSite {
    pub connection_name: String,
    /// Local vNet id whose network the site terminates in.
    pub vnet_id: String,
    #[serde(default)]
    pub csp_vnet_name: String,
    #[serde(default)]
    pub cidr: String,
}
