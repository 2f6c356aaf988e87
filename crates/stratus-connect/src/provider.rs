//! Provider-abstraction service client.
//!
//! The provider-abstraction service exposes one uniform REST surface per
//! resource kind (`vpc`, `securitygroup`, `keypair`, ...); every request
//! carries a `ConnectionName` selecting the provider+region+credential
//! triple, and a kind-specific `ReqInfo` payload. Successful responses
//! carry a provider-native id/name pair plus a free-form attribute list.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ConnectConfig;
use crate::error::{ConnectError, ConnectResult};

/// Provider-native identifier pair: the name the caller asked for and the
/// id the provider assigned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Iid {
    #[serde(rename = "NameId")]
    pub name_id: String,
    #[serde(rename = "SystemId")]
    pub system_id: String,
}

/// One key/value attribute as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagEntry {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value")]
    pub value: String,
}

/// A resource description returned by the provider-abstraction service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderResource {
    #[serde(rename = "IId")]
    pub iid: Iid,
    #[serde(rename = "KeyValueList", default)]
    pub key_value_list: Vec<TagEntry>,
}

impl ProviderResource {
    /// Look up a free-form attribute by key.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.key_value_list
            .iter()
            .find(|kv| kv.key == key)
            .map(|kv| kv.value.as_str())
    }
}

/// Wire shape of a create request.
#[derive(Serialize)]
struct ProviderRequest<'a> {
    #[serde(rename = "ConnectionName")]
    connection_name: &'a str,
    #[serde(rename = "ReqInfo")]
    req_info: &'a serde_json::Value,
}

/// Wire shape of requests that only need the connection.
#[derive(Serialize)]
struct ConnectionRequest<'a> {
    #[serde(rename = "ConnectionName")]
    connection_name: &'a str,
}

/// Interface to the provider-abstraction service.
///
/// `segment` is the resource-kind path segment (`vpc`, `keypair`, ...);
/// `connection` selects the provider+region+credential triple.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Create a provider-native resource.
    async fn create_resource(
        &self,
        segment: &str,
        connection: &str,
        req_info: serde_json::Value,
    ) -> ConnectResult<ProviderResource>;

    /// Read a provider-native resource by name.
    async fn get_resource(
        &self,
        segment: &str,
        connection: &str,
        name: &str,
    ) -> ConnectResult<ProviderResource>;

    /// Delete a provider-native resource. `force` instructs the service to
    /// ignore provider-side dependency errors.
    async fn delete_resource(
        &self,
        segment: &str,
        connection: &str,
        name: &str,
        force: bool,
    ) -> ConnectResult<()>;

    /// Read the provider-side tags of a resource.
    async fn get_tags(&self, connection: &str, system_id: &str) -> ConnectResult<Vec<TagEntry>>;

    /// Merge tags into a resource's provider-side tag set.
    async fn merge_tags(
        &self,
        connection: &str,
        system_id: &str,
        tags: &[TagEntry],
    ) -> ConnectResult<()>;

    /// Remove one tag from a resource's provider-side tag set.
    async fn remove_tag(&self, connection: &str, system_id: &str, key: &str) -> ConnectResult<()>;
}

/// HTTP implementation of [`ProviderClient`].
pub struct HttpProviderClient {
    client: reqwest::Client,
    config: ConnectConfig,
}

impl HttpProviderClient {
    pub fn new(config: ConnectConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Probe the service's health endpoint with the short probe timeout.
    pub async fn health(&self) -> ConnectResult<()> {
        let url = format!("{}/readyz", self.config.endpoint);
        let resp = self
            .client
            .get(&url)
            .timeout(self.config.probe_timeout())
            .send()
            .await?;
        check(resp).await.map(|_| ())
    }

    /// Cluster mutations routinely take many minutes; everything else gets
    /// the default timeout.
    fn mutation_timeout_for(&self, segment: &str) -> std::time::Duration {
        if segment == "cluster" {
            self.config.mutation_timeout()
        } else {
            self.config.request_timeout()
        }
    }
}

/// Surface non-2xx responses as an error carrying the raw body.
async fn check(resp: reqwest::Response) -> ConnectResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        let body = resp.text().await.unwrap_or_default();
        Err(ConnectError::from_response(status, body))
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn create_resource(
        &self,
        segment: &str,
        connection: &str,
        req_info: serde_json::Value,
    ) -> ConnectResult<ProviderResource> {
        let url = format!("{}/{}", self.config.endpoint, segment);
        debug!(%url, %connection, "creating provider resource");
        let resp = self
            .client
            .post(&url)
            .timeout(self.mutation_timeout_for(segment))
            .json(&ProviderRequest {
                connection_name: connection,
                req_info: &req_info,
            })
            .send()
            .await?;
        let resp = check(resp).await?;
        resp.json::<ProviderResource>()
            .await
            .map_err(|e| ConnectError::Decode(e.to_string()))
    }

    async fn get_resource(
        &self,
        segment: &str,
        connection: &str,
        name: &str,
    ) -> ConnectResult<ProviderResource> {
        let url = format!("{}/{}/{}", self.config.endpoint, segment, name);
        let resp = self
            .client
            .get(&url)
            .timeout(self.config.request_timeout())
            .json(&ConnectionRequest {
                connection_name: connection,
            })
            .send()
            .await?;
        let resp = check(resp).await?;
        resp.json::<ProviderResource>()
            .await
            .map_err(|e| ConnectError::Decode(e.to_string()))
    }

    async fn delete_resource(
        &self,
        segment: &str,
        connection: &str,
        name: &str,
        force: bool,
    ) -> ConnectResult<()> {
        let mut url = format!("{}/{}/{}", self.config.endpoint, segment, name);
        if force {
            url.push_str("?force=true");
        }
        debug!(%url, %connection, "deleting provider resource");
        let resp = self
            .client
            .delete(&url)
            .timeout(self.mutation_timeout_for(segment))
            .json(&ConnectionRequest {
                connection_name: connection,
            })
            .send()
            .await?;
        check(resp).await.map(|_| ())
    }

    async fn get_tags(&self, connection: &str, system_id: &str) -> ConnectResult<Vec<TagEntry>> {
        let url = format!("{}/tag/{}", self.config.endpoint, system_id);
        let resp = self
            .client
            .get(&url)
            .timeout(self.config.request_timeout())
            .json(&ConnectionRequest {
                connection_name: connection,
            })
            .send()
            .await?;
        let resp = check(resp).await?;
        resp.json::<Vec<TagEntry>>()
            .await
            .map_err(|e| ConnectError::Decode(e.to_string()))
    }

    async fn merge_tags(
        &self,
        connection: &str,
        system_id: &str,
        tags: &[TagEntry],
    ) -> ConnectResult<()> {
        #[derive(Serialize)]
        struct TagRequest<'a> {
            #[serde(rename = "ConnectionName")]
            connection_name: &'a str,
            #[serde(rename = "TagList")]
            tag_list: &'a [TagEntry],
        }
        let url = format!("{}/tag/{}", self.config.endpoint, system_id);
        let resp = self
            .client
            .post(&url)
            .timeout(self.config.request_timeout())
            .json(&TagRequest {
                connection_name: connection,
                tag_list: tags,
            })
            .send()
            .await?;
        check(resp).await.map(|_| ())
    }

    async fn remove_tag(&self, connection: &str, system_id: &str, key: &str) -> ConnectResult<()> {
        let url = format!("{}/tag/{}/{}", self.config.endpoint, system_id, key);
        let resp = self
            .client
            .delete(&url)
            .timeout(self.config.request_timeout())
            .json(&ConnectionRequest {
                connection_name: connection,
            })
            .send()
            .await?;
        check(resp).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_resource_decodes_wire_shape() {
        let body = r#"{
            "IId": { "NameId": "vnet-01", "SystemId": "vpc-0a1b2c3d" },
            "KeyValueList": [
                { "Key": "Status", "Value": "Available" },
                { "Key": "CidrBlock", "Value": "10.0.0.0/16" }
            ]
        }"#;
        let res: ProviderResource = serde_json::from_str(body).unwrap();
        assert_eq!(res.iid.name_id, "vnet-01");
        assert_eq!(res.iid.system_id, "vpc-0a1b2c3d");
        assert_eq!(res.attr("Status"), Some("Available"));
        assert_eq!(res.attr("Nope"), None);
    }

    #[test]
    fn create_request_serializes_connection_and_req_info() {
        let req_info = serde_json::json!({ "Name": "vnet-01" });
        let req = ProviderRequest {
            connection_name: "aws-us-east-1",
            req_info: &req_info,
        };
        let wire = serde_json::to_value(&req).unwrap();
        assert_eq!(wire["ConnectionName"], "aws-us-east-1");
        assert_eq!(wire["ReqInfo"]["Name"], "vnet-01");
    }

    #[test]
    fn missing_key_value_list_defaults_to_empty() {
        let body = r#"{ "IId": { "NameId": "k", "SystemId": "s" } }"#;
        let res: ProviderResource = serde_json::from_str(body).unwrap();
        assert!(res.key_value_list.is_empty());
    }
}
