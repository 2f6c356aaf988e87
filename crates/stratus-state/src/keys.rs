//! Key layout for the resource store.
//!
//! Resources live under `/ns/{namespace}/resources/{type}/{id}`; child
//! resources append `/{childType}/{childId}`; label entries live under the
//! parallel namespace `/label/{type}/{uid}`. Provider catalog entries
//! (specs, images) use a composite `{provider}+{region}[+{zone}]+{name}`
//! id, lower-cased, which doubles as a natural dedup key when importing
//! provider catalogs.

use crate::error::{StateError, StateResult};
use crate::types::ResourceType;

/// Build the hierarchical KV key for a resource.
pub fn resource_key(ns: &str, ty: ResourceType, id: &str) -> String {
    format!("/ns/{ns}/resources/{}/{id}", ty.as_str())
}

/// Build the KV prefix covering all resources of one type in a namespace.
pub fn resource_prefix(ns: &str, ty: ResourceType) -> String {
    format!("/ns/{ns}/resources/{}/", ty.as_str())
}

/// Build the KV key for a child resource.
pub fn child_resource_key(
    ns: &str,
    ty: ResourceType,
    id: &str,
    child_ty: ResourceType,
    child_id: &str,
) -> String {
    format!(
        "/ns/{ns}/resources/{}/{id}/{}/{child_id}",
        ty.as_str(),
        child_ty.as_str()
    )
}

/// Build the KV key for a resource's label entry. Keyed by uid, not id,
/// so the entry survives renames.
pub fn label_key(ty: ResourceType, uid: &str) -> String {
    format!("/label/{}/{uid}", ty.as_str())
}

/// Build the KV prefix covering all label entries of one type.
pub fn label_prefix(ty: ResourceType) -> String {
    format!("/label/{}/", ty.as_str())
}

/// Build the composite catalog key for provider-scoped specs and images:
/// non-empty components lower-cased and joined with `+`. A zone without a
/// region is ignored, so the key stays reversible.
pub fn provider_catalog_key(provider: &str, region: &str, zone: &str, name: &str) -> String {
    let mut parts = vec![provider.to_lowercase()];
    if !region.is_empty() {
        parts.push(region.to_lowercase());
        if !zone.is_empty() {
            parts.push(zone.to_lowercase());
        }
    }
    parts.push(name.to_lowercase());
    parts.join("+")
}

/// Split a composite catalog key back into (provider, region, zone, name).
/// Omitted region/zone segments come back as empty strings.
pub fn resolve_provider_catalog_key(key: &str) -> StateResult<(String, String, String, String)> {
    let parts: Vec<&str> = key.split('+').collect();
    match parts.as_slice() {
        [provider, name] => Ok((
            provider.to_lowercase(),
            String::new(),
            String::new(),
            name.to_lowercase(),
        )),
        [provider, region, name] => Ok((
            provider.to_lowercase(),
            region.to_lowercase(),
            String::new(),
            name.to_lowercase(),
        )),
        [provider, region, zone, name] => Ok((
            provider.to_lowercase(),
            region.to_lowercase(),
            zone.to_lowercase(),
            name.to_lowercase(),
        )),
        _ => Err(StateError::Validation(format!(
            "invalid provider catalog key {key:?}: expected 2-4 '+'-separated segments"
        ))),
    }
}

/// Validate a caller-chosen namespace or resource id: non-empty, no path
/// separators, no whitespace.
pub fn validate_id(kind: &str, value: &str) -> StateResult<()> {
    if value.is_empty() {
        return Err(StateError::Validation(format!("{kind} must not be empty")));
    }
    if value.contains('/') || value.chars().any(char::is_whitespace) {
        return Err(StateError::Validation(format!(
            "{kind} {value:?} must not contain '/' or whitespace"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_key_layout() {
        assert_eq!(
            resource_key("ns1", ResourceType::VNet, "net-a"),
            "/ns/ns1/resources/vNet/net-a"
        );
        assert_eq!(
            child_resource_key(
                "ns1",
                ResourceType::VNet,
                "net-a",
                ResourceType::SecurityGroup,
                "sg-1"
            ),
            "/ns/ns1/resources/vNet/net-a/securityGroup/sg-1"
        );
        assert_eq!(label_key(ResourceType::Vpn, "u123"), "/label/vpn/u123");
    }

    #[test]
    fn catalog_key_joins_non_empty_segments() {
        assert_eq!(
            provider_catalog_key("AWS", "us-east-1", "", "t2.micro"),
            "aws+us-east-1+t2.micro"
        );
        assert_eq!(
            provider_catalog_key("gcp", "asia-northeast3", "asia-northeast3-a", "e2-small"),
            "gcp+asia-northeast3+asia-northeast3-a+e2-small"
        );
        assert_eq!(provider_catalog_key("azure", "", "", "Standard_B1s"), "azure+standard_b1s");
        // A zone without a region is dropped to keep the key reversible.
        assert_eq!(provider_catalog_key("aws", "", "zone-1", "x"), "aws+x");
    }

    #[test]
    fn catalog_key_round_trips_lower_cased() {
        for (provider, region, zone, name) in [
            ("AWS", "us-east-1", "", "t2.micro"),
            ("gcp", "asia-northeast3", "asia-northeast3-a", "e2-small"),
            ("Azure", "", "", "Standard_B1s"),
        ] {
            let key = provider_catalog_key(provider, region, zone, name);
            let (p, r, z, n) = resolve_provider_catalog_key(&key).unwrap();
            assert_eq!(p, provider.to_lowercase());
            assert_eq!(r, region.to_lowercase());
            assert_eq!(z, zone.to_lowercase());
            assert_eq!(n, name.to_lowercase());
        }
    }

    #[test]
    fn catalog_key_rejects_single_segment() {
        assert!(resolve_provider_catalog_key("t2.micro").is_err());
        assert!(resolve_provider_catalog_key("a+b+c+d+e").is_err());
    }

    #[test]
    fn id_validation() {
        assert!(validate_id("namespace", "ns1").is_ok());
        assert!(validate_id("id", "aws+us-east-1+t2.micro").is_ok());
        assert!(validate_id("namespace", "").is_err());
        assert!(validate_id("id", "a/b").is_err());
        assert!(validate_id("id", "a b").is_err());
    }
}
