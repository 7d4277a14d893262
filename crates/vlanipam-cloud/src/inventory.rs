use crate::client::LinodeClient;
use crate::error::{CloudError, Result};
use crate::token::load_token;
use futures_util::{stream, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};
use vlanipam_core::normalize;

const PAGE_SIZE: u32 = 100;

/// Paginated list envelope shared by every Linode collection endpoint.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Page<T> {
    #[serde(default)]
    data: Vec<T>,
    #[serde(default)]
    pages: u32,
}

#[derive(Debug, Deserialize)]
struct InstanceSummary {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct ConfigSummary {
    id: i64,
}

/// The config *detail* view. The list view does not expand interfaces,
/// so each config is fetched individually.
#[derive(Debug, Deserialize)]
struct ConfigDetail {
    #[serde(default)]
    interfaces: Option<Vec<InterfaceEntry>>,
}

#[derive(Debug, Deserialize)]
struct InterfaceEntry {
    #[serde(default)]
    purpose: String,
    #[serde(default)]
    ipam_address: Option<String>,
}

fn parse_page<T: DeserializeOwned>(value: Value, url: &str) -> Result<Page<T>> {
    serde_json::from_value(value)
        .map_err(|_| CloudError::invalid_response(format!("unexpected response shape from {url}")))
}

/// Normalized addresses of every VLAN interface in a config detail.
fn vlan_addresses(detail: ConfigDetail) -> Vec<String> {
    detail
        .interfaces
        .unwrap_or_default()
        .into_iter()
        .filter(|iface| iface.purpose == "vlan")
        .filter_map(|iface| iface.ipam_address)
        .map(|address| normalize(&address))
        .filter(|bare| !bare.is_empty())
        .collect()
}

impl LinodeClient {
    /// Walk every instance in the region and collect the addresses
    /// bound to VLAN interfaces.
    ///
    /// Instances are fanned out with at most one outstanding call per
    /// instance, bounded by `min(max_workers, instance count)`.
    pub(crate) async fn collect_vlan_addresses(&self, region: &str) -> Result<Vec<String>> {
        let token = load_token(&self.token_path)?;
        let filter = format!(r#"{{"region": "{region}"}}"#);

        let mut instance_ids = Vec::new();
        let mut page = 1u32;
        loop {
            let url = format!(
                "{}/linode/instances?page={page}&page_size={PAGE_SIZE}",
                self.base_url
            );
            let parsed: Page<InstanceSummary> =
                parse_page(self.api_get(&token, &url, Some(&filter)).await?, &url)?;
            instance_ids.extend(parsed.data.into_iter().map(|instance| instance.id));
            if page >= parsed.pages.max(1) {
                break;
            }
            page += 1;
        }

        debug!(
            "found {} instance(s) in region {region}",
            instance_ids.len()
        );
        if instance_ids.is_empty() {
            return Ok(Vec::new());
        }

        let workers = self.max_workers.min(instance_ids.len());
        let per_instance: Vec<Vec<String>> = stream::iter(
            instance_ids
                .into_iter()
                .map(|id| self.instance_vlan_addresses(&token, id)),
        )
        .buffer_unordered(workers)
        .try_collect()
        .await?;

        Ok(per_instance.into_iter().flatten().collect())
    }

    async fn instance_vlan_addresses(&self, token: &str, instance_id: i64) -> Result<Vec<String>> {
        let list_url = format!("{}/linode/instances/{instance_id}/configs", self.base_url);
        let configs: Page<ConfigSummary> =
            parse_page(self.api_get(token, &list_url, None).await?, &list_url)?;

        let mut addresses = Vec::new();
        for config in configs.data {
            let detail_url = format!(
                "{}/linode/instances/{instance_id}/configs/{}",
                self.base_url, config.id
            );
            let detail: ConfigDetail =
                serde_json::from_value(self.api_get(token, &detail_url, None).await?).map_err(
                    |_| {
                        CloudError::invalid_response(format!(
                            "unexpected response shape from {detail_url}"
                        ))
                    },
                )?;
            for bare in vlan_addresses(detail) {
                trace!("found VLAN address {bare} on instance {instance_id}");
                addresses.push(bare);
            }
        }
        Ok(addresses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_envelope() {
        let value = json!({
            "data": [{"id": 101}, {"id": 102}],
            "page": 1,
            "pages": 3,
            "results": 201
        });
        let page: Page<InstanceSummary> = parse_page(value, "test").unwrap();
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.pages, 3);
    }

    #[test]
    fn test_page_shape_mismatch_is_invalid_response() {
        let value = json!({"data": "not-a-list"});
        let err = parse_page::<InstanceSummary>(value, "test").unwrap_err();
        assert!(matches!(err, CloudError::InvalidResponse { .. }));
    }

    #[test]
    fn test_vlan_addresses_filters_by_purpose() {
        let detail: ConfigDetail = serde_json::from_value(json!({
            "interfaces": [
                {"purpose": "public", "ipam_address": null},
                {"purpose": "vlan", "ipam_address": "192.168.0.9/24"},
                {"purpose": "vlan", "ipam_address": "192.168.0.10"},
                {"purpose": "vlan", "ipam_address": ""},
                {"purpose": "vpc", "ipam_address": "10.0.0.4/24"}
            ]
        }))
        .unwrap();

        assert_eq!(vlan_addresses(detail), vec!["192.168.0.9", "192.168.0.10"]);
    }

    #[test]
    fn test_vlan_addresses_tolerates_null_interfaces() {
        let detail: ConfigDetail = serde_json::from_value(json!({"interfaces": null})).unwrap();
        assert!(vlan_addresses(detail).is_empty());

        let detail: ConfigDetail = serde_json::from_value(json!({})).unwrap();
        assert!(vlan_addresses(detail).is_empty());
    }
}
