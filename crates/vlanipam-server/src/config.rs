use std::env;
use std::path::PathBuf;
use std::time::Duration;
use vlanipam_core::{IpamError, Result, DEFAULT_KEY_PREFIX};
use vlanipam_store::normalize_endpoint;

const DEFAULT_NAMESPACE: &str = "kube-system";
const DEFAULT_MAX_WORKERS: usize = 20;
const DEFAULT_TOKEN_PATH: &str = "/root/.linode-cli/linode-cli";
const DEFAULT_REFRESH_MANIFEST: &str = "/etc/vlanipam/refresh-job.yaml";

/// Process configuration, resolved once at startup and owned by the
/// service state. Nothing reads the environment after this point.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Cloud region instances are inventoried from.
    pub region: String,
    /// Allocation store endpoints, normalized to `host:port`.
    pub etcd_endpoints: Vec<String>,
    /// Subnet releases are validated against. Only release needs it.
    pub subnet: Option<String>,
    /// Namespace refresh jobs are submitted to.
    pub namespace: String,
    /// TTL of the VLAN inventory cache; zero disables it.
    pub cache_ttl: Duration,
    /// Store prefix under which allocation keys live.
    pub key_prefix: String,
    /// Upper bound on concurrent per-instance inventory calls.
    pub max_workers: usize,
    /// linode-cli config file carrying the API token.
    pub linode_cli_config: PathBuf,
    /// Linode API base URL; overridable for tests.
    pub linode_api_url: String,
    /// Job manifest submitted by the refresh orchestrator.
    pub refresh_manifest: PathBuf,
}

impl ServiceConfig {
    /// Build the configuration from the environment.
    ///
    /// REGION and ETCD_ENDPOINTS are required; the caller is expected
    /// to exit non-zero when this fails at startup.
    pub fn from_env() -> Result<Self> {
        let region = required("REGION")?;
        let endpoints_raw = required("ETCD_ENDPOINTS")?;
        let etcd_endpoints: Vec<String> = endpoints_raw
            .split(',')
            .map(normalize_endpoint)
            .filter(|e| !e.is_empty())
            .collect();
        if etcd_endpoints.is_empty() {
            return Err(IpamError::missing_config("ETCD_ENDPOINTS"));
        }

        let cache_ttl_seconds: u64 = match env::var("CACHE_TTL_SECONDS") {
            Ok(raw) => raw.trim().parse().map_err(|_| {
                IpamError::invalid_input(format!("CACHE_TTL_SECONDS '{raw}' is not a number"))
            })?,
            Err(_) => 0,
        };

        Ok(Self {
            region,
            etcd_endpoints,
            subnet: optional("SUBNET"),
            namespace: optional("NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            cache_ttl: Duration::from_secs(cache_ttl_seconds),
            key_prefix: optional("ETCD_PREFIX").unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string()),
            max_workers: optional("MAX_WORKERS")
                .and_then(|raw| raw.trim().parse().ok())
                .unwrap_or(DEFAULT_MAX_WORKERS),
            linode_cli_config: optional("LINODE_CLI_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_PATH)),
            linode_api_url: optional("LINODE_API_URL")
                .unwrap_or_else(|| vlanipam_cloud::DEFAULT_API_BASE.to_string()),
            refresh_manifest: optional("REFRESH_MANIFEST")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_REFRESH_MANIFEST)),
        })
    }
}

fn required(name: &str) -> Result<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| IpamError::missing_config(name))
}

fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Default for ServiceConfig {
    /// Defaults for everything the environment does not have to
    /// provide; `region` and `etcd_endpoints` are placeholders a
    /// deployment must override.
    fn default() -> Self {
        Self {
            region: String::new(),
            etcd_endpoints: Vec::new(),
            subnet: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            cache_ttl: Duration::ZERO,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            max_workers: DEFAULT_MAX_WORKERS,
            linode_cli_config: PathBuf::from(DEFAULT_TOKEN_PATH),
            linode_api_url: vlanipam_cloud::DEFAULT_API_BASE.to_string(),
            refresh_manifest: PathBuf::from(DEFAULT_REFRESH_MANIFEST),
        }
    }
}
