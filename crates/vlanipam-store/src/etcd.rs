use crate::error::{Result, StoreError};
use crate::{normalize_endpoint, AllocationStore, StoreConnector, StoredKey};
use async_trait::async_trait;
use etcd_client::{Client, Compare, CompareOp, ConnectOptions, GetOptions, Txn, TxnOp};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Connects to the first healthy endpoint of an etcd cluster.
///
/// Endpoints are tried in configuration order; the first one whose
/// `status()` call succeeds serves the whole request.
pub struct EtcdConnector {
    endpoints: Vec<String>,
}

impl EtcdConnector {
    pub fn new<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            endpoints: endpoints
                .into_iter()
                .map(|e| normalize_endpoint(e.as_ref()))
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }
}

#[async_trait]
impl StoreConnector for EtcdConnector {
    async fn connect(&self) -> Result<Arc<dyn AllocationStore>> {
        if self.endpoints.is_empty() {
            return Err(StoreError::unreachable("no endpoints configured"));
        }

        let options = ConnectOptions::new()
            .with_connect_timeout(CONNECT_TIMEOUT)
            .with_timeout(REQUEST_TIMEOUT);

        for endpoint in &self.endpoints {
            match Client::connect([endpoint.as_str()], Some(options.clone())).await {
                Ok(mut client) => match client.status().await {
                    Ok(_) => {
                        debug!("connected to etcd endpoint {endpoint}");
                        return Ok(Arc::new(EtcdStore { client }));
                    }
                    Err(e) => {
                        warn!("etcd endpoint {endpoint} failed status check: {e}");
                    }
                },
                Err(e) => {
                    warn!("could not connect to etcd endpoint {endpoint}: {e}");
                }
            }
        }

        Err(StoreError::unreachable(format!(
            "none of {} endpoint(s) answered",
            self.endpoints.len()
        )))
    }
}

/// etcd-backed allocation store.
pub struct EtcdStore {
    client: Client,
}

#[async_trait]
impl AllocationStore for EtcdStore {
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<StoredKey>> {
        let mut client = self.client.clone();
        let resp = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await?;
        Ok(resp
            .kvs()
            .iter()
            .map(|kv| StoredKey {
                key: String::from_utf8_lossy(kv.key()).into_owned(),
                value: String::from_utf8_lossy(kv.value()).into_owned(),
                version: kv.version(),
            })
            .collect())
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut client = self.client.clone();
        client.put(key, value, None).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut client = self.client.clone();
        let resp = client.delete(key, None).await?;
        Ok(resp.deleted() > 0)
    }

    async fn put_if_absent(&self, guards: &[String], key: &str, value: &str) -> Result<bool> {
        let compares: Vec<Compare> = guards
            .iter()
            .map(|guard| Compare::version(guard.as_str(), CompareOp::Equal, 0))
            .collect();
        let txn = Txn::new()
            .when(compares)
            .and_then(vec![TxnOp::put(key, value, None)]);

        let mut client = self.client.clone();
        let resp = client.txn(txn).await?;
        Ok(resp.succeeded())
    }

    async fn status(&self) -> Result<()> {
        let mut client = self.client.clone();
        client.status().await?;
        Ok(())
    }
}
