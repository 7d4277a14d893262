use async_trait::async_trait;
use chrono::SecondsFormat;
use k8s_openapi::api::batch::v1::{Job, JobStatus};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, LogParams, PostParams};
use rand::Rng;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use vlanipam_core::{IpamError, Result};

const LOG_TAIL_LINES: i64 = 500;
const FALLBACK_JOB_NAME: &str = "vlan-ip-refresh";

/// Reconciliation run state, derived from the Job's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStatus {
    Running,
    Succeeded,
    Failed,
}

impl RefreshStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshStatus::Running => "Running",
            RefreshStatus::Succeeded => "Succeeded",
            RefreshStatus::Failed => "Failed",
        }
    }
}

/// Everything the detail endpoint reports about one run.
#[derive(Debug, Clone)]
pub struct RefreshDetail {
    pub status: RefreshStatus,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub pod_name: Option<String>,
    pub logs: Option<String>,
}

/// Submits and inspects reconciliation runs.
#[async_trait]
pub trait RefreshDriver: Send + Sync {
    /// Submit a one-shot reconciliation job; returns the run name.
    async fn start(&self) -> Result<String>;

    /// Status, pod, and tail logs for a prior run.
    async fn detail(&self, run_name: &str) -> Result<RefreshDetail>;
}

/// Drives reconciliation through the Kubernetes batch API.
///
/// The manifest on disk is submitted as-is apart from its metadata
/// name, which gains a unique suffix per run, and its namespace. The
/// client connects per call, matching the store's
/// connection-per-operation policy.
pub struct KubeRefresh {
    manifest_path: PathBuf,
    namespace: String,
}

impl KubeRefresh {
    pub fn new(manifest_path: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
            namespace: namespace.into(),
        }
    }

    async fn client(&self) -> Result<kube::Client> {
        kube::Client::try_default()
            .await
            .map_err(|e| IpamError::refresh_failed(format!("cannot reach the cluster: {e}")))
    }
}

#[async_trait]
impl RefreshDriver for KubeRefresh {
    async fn start(&self) -> Result<String> {
        let job = load_manifest(&self.manifest_path)?;
        let (job, run_name) = prepare_run(job, &self.namespace);

        let jobs: Api<Job> = Api::namespaced(self.client().await?, &self.namespace);
        jobs.create(&PostParams::default(), &job)
            .await
            .map_err(|e| IpamError::refresh_failed(format!("job submission failed: {e}")))?;

        info!("submitted refresh job {run_name} in namespace {}", self.namespace);
        Ok(run_name)
    }

    async fn detail(&self, run_name: &str) -> Result<RefreshDetail> {
        let client = self.client().await?;
        let jobs: Api<Job> = Api::namespaced(client.clone(), &self.namespace);
        let job = jobs
            .get(run_name)
            .await
            .map_err(|e| IpamError::refresh_failed(format!("cannot read job {run_name}: {e}")))?;

        let status = classify_job(job.status.as_ref());
        let started_at = job
            .status
            .as_ref()
            .and_then(|s| s.start_time.as_ref())
            .map(|t| t.0.to_rfc3339_opts(SecondsFormat::Secs, true));
        let completed_at = job
            .status
            .as_ref()
            .and_then(|s| s.completion_time.as_ref())
            .map(|t| t.0.to_rfc3339_opts(SecondsFormat::Secs, true));

        let pods: Api<Pod> = Api::namespaced(client, &self.namespace);
        let pod_name = match pods.list(&ListParams::default()).await {
            Ok(list) => list
                .items
                .into_iter()
                .filter_map(|pod| pod.metadata.name)
                .find(|name| name.contains(run_name)),
            Err(e) => {
                warn!("cannot list pods for run {run_name}: {e}");
                None
            }
        };

        // log retrieval is best-effort and never fails the lookup
        let logs = match &pod_name {
            Some(name) => {
                let params = LogParams {
                    tail_lines: Some(LOG_TAIL_LINES),
                    ..LogParams::default()
                };
                match pods.logs(name, &params).await {
                    Ok(text) => Some(text),
                    Err(e) => {
                        warn!("cannot fetch logs for pod {name}: {e}");
                        None
                    }
                }
            }
            None => None,
        };

        Ok(RefreshDetail {
            status,
            started_at,
            completed_at,
            pod_name,
            logs,
        })
    }
}

/// Read and parse the job manifest from disk.
fn load_manifest(path: &Path) -> Result<Job> {
    let manifest = std::fs::read_to_string(path).map_err(|e| {
        IpamError::refresh_failed(format!("cannot read job manifest {}: {e}", path.display()))
    })?;
    serde_yaml::from_str(&manifest).map_err(|e| {
        IpamError::refresh_failed(format!(
            "job manifest {} is not a valid Job: {e}",
            path.display()
        ))
    })
}

/// Give a manifest a unique run name and pin its namespace. Only these
/// two metadata fields are mutated.
fn prepare_run(mut job: Job, namespace: &str) -> (Job, String) {
    let base_name = job
        .metadata
        .name
        .clone()
        .unwrap_or_else(|| FALLBACK_JOB_NAME.to_string());
    let run_name = format!("{base_name}-{}", run_suffix());
    job.metadata.name = Some(run_name.clone());
    job.metadata.namespace = Some(namespace.to_string());
    (job, run_name)
}

/// Six hex characters appended to the manifest's base name.
fn run_suffix() -> String {
    format!("{:06x}", rand::thread_rng().gen_range(0..0x0100_0000u32))
}

/// Map a Job's status to the run state: any true `Failed` condition
/// fails the run; otherwise a completion timestamp means success.
fn classify_job(status: Option<&JobStatus>) -> RefreshStatus {
    let Some(status) = status else {
        return RefreshStatus::Running;
    };
    let failed = status
        .conditions
        .as_ref()
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Failed" && c.status == "True")
        })
        .unwrap_or(false);
    if failed {
        return RefreshStatus::Failed;
    }
    if status.completion_time.is_some() {
        return RefreshStatus::Succeeded;
    }
    RefreshStatus::Running
}
