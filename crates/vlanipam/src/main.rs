use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use vlanipam_cloud::{CloudInventory, LinodeClient};
use vlanipam_server::{ApiServer, AppState, Config as ApiConfig, KubeRefresh, ServiceConfig};
use vlanipam_store::{EtcdConnector, StoreConnector};

#[derive(Parser)]
#[command(
    name = "vlanipam",
    about = "VLAN IP allocation control plane for Linode instances"
)]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: String,

    /// Override the refresh job manifest path
    #[arg(long)]
    refresh_manifest: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Startup fails hard when REGION or ETCD_ENDPOINTS is unset
    let mut config = ServiceConfig::from_env()?;
    if let Some(path) = cli.refresh_manifest {
        config.refresh_manifest = path;
    }
    let config = Arc::new(config);

    let listen_addr: SocketAddr = cli
        .bind
        .parse()
        .map_err(|e| miette::miette!("Invalid bind address '{}': {}", cli.bind, e))?;

    info!(
        "Starting vlanipam for region '{}' with {} store endpoint(s)",
        config.region,
        config.etcd_endpoints.len()
    );

    let connector: Arc<dyn StoreConnector> =
        Arc::new(EtcdConnector::new(config.etcd_endpoints.clone()));
    let cloud: Arc<dyn CloudInventory> = Arc::new(LinodeClient::new(
        config.linode_api_url.clone(),
        config.linode_cli_config.clone(),
        config.max_workers,
    )?);
    let refresh = Arc::new(KubeRefresh::new(
        config.refresh_manifest.clone(),
        config.namespace.clone(),
    ));

    let state = Arc::new(AppState::new(config, connector, cloud, refresh));

    let token = CancellationToken::new();
    let server = ApiServer::new(ApiConfig { listen_addr }, state);
    let server_token = token.clone();

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run(server_token).await {
            error!("API server error: {}", e);
        }
    });

    let sig = shutdown_signal().await;
    info!("Received {}, shutting down gracefully...", sig);
    token.cancel();

    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), server_handle).await;
    info!("Shutdown complete");

    Ok(())
}

/// Wait for either SIGINT (ctrl-c) or SIGTERM, returning which one fired.
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}
