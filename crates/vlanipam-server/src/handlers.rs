use crate::error::Result;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use vlanipam_core::IpamError;

#[derive(Debug, Deserialize)]
pub struct AllocateRequest {
    pub subnet: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseRequest {
    pub ip_address: Option<String>,
}

/// POST /allocate
pub async fn allocate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AllocateRequest>,
) -> Result<Response> {
    let subnet = request
        .subnet
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| IpamError::invalid_input("subnet not provided"))?;

    info!("allocate requested for subnet {subnet}");
    let outcome = state.allocator.allocate(subnet).await?;

    Ok(Json(json!({
        "allocated_ip": outcome.allocated_ip,
        "ip": outcome.ip,
        "cidr": outcome.cidr,
    }))
    .into_response())
}

/// POST /release
pub async fn release(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReleaseRequest>,
) -> Result<Response> {
    let ip_address = request
        .ip_address
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| IpamError::invalid_input("ip_address not provided"))?;

    info!("release requested for {ip_address}");
    let bare = state.allocator.release(ip_address).await?;

    Ok(Json(json!({ "status": "IP released", "ip": bare })).into_response())
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    match state.health.check().await {
        Ok(report) => Json(json!({
            "status": "healthy",
            "latency_ms": report.latency_ms,
        }))
        .into_response(),
        Err(e) => {
            error!("health check failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "unhealthy", "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// GET /api/v1/vlan-ips
pub async fn list_vlan_ips(State(state): State<Arc<AppState>>) -> Result<Response> {
    let ips = state.allocator.list_ips().await?;
    Ok(Json(json!({ "ips": ips })).into_response())
}

/// POST /api/v1/refresh
pub async fn start_refresh(State(state): State<Arc<AppState>>) -> Result<Response> {
    let job_name = state.refresh.start().await?;
    Ok(Json(json!({ "jobName": job_name })).into_response())
}

/// GET /api/v1/refresh/{run}/detail
pub async fn refresh_detail(
    State(state): State<Arc<AppState>>,
    Path(run_name): Path<String>,
) -> Result<Response> {
    let detail = state.refresh.detail(&run_name).await?;
    Ok(Json(json!({
        "status": detail.status.as_str(),
        "startedAt": detail.started_at,
        "completedAt": detail.completed_at,
        "podName": detail.pod_name,
        "logs": detail.logs,
    }))
    .into_response())
}
