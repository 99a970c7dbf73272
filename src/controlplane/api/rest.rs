//! REST API handlers
//!
//! Implements the storage endpoints the dashboard polls: disk inventory,
//! array status, the asynchronous provisioning entry points, the parity
//! check entry points, disk add/replace, and the share listing.
//!
//! Envelope policy: polling endpoints always answer 200 with
//! `success: true` and carry operation failure in the nested `error`
//! field; synchronous endpoints use HTTP status for both validation and
//! execution failures, exposing only short messages.

use crate::controlplane::orchestrator::ArrayOrchestrator;
use crate::controlplane::scan::ScanSupervisor;
use crate::controlplane::state::StatusBoard;
use crate::domain::model::{
    ArraySnapshot, DiskDescriptor, ProvisioningState, ScanState, ShareInfo, ShareMode,
};
use crate::error::Error;
use crate::hardware::array::ArrayStatusReader;
use crate::hardware::inventory::DiskInventory;
use crate::shares::samba::ShareConfigWriter;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

// =============================================================================
// Request/Response Types
// =============================================================================

/// A single disk path or a list of them
///
/// The configure body historically allowed either shape for the parity
/// disk; more than one entry is rejected by validation, not by parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(path) => vec![path],
            OneOrMany::Many(paths) => paths,
        }
    }
}

/// Array configure request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureArrayRequest {
    #[serde(default)]
    pub data_disks: Vec<String>,
    #[serde(default)]
    pub parity_disk: Option<OneOrMany>,
    #[serde(default)]
    pub share_mode: ShareMode,
}

/// Add-disk request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddDiskRequest {
    pub disk: String,
}

/// Replace-disk request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceDiskRequest {
    pub disk: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageResponse {
    success: bool,
    message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    success: bool,
    error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct DisksResponse {
    success: bool,
    disks: Vec<DiskDescriptor>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ArrayStatusResponse {
    success: bool,
    #[serde(flatten)]
    snapshot: ArraySnapshot,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProvisioningProgressResponse {
    success: bool,
    #[serde(flatten)]
    state: ProvisioningState,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanProgressResponse {
    success: bool,
    #[serde(flatten)]
    state: ScanState,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddDiskResponse {
    success: bool,
    message: String,
    slot: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SharesResponse {
    success: bool,
    shares: Vec<ShareInfo>,
}

// =============================================================================
// API Context
// =============================================================================

/// Shared context for API handlers
#[derive(Clone)]
pub struct ApiContext {
    pub orchestrator: Arc<ArrayOrchestrator>,
    pub scan: Arc<ScanSupervisor>,
    pub board: Arc<StatusBoard>,
    pub inventory: Arc<DiskInventory>,
    pub reader: Arc<ArrayStatusReader>,
    pub shares: Arc<ShareConfigWriter>,
}

// =============================================================================
// REST Router
// =============================================================================

/// REST API router builder
pub struct RestRouter {
    context: ApiContext,
}

impl RestRouter {
    pub fn new(context: ApiContext) -> Self {
        Self { context }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        Router::new()
            // Inventory
            .route("/v1/storage/disks", get(list_disks))
            // Array status and lifecycle
            .route("/v1/storage/array/status", get(array_status))
            .route("/v1/storage/array/start", post(start_array))
            .route("/v1/storage/array/stop", post(stop_array))
            // Provisioning pipeline
            .route("/v1/storage/array/configure", post(configure_array))
            .route(
                "/v1/storage/array/configure/progress",
                get(configure_progress),
            )
            .route(
                "/v1/storage/array/configure/cancel",
                post(cancel_configure),
            )
            // Parity check
            .route("/v1/storage/array/check", post(start_check))
            .route("/v1/storage/array/check/progress", get(check_progress))
            // Disk membership
            .route("/v1/storage/array/add", post(add_disk))
            .route("/v1/storage/array/replace/:slot", post(replace_disk))
            // Shares
            .route("/v1/storage/shares", get(list_shares))
            // Health
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .with_state(self.context)
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// List physical disks
async fn list_disks(State(context): State<ApiContext>) -> impl IntoResponse {
    match context.inventory.list_disks().await {
        Ok(disks) => (
            StatusCode::OK,
            Json(DisksResponse {
                success: true,
                disks,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Disk listing failed: {}", e);
            failure(&e, "Failed to list disks")
        }
    }
}

/// Current array snapshot, with live scan state merged in
async fn array_status(State(context): State<ApiContext>) -> impl IntoResponse {
    match context.reader.snapshot(context.board.scan()).await {
        Ok(snapshot) => (
            StatusCode::OK,
            Json(ArrayStatusResponse {
                success: true,
                snapshot,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Array status query failed: {}", e);
            failure(&e, "Failed to get array status")
        }
    }
}

/// Accept a provisioning request and run the pipeline in the background
async fn configure_array(
    State(context): State<ApiContext>,
    Json(request): Json<ConfigureArrayRequest>,
) -> impl IntoResponse {
    let parity = request
        .parity_disk
        .map(OneOrMany::into_vec)
        .unwrap_or_default();

    match context
        .orchestrator
        .clone()
        .configure(request.data_disks, parity, request.share_mode)
        .await
    {
        Ok(()) => message(StatusCode::OK, "Configuration started"),
        Err(e) => {
            info!("Configure rejected: {}", e);
            failure(&e, "Failed to start configuration")
        }
    }
}

/// Poll the provisioning record
async fn configure_progress(State(context): State<ApiContext>) -> impl IntoResponse {
    Json(ProvisioningProgressResponse {
        success: true,
        state: context.board.provisioning(),
    })
}

/// Cancel the active provisioning run
async fn cancel_configure(State(context): State<ApiContext>) -> impl IntoResponse {
    match context.orchestrator.cancel_provisioning() {
        Ok(()) => message(StatusCode::OK, "Cancellation requested"),
        Err(e) => failure(&e, "Failed to cancel configuration"),
    }
}

/// Bring the array online
async fn start_array(State(context): State<ApiContext>) -> impl IntoResponse {
    match context.orchestrator.start_array().await {
        Ok(()) => message(StatusCode::OK, "Array started"),
        Err(e) => {
            error!("Array start failed: {}", e);
            failure(&e, "Failed to start array")
        }
    }
}

/// Take the array offline
async fn stop_array(State(context): State<ApiContext>) -> impl IntoResponse {
    match context.orchestrator.stop_array().await {
        Ok(()) => message(StatusCode::OK, "Array stopped"),
        Err(e) => {
            error!("Array stop failed: {}", e);
            failure(&e, "Failed to stop array")
        }
    }
}

/// Start a standalone parity check
async fn start_check(State(context): State<ApiContext>) -> impl IntoResponse {
    match context.scan.start(None, false).await {
        Ok(()) => message(StatusCode::OK, "Parity check started"),
        Err(e) => {
            info!("Parity check not started: {}", e);
            failure(&e, "Failed to start parity check")
        }
    }
}

/// Poll the scan record
async fn check_progress(State(context): State<ApiContext>) -> impl IntoResponse {
    Json(ScanProgressResponse {
        success: true,
        state: context.board.scan(),
    })
}

/// Partition, add, format, and mount a new data disk
async fn add_disk(
    State(context): State<ApiContext>,
    Json(request): Json<AddDiskRequest>,
) -> impl IntoResponse {
    match context.orchestrator.add_disk(&request.disk).await {
        Ok(slot) => (
            StatusCode::OK,
            Json(AddDiskResponse {
                success: true,
                message: "Disk added".to_string(),
                slot,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Add disk failed: {}", e);
            failure(&e, "Failed to add disk")
        }
    }
}

/// Replace the disk in a slot and start the rebuild
async fn replace_disk(
    State(context): State<ApiContext>,
    Path(slot): Path<u32>,
    Json(request): Json<ReplaceDiskRequest>,
) -> impl IntoResponse {
    match context.orchestrator.replace_disk(slot, &request.disk).await {
        Ok(()) => message(StatusCode::OK, "Disk replacement started"),
        Err(e) => {
            error!("Replace disk failed: {}", e);
            failure(&e, "Failed to replace disk")
        }
    }
}

/// Shares parsed from the live daemon configuration
async fn list_shares(State(context): State<ApiContext>) -> impl IntoResponse {
    match context.shares.list_shares().await {
        Ok(shares) => (
            StatusCode::OK,
            Json(SharesResponse {
                success: true,
                shares,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Share listing failed: {}", e);
            failure(&e, "Failed to get shares")
        }
    }
}

/// Health check
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness check
async fn readiness_check() -> impl IntoResponse {
    (StatusCode::OK, "ready")
}

// =============================================================================
// Response Helpers
// =============================================================================

fn message(status: StatusCode, text: &str) -> axum::response::Response {
    (
        status,
        Json(MessageResponse {
            success: true,
            message: text.to_string(),
        }),
    )
        .into_response()
}

/// Map an error onto the wire: rejections carry their own message, server
/// failures only the caller-supplied summary
fn failure(error: &Error, summary: &str) -> axum::response::Response {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let text = if error.is_rejection() {
        error.to_string()
    } else {
        summary.to_string()
    };
    (
        status,
        Json(ErrorResponse {
            success: false,
            error: text,
        }),
    )
        .into_response()
}
