//! NAS Array Operator
//!
//! Provisions and supervises a parity-protected storage array on a single
//! host: partitions disks, assembles and starts the array, formats and
//! mounts filesystems, configures network shares, and runs background
//! parity checks, all observable through a polling REST API.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use nas_array_operator::{
    ApiContext, ApiServer, ApiServerConfig, ArrayConfig, ArrayOrchestrator, ArrayStatusReader,
    CommandRunnerRef, DiskInventory, Error, InventoryConfig, OrchestratorConfig, Result,
    RunnerConfig, SambaSettings, ScanSupervisor, ShareConfigWriter, StatusBoard, SystemRunner,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// NAS Array Operator - parity array provisioning and supervision
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// REST API bind address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8090")]
    api_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Array management binary
    #[arg(long, env = "ARRAY_TOOL", default_value = "nmdctl")]
    array_tool: String,

    /// Array descriptor file; its existence marks the array as configured
    #[arg(long, env = "ARRAY_DESCRIPTOR", default_value = "/nonraid.dat")]
    descriptor_path: PathBuf,

    /// Per-slot mount path prefix
    #[arg(long, env = "MOUNT_PREFIX", default_value = "/mnt/disk")]
    mount_prefix: String,

    /// Union pool mount path for merged shares
    #[arg(long, env = "POOL_PATH", default_value = "/mnt/storage")]
    pool_path: String,

    /// Share daemon configuration file
    #[arg(long, env = "SAMBA_CONF", default_value = "/etc/samba/smb.conf")]
    samba_conf: PathBuf,

    /// Run privileged commands directly instead of through sudo
    #[arg(long, env = "NO_SUDO")]
    no_sudo: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting NAS Array Operator");
    info!("  Version: {}", nas_array_operator::VERSION);
    info!("  REST API: {}", args.api_addr);
    info!("  Array tool: {}", args.array_tool);
    info!("  Mount prefix: {}", args.mount_prefix);

    // Command runner shared by every component
    let runner: CommandRunnerRef = Arc::new(SystemRunner::new(RunnerConfig {
        sudo: if args.no_sudo {
            None
        } else {
            Some("sudo".to_string())
        },
    }));

    let array = ArrayConfig {
        tool: args.array_tool.clone(),
        descriptor_path: args.descriptor_path.clone(),
        mount_prefix: args.mount_prefix.clone(),
        ..ArrayConfig::default()
    };

    // Status board holds the process-wide provisioning and scan records
    let board = StatusBoard::new();

    let inventory = Arc::new(DiskInventory::new(InventoryConfig::default(), runner.clone()));
    let reader = Arc::new(ArrayStatusReader::new(array.clone(), runner.clone()));
    let scan = ScanSupervisor::new(array.clone(), runner.clone(), board.clone());
    let shares = Arc::new(ShareConfigWriter::new(
        SambaSettings {
            conf_path: args.samba_conf.clone(),
            mount_prefix: args.mount_prefix.clone(),
            pool_path: args.pool_path.clone(),
            ..SambaSettings::default()
        },
        runner.clone(),
    ));
    let orchestrator = ArrayOrchestrator::new(
        OrchestratorConfig {
            array,
            ..OrchestratorConfig::default()
        },
        runner,
        board.clone(),
        scan.clone(),
        shares.clone(),
        inventory.clone(),
        reader.clone(),
    );

    // Start health server
    let health_addr = args.health_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Create and run API server
    let api_config = ApiServerConfig {
        rest_addr: args
            .api_addr
            .parse()
            .map_err(|e| Error::Configuration(format!("Invalid REST API address: {}", e)))?,
        ..Default::default()
    };

    let context = ApiContext {
        orchestrator,
        scan,
        board,
        inventory,
        reader,
        shares,
    };
    let api_server = ApiServer::new(api_config, context);

    info!("Starting API server");
    api_server.run().await?;

    info!("Operator shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse().unwrap())
        .add_directive("tower=warn".parse().unwrap())
        .add_directive("axum=info".parse().unwrap());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Health Server
// =============================================================================

async fn run_health_server(addr: &str) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let response = match req.uri().path() {
                "/healthz" | "/livez" => Response::builder()
                    .status(StatusCode::OK)
                    .body(Body::from("ok"))
                    .unwrap(),
                "/readyz" => Response::builder()
                    .status(StatusCode::OK)
                    .body(Body::from("ok"))
                    .unwrap(),
                _ => Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .body(Body::from("not found"))
                    .unwrap(),
            };
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Internal(format!("Invalid health server address: {}", e)))?;

    info!("Health server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};
    use prometheus::{Encoder, TextEncoder};

    // Register operator metrics
    let _ = prometheus::register_gauge!(
        "nas_array_data_disks",
        "Number of data disks in the array"
    );
    let _ = prometheus::register_gauge!(
        "nas_array_parity_valid",
        "Whether the parity is currently valid"
    );
    let _ = prometheus::register_counter!(
        "nas_array_provision_runs_total",
        "Total number of accepted provisioning runs"
    );
    let _ = prometheus::register_counter!(
        "nas_array_parity_checks_total",
        "Total number of parity checks started"
    );

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let response = match req.uri().path() {
                "/metrics" => {
                    let encoder = TextEncoder::new();
                    let metric_families = prometheus::gather();
                    let mut buffer = Vec::new();
                    encoder.encode(&metric_families, &mut buffer).unwrap();

                    Response::builder()
                        .status(StatusCode::OK)
                        .header("Content-Type", encoder.format_type())
                        .body(Body::from(buffer))
                        .unwrap()
                }
                _ => Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .body(Body::from("not found"))
                    .unwrap(),
            };
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Internal(format!("Invalid metrics server address: {}", e)))?;

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
