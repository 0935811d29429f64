use clap::Parser;
use dicom_gateway::config::GatewayConfig;
use dicom_gateway::infrastructure::{processor, workspace};
use dicom_gateway::services::job_service::JobService;
use dicom_gateway::services::jobs::{JobQueue, JobRegistry};
use dicom_gateway::services::worker::BackgroundWorker;
use dicom_gateway::{AppState, create_app};
use dotenvy::dotenv;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port for the API server
    #[arg(short, long, default_value_t = 8000)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initial Environment & Logging Setup
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dicom_gateway=info,tower_http=info,audit=info,metrics=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting DICOM Gateway...");

    // 2. Configuration & Infrastructure
    let config = GatewayConfig::from_env();
    info!(
        "⚙️  Config: Max CSV={}KB, Cleanup={}, Timeout={}s, Workers={}, Queue={}, Grace={}s, Processor={}",
        config.max_csv_size / 1024,
        config.cleanup_staged_csv,
        config.job_timeout_secs,
        config.worker_concurrency,
        config.job_queue_size,
        config.shutdown_grace_secs,
        config.processor_type
    );

    let staging = workspace::setup_workspace(&config).await?;
    let processor_service = processor::setup_processor(&config).await;
    let jobs = Arc::new(JobService::new(staging, processor_service, &config));
    let registry = JobRegistry::with_limit(config.max_job_records);
    let (queue, receiver) = JobQueue::new(config.job_queue_size);

    // 3. Graceful Shutdown Channel & Worker
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker = BackgroundWorker::new(
        jobs.clone(),
        registry.clone(),
        receiver,
        shutdown_rx,
        &config,
    );
    let worker_handle = tokio::spawn(worker.run());
    info!("👷 Worker service initialized.");

    // 4. API Service
    let state = AppState {
        config: config.clone(),
        jobs,
        registry,
        queue,
    };

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>,
             latency: std::time::Duration,
             _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    let app = create_app(state).layer(trace_layer);
    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ Server ready at http://{}", addr);
    info!("📖 Swagger UI documentation: http://{}/swagger-ui", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    info!("🛑 Shutting down worker...");
    let _ = worker_handle.await;

    info!("👋 Gateway exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
