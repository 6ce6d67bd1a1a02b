//! Axum API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vscan_api::{create_router, metrics, ApiConfig, AppState};
use vscan_inference::{BackendConfig, BackendSlot};
use vscan_media::{FfmpegDecoder, HttpFetcher};
use vscan_pipeline::{AnalysisService, PipelineConfig, TempSweeper};

const DEFAULT_LOG_DIRECTIVES: &str = "vscan=info,ort=warn";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // reqwest runs on rustls 0.23, which needs a process-wide provider
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    init_tracing();

    info!("Starting vscan-api");

    let pipeline_config = PipelineConfig::from_env();
    pipeline_config
        .validate()
        .context("invalid pipeline configuration")?;
    let backend_config = BackendConfig::from_env();
    let api_config = ApiConfig::from_env(pipeline_config.max_video_size_bytes);

    info!(
        "API config: host={}, port={}, environment={}",
        api_config.host, api_config.port, api_config.environment
    );

    let metrics_handle = if api_config.metrics_enabled {
        match metrics::init_metrics() {
            Ok(handle) => {
                info!("Prometheus metrics enabled at /metrics");
                Some(handle)
            }
            Err(e) => {
                warn!("Failed to install Prometheus recorder: {}", e);
                None
            }
        }
    } else {
        None
    };

    // The server answers right away; jobs fail with backend_not_ready until loading finishes
    let backend = Arc::new(BackendSlot::empty());
    let input_size = backend_config.input_size;
    {
        let backend = Arc::clone(&backend);
        let model = backend_config.model_file();
        tokio::spawn(async move {
            if let Err(e) = backend.load(backend_config).await {
                error!(model = %model.display(), "Failed to load inference backend: {}", e);
            }
        });
    }

    let fetcher = HttpFetcher::new(
        pipeline_config.temp_dir.clone(),
        pipeline_config.max_video_size_bytes,
        pipeline_config.fetch_timeout.as_secs(),
    )
    .context("failed to create source fetcher")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = TempSweeper::from_config(&pipeline_config).spawn(shutdown_rx);

    let service = Arc::new(AnalysisService::new(
        Arc::new(pipeline_config),
        backend,
        Arc::new(fetcher),
        Arc::new(FfmpegDecoder::with_frame_size(input_size, input_size)),
    ));

    let app = create_router(AppState::new(api_config.clone(), Arc::clone(&service)), metrics_handle);

    let addr: SocketAddr = format!("{}:{}", api_config.host, api_config.port)
        .parse()
        .context("invalid bind address")?;

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    service.shutdown();
    shutdown_tx.send_replace(true);
    if let Err(e) = sweeper.await {
        warn!("Temp sweeper ended abnormally: {}", e);
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Colored output for dev, JSON when `LOG_FORMAT=json`.
fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVES));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
