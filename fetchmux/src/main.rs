use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fetchmux::api::{ApiServer, ApiServerConfig, AppState};
use fetchmux::config::AppConfig;
use fetchmux::info::InfoService;
use fetchmux::logging;
use fetchmux::transcode::{TaskStore, TranscodeSupervisor, detect_transcoder};
use fetchmux::utils::{fs, http_client};

/// Timeout for upstream HTTP requests made by `/info`.
const INFO_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env_or_default()?;
    let _log_guard = logging::init_logging(&config.log_dir)?;
    let background = CancellationToken::new();
    logging::start_retention_cleanup(config.log_dir.clone(), background.clone());

    http_client::install_rustls_provider();

    fs::ensure_dir_all_with_op("creating download directory", &config.transcode.download_dir)
        .await?;
    let download_dir = std::fs::canonicalize(&config.transcode.download_dir)?;
    let mut transcode_config = config.transcode.clone();
    transcode_config.download_dir = download_dir;

    let transcoder = detect_transcoder(&transcode_config.ffmpeg_binary_path).await;
    match &transcoder {
        Some(t) => info!(binary = %t.binary_path, version = %t.version, "Transcoder available"),
        None => warn!(
            binary = %transcode_config.ffmpeg_binary_path,
            "No working transcoder found; falling back to direct HTTP downloads"
        ),
    }

    let store = Arc::new(TaskStore::new());
    // Fallback downloads can run for a long time; no overall request timeout.
    let supervisor = Arc::new(TranscodeSupervisor::new(
        transcode_config.clone(),
        store,
        transcoder,
        http_client::build_http_client(Duration::ZERO),
    ));
    let info_service = InfoService::new(http_client::build_http_client(INFO_REQUEST_TIMEOUT));

    let mut app_config = config;
    app_config.transcode = transcode_config;
    let state = AppState::new(app_config, supervisor, info_service);

    let server = ApiServer::new(ApiServerConfig::from_env_or_default(), state);
    let server_token = server.cancel_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        server_token.cancel();
    });

    info!(version = env!("CARGO_PKG_VERSION"), "fetchmux started");
    server.run().await?;

    background.cancel();
    info!("fetchmux stopped");
    Ok(())
}

/// Resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
