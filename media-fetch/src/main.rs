use std::sync::Arc;

use anyhow::Context;
use mimalloc::MiMalloc;
use tokio_util::sync::CancellationToken;

use media_fetch::api::jwt::JwtService;
use media_fetch::api::{ApiServer, AppState};
use media_fetch::config::AppConfig;
use media_fetch::database::{self, repositories::SqlxDownloadLogRepository};
use media_fetch::extractor::YtDlpExtractor;
use media_fetch::logging;
use media_fetch::queue::TaskQueue;
use media_fetch::service::DownloadService;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env();

    // Keep the guard alive so buffered file logs are flushed on exit.
    let (logging_config, _log_guard) =
        logging::init_logging(&config.log_dir).context("failed to initialize logging")?;
    let shutdown = CancellationToken::new();
    logging_config.start_retention_cleanup(shutdown.child_token());

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting media-fetch");

    let pool = database::init_pool(&config.database_url)
        .await
        .context("failed to open database")?;
    database::run_migrations(&pool)
        .await
        .context("failed to run migrations")?;

    tokio::fs::create_dir_all(config.media_root.join("downloads"))
        .await
        .with_context(|| format!("failed to create {}", config.media_root.display()))?;

    let logs = Arc::new(SqlxDownloadLogRepository::new(pool.clone()));
    let extractor = Arc::new(YtDlpExtractor::new(config.ytdlp_config()));
    let queue = Arc::new(TaskQueue::new(config.queue_config()));
    let service = Arc::new(DownloadService::new(
        logs,
        extractor,
        queue.clone(),
        config.storage(),
    ));

    let mut state = AppState::new(service).with_logging_config(logging_config);
    if let Some(jwt_service) = JwtService::from_config(&config) {
        state = state.with_jwt_service(Arc::new(jwt_service));
    }

    let server = ApiServer::with_state(config.server_config(), state);
    let server_token = server.cancel_token();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        signal_token.cancel();
        server_token.cancel();
    });

    let result = server.run().await;

    shutdown.cancel();
    queue.shutdown().await;
    pool.close().await;
    tracing::info!("media-fetch stopped");

    result.context("API server failed")
}
