use mimalloc::MiMalloc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use tollgate::config::CONFIG;
use tollgate::db::Storage;
use tollgate::logging::{FileLogger, RedactingFileLayer};
use tollgate::service::{mailer_from_config, sessions::spawn_session_sweeper};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const SESSION_SWEEP_EVERY: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = &*CONFIG;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.logging.level.clone()));
    let file_layer = FileLogger::from_config(&cfg.logging).map(RedactingFileLayer::new);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .with(file_layer)
        .init();

    info!(
        bind = %cfg.server.bind,
        database_url = %cfg.database.url,
        loglevel = %cfg.logging.level,
        log_file = ?cfg.logging.file,
        upload_dir = %cfg.upload.dir.display(),
    );
    if cfg.server.insecure_cookie {
        warn!("session cookies are sent without the Secure flag");
    }

    let storage = Storage::connect(&cfg.database.url).await?;
    let mailer = mailer_from_config(&cfg.mail)?;
    spawn_session_sweeper(storage.clone(), SESSION_SWEEP_EVERY);

    let state = tollgate::AppState::new(cfg.clone(), storage, mailer);
    let app = tollgate::tollgate_router(state);

    let listener = TcpListener::bind(&cfg.server.bind).await?;
    info!("HTTP server listening on {}", cfg.server.bind);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
