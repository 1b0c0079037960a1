use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tutor_live::{
    create_router, AppState, Config, ConnectionManager, ContentBuffer, SessionOrchestrator,
    WsTransport,
};

#[derive(Parser, Debug)]
#[command(name = "tutor-live", about = "Live tutoring session core")]
struct Args {
    /// Path to the configuration file (without extension)
    #[arg(long, default_value = "config/tutor-live")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)
        .with_context(|| format!("failed to load config {}", args.config))?;

    info!("{} starting", cfg.service.name);
    info!("realtime service: {}", cfg.connection.url);

    let manager = Arc::new(ConnectionManager::new(
        Arc::new(WsTransport),
        cfg.connection.clone(),
        cfg.monitor.clone(),
    )?);
    let buffer = Arc::new(ContentBuffer::new(cfg.buffer.max_size));
    let orchestrator = Arc::new(SessionOrchestrator::new(
        Arc::clone(&manager),
        Arc::clone(&buffer),
        cfg.connection.url.clone(),
    ));

    let router = create_router(AppState::new(Arc::clone(&orchestrator)));
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!("control API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    orchestrator.cleanup().await;

    Ok(())
}
