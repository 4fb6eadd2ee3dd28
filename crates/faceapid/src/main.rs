use anyhow::{Context, Result};
use faceapid::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("faceapid starting");

    let config = Config::load()?;
    tracing::info!(
        bind = %config.bind_addr,
        model_dir = %config.model_dir.display(),
        upload_dir = %config.upload_dir.display(),
        metadata = %config.metadata_path.display(),
        db = %config.db_path.display(),
        require_auth = config.require_auth,
        "config loaded"
    );
    if !config.require_auth {
        tracing::warn!("authentication disabled; face and metadata endpoints are open");
    }

    let bind_addr = config.bind_addr.clone();
    let state = faceapid::initialize_state(config).await?;

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "faceapid ready");

    axum::serve(listener, faceapid::app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("faceapid shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
