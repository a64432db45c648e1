use anyhow::{Context, Result};
use tfbackend_api::{build_app, AppState};
use tfbackend_config::Config;
use tracing::{error, info};

use crate::backends;

// ── Serve ─────────────────────────────────────────────────────────────────────

pub async fn serve(config: Config) -> Result<()> {
    let store = backends::build_store(&config).await?;
    let locker = backends::build_locker(&config).await?;
    let kms = backends::build_kms(&config).await?;
    let auth = backends::build_auth(&config);

    let app = build_app(AppState::new(store, locker, kms, auth));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to listen on {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received, draining requests");
}

// ── Generate key ──────────────────────────────────────────────────────────────

pub fn generate_key() {
    println!("{}", tfbackend_kms::generate_key());
}
