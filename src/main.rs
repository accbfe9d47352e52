use life_tracker::{router, AppState, Config, LocalStore, MutationCoordinator};
use std::{net::SocketAddr, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = Config::from_env();
    let store = LocalStore::open(config.data_path.clone()).await?;
    info!(path = %config.data_path.display(), "opened data file");

    let coordinator =
        Arc::new(MutationCoordinator::new(Arc::new(store)).with_request_timeout(config.request_timeout));
    if let Some(user_id) = &config.user_id {
        if let Err(err) = coordinator.sign_in(user_id.as_str()).await {
            error!(user_id = %user_id, "initial load failed: {err}");
        }
    }

    let app = router(AppState::new(coordinator, &config));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {err}");
    }
    info!("shutting down");
}
