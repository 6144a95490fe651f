mod configuration;
mod error;
mod frames;
mod routes;
mod sessions;
mod state;

use anyhow::Context;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = configuration::Settings::new()?;
    let engine = settings
        .engine
        .build()
        .context("Failed to set up the engine")?;
    info!(engine = engine.name(), "engine ready");

    let state = state::AppState::new(engine, settings.engine.agent_config());
    let _sweeper = state.sessions.spawn_sweeper(
        settings.sessions.idle_timeout(),
        settings.sessions.sweep_period(),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::configure(state).layer(cors);

    let addr = settings
        .server
        .socket_addr()
        .context("Invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
