//! `veritas-server` entry point: loads config, builds the pipeline's
//! clients and stores, and serves the HTTP surface (§8).

use std::net::SocketAddr;

use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use veritas_common::config::ConfigLoader;
use veritas_server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .init();

    tracing::info!("veritas-server v{} starting", env!("CARGO_PKG_VERSION"));

    let config = ConfigLoader::new().with_file("veritas.toml").load()?;
    let state = AppState::build(&config)?;

    let cors = if config.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let origins = config.cors_origins.iter().filter_map(|o| o.parse().ok()).collect::<Vec<_>>();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(tower_http::cors::Any).allow_headers(tower_http::cors::Any)
    };

    let app = veritas_server::build_router(state).layer(cors).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = std::env::var("VERITAS_ADDR").ok().and_then(|s| s.parse().ok()).unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8080)));

    tracing::info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}
