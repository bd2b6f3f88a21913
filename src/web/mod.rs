//! Web server module

mod auth;
mod error;
mod routes;

pub use auth::AccessGuard;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::{collections::HashSet, net::SocketAddr, sync::Arc};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::Config;
use crate::db::Database;
use crate::geoip::SharedGeoIp;

pub struct AppState {
    pub db: Database,
    pub geoip: SharedGeoIp,
    pub guard: AccessGuard,
    pub blocklist: HashSet<String>,
}

/// Build the router. Separate from [`start_server`] so tests can drive the
/// full HTTP surface against an in-memory database.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(routes::healthz))
        // Instrumented pages post here cross-origin, so CORS stays open
        .route("/api/collect", post(routes::collect))
        .route("/api/stats", get(routes::stats))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: &Config, db: Database, geoip: SharedGeoIp) -> Result<()> {
    let state = Arc::new(AppState {
        db,
        geoip,
        guard: AccessGuard::new(config.auth.secret.clone()),
        blocklist: config
            .ingest
            .blocklist
            .iter()
            .map(|site| site.trim().to_string())
            .collect(),
    });

    let router = app(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Web server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
