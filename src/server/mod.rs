use axum::{
    Router,
    routing::{get, post},
};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::pipeline::Orchestrator;

pub mod routes;

/// Server state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
}

/// All JSON routes over one orchestrator
pub fn router(orchestrator: Orchestrator) -> Router {
    let state = AppState { orchestrator };

    Router::new()
        .route("/health", get(routes::health))
        .route("/projects", post(routes::register_project).get(routes::list_projects))
        .route("/projects/{id}/sync", post(routes::sync_project))
        .route("/projects/{id}/status", get(routes::get_status))
        .route("/projects/{id}/structure", get(routes::get_structure))
        .route("/projects/{id}/documents", get(routes::get_document))
        .route("/projects/{id}/ask", post(routes::ask))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(port: u16, orchestrator: Orchestrator) -> anyhow::Result<()> {
    let app = router(orchestrator);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
