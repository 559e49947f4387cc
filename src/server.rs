//! # Server Configuration
//!
//! Router assembly and startup for the notification receiver.

use std::sync::Arc;

use axum::{Router, response::Json, routing::get};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;

use crate::config::AppConfig;
use crate::dispatcher::NotificationDispatcher;
use crate::handlers;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub dispatcher: NotificationDispatcher,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route(
            "/",
            get(handlers::root).post(handlers::webhooks::receive_notifications),
        )
        .route("/openapi.json", get(openapi_json))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Starts the server with the given state
pub async fn run_server(state: AppState) -> Result<(), Box<dyn std::error::Error>> {
    let addr = state
        .config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = state.config.profile.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, %profile, "Notification receiver listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::webhooks::receive_notifications,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::webhooks::WebhookAcceptResponse,
        )
    ),
    info(
        title = "Graph Connector Notifications API",
        description = "Receives connector lifecycle notifications",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
