pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

// Re-export the handlers so the router below and the binaries can reach them easily.
pub use rest::{
    confirm_send_handler, create_message_handler, get_transcript_handler, health_handler,
    update_status_handler,
};
pub use ws_handler::ws_handler;

use crate::error::RelayError;
use axum::http::{header::{ACCEPT, CONTENT_TYPE}, HeaderValue, Method};
use axum::{
    routing::{get, post, put},
    Router,
};
use rest::ApiDoc;
use state::AppState;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Builds the complete router: REST endpoints, the renderer WebSocket and Swagger UI.
pub fn router(app_state: Arc<AppState>) -> Result<Router, RelayError> {
    let origin = app_state
        .config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| RelayError::Internal(format!("Invalid CORS origin: {}", e)))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    let api_router = Router::new()
        .route("/health", get(health_handler))
        .route(
            "/conversations/{conversation_id}/transcript",
            get(get_transcript_handler),
        )
        .route(
            "/conversations/{conversation_id}/messages",
            post(create_message_handler),
        )
        .route(
            "/conversations/{conversation_id}/messages/{message_id}/status",
            put(update_status_handler),
        )
        .route(
            "/conversations/{conversation_id}/messages/{message_id}/confirm",
            post(confirm_send_handler),
        )
        .route("/conversations/{conversation_id}/ws", get(ws_handler))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    Ok(Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())))
}
