//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the gateway: the
//! websockify bridge endpoint, the REST API, the OpenAPI documentation,
//! and the static frontend.

use crate::{
    bridge::ws_handler,
    handlers,
    models::{
        ErrorResponse, FileActionResponse, FileInfo, FileListResponse, MessageResponse,
        PrintRequest, VncConnection,
    },
    state::AppState,
};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::upload_file,
        handlers::download_file,
        handlers::list_files,
        handlers::delete_file,
        handlers::print_file,
        handlers::preopen_file,
        handlers::list_connections,
        handlers::add_connection,
        handlers::update_connection,
        handlers::delete_connection,
    ),
    components(
        schemas(VncConnection, FileInfo, FileListResponse, FileActionResponse, MessageResponse, PrintRequest, ErrorResponse)
    ),
    tags(
        (name = "WebVNC Gateway", description = "File transfer, printing and VNC connection management")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let frontend_dist = app_state.config.frontend_dist.clone();

    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/websockify", get(ws_handler))
        .route("/print", post(handlers::print_file))
        .route("/preopen", post(handlers::preopen_file))
        .route(
            "/files",
            get(handlers::list_files).post(handlers::upload_file),
        )
        .route(
            "/files/{filename}",
            get(handlers::download_file).delete(handlers::delete_file),
        )
        .route(
            "/api/vnc/connections",
            get(handlers::list_connections).post(handlers::add_connection),
        )
        .route(
            "/api/vnc/connections/{index}",
            put(handlers::update_connection).delete(handlers::delete_connection),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(app_state);

    let mut router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router);

    // Single-page frontend: the dist directory is served as-is, with
    // index.html standing in for client-side routes like /vnc.
    if frontend_dist.is_dir() {
        let index = ServeFile::new(frontend_dist.join("index.html"));
        router = router.fallback_service(ServeDir::new(frontend_dist).not_found_service(index));
    }

    router
}
