/// API Routes definition

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::auth;
use super::handlers;
use super::AppState;

pub fn create_router(state: Arc<AppState>, enable_cors: bool) -> Router {
    // Protected routes (require authentication)
    let protected_routes = Router::new()
        .route(
            "/api/backups",
            get(handlers::list_backups).post(handlers::create_backup),
        )
        .route("/api/backups/:filename", delete(handlers::delete_backup))
        .route("/api/backups/:filename/restore", post(handlers::restore_backup))
        .route("/api/backups/:filename/download", get(handlers::download_backup))
        .route("/api/scripts", get(handlers::list_scripts))
        .route("/api/scripts/:name", post(handlers::run_script))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_token));

    // Public routes
    let public_routes = Router::new().route("/api/health", get(handlers::health_check));

    let mut app = Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        app = app.layer(CorsLayer::permissive());
    }

    app
}
