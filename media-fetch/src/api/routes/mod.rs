//! API route modules.

pub mod downloads;
pub mod health;
pub mod logging;

use axum::Router;
use axum::extract::DefaultBodyLimit;

use crate::api::middleware::JwtAuthLayer;
use crate::api::server::AppState;

/// Create the main API router.
///
/// Everything under `/api` requires a bearer token; without a configured
/// JWT secret those routes answer 401.
pub fn create_router(state: AppState, body_limit: usize) -> Router {
    let mut api = Router::new()
        .merge(downloads::router())
        .merge(logging::router());
    if let Some(jwt_service) = state.jwt_service.clone() {
        api = api.route_layer(JwtAuthLayer::new(jwt_service));
    } else {
        tracing::warn!("JWT_SECRET is not set, authenticated routes will reject all requests");
    }

    Router::new()
        .nest("/api", api)
        .nest("/health", health::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
