//! # Web API Middleware
//!
//! Request id, timeout, CORS and tracing layers shared by every route.

pub mod request_id;

use axum::middleware;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::WebConfig;
use crate::web::state::AppState;

/// Apply the middleware stack
///
/// Layers, outermost first:
/// 1. Request ID generation
/// 2. Request timeout (408 on overrun)
/// 3. CORS handling
/// 4. Request tracing
pub fn apply_middleware_stack(router: Router<AppState>, config: &WebConfig) -> Router<AppState> {
    router
        .layer(TraceLayer::new_for_http())
        .layer(create_cors_layer())
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(middleware::from_fn(request_id::add_request_id))
}

fn create_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
