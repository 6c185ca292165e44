//! # Web API
//!
//! axum surface of the inbox engine.
//!
//! | method | path                       | purpose                         |
//! |--------|----------------------------|---------------------------------|
//! | POST   | `/ldn/inbox`               | receive a notification          |
//! | GET    | `/ldn/messages?status=..`  | list records in one status      |
//! | GET    | `/ldn/messages/:id`        | record summary                  |
//! | POST   | `/ldn/messages/:id/retry`  | operator-forced retry           |
//! | GET    | `/health`                  | status counts and metrics       |

pub mod handlers;
pub mod middleware;
pub mod response_types;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

pub use response_types::{ApiError, ApiResult, InboxResponse, MessageSummary};
pub use state::AppState;

/// Build the application router with middleware applied
pub fn create_app(state: AppState) -> Router {
    let max_document_bytes = state.config.inbox.max_document_bytes;

    let ldn_routes = Router::new()
        .route("/inbox", post(handlers::inbox::receive_notification))
        .route("/messages", get(handlers::messages::list_messages))
        .route("/messages/:id", get(handlers::messages::get_message))
        .route("/messages/:id/retry", post(handlers::messages::retry_message));

    let router = Router::new()
        .nest("/ldn", ldn_routes)
        .route("/health", get(handlers::health::health))
        .layer(DefaultBodyLimit::max(max_document_bytes));

    middleware::apply_middleware_stack(router, &state.config.web).with_state(state)
}
