use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::calls;
use crate::state::AppState;
use std::sync::Arc;

/// Create the API router with protected routes
///
/// Note: Authentication middleware should be applied in main.rs after state is available
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/calls", get(calls::list_calls).post(calls::dispatch_call))
        .route(
            "/calls/{call_id}",
            get(calls::get_call).delete(calls::hangup_call),
        )
        .route("/calls/{call_id}/transfer", post(calls::transfer_call))
        .layer(TraceLayer::new_for_http())
}
