use axum::{Router, routing::post};
use tower_http::trace::TraceLayer;

use crate::handlers::webhooks;
use crate::state::AppState;
use std::sync::Arc;

/// Webhook routes. No bearer auth: deliveries are verified by signature.
pub fn create_webhook_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/livekit/webhook", post(webhooks::livekit_webhook))
        .layer(TraceLayer::new_for_http())
}
