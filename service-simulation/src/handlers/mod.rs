pub mod status;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

/// Routes exposed by the simulation service.
pub fn router() -> Router {
    Router::new()
        .route("/status", get(status::status_handler))
        .layer(TraceLayer::new_for_http())
}
