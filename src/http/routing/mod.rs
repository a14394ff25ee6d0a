use axum::extract::DefaultBodyLimit;
use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Upper bound on bytes read from a request body. Avatar parts stop being
/// read once they pass their own limit, so they never reach this one.
pub const MAX_REQUEST_BYTES: usize = 8 * 1024 * 1024;

pub fn app(tasks: Router, users: Router) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(tasks)
        .merge(users)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES)),
        )
}
