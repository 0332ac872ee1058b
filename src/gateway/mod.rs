pub mod handlers;
pub mod identity;
pub mod state;
pub mod types;

use axum::{
    Router,
    routing::{get, patch, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use state::AppState;

/// Build the full HTTP surface over one shared state
pub fn router(state: Arc<AppState>) -> Router {
    let user_routes = Router::new()
        .route("/swap", post(handlers::create_swap))
        .route("/balances", get(handlers::get_balances))
        .route(
            "/requests/{category}",
            post(handlers::submit_request).get(handlers::list_requests),
        );

    let admin_routes = Router::new()
        .route("/movements/{category}", get(handlers::list_movements))
        .route(
            "/movements/{source}/{id}",
            patch(handlers::edit_movement).delete(handlers::delete_movement),
        )
        .route(
            "/requests/{category}/{id}/review",
            post(handlers::review_request),
        )
        .route("/adjustments", post(handlers::adjust_balance))
        .route("/audit", get(handlers::list_audit))
        .route("/integrity/swaps", get(handlers::check_swap_integrity));

    Router::new()
        .route("/api/v1/health", get(handlers::health_check))
        .nest("/api/v1", user_routes)
        .nest("/api/v1/admin", admin_routes)
        .with_state(state)
}

/// Bind and serve until the listener fails
pub async fn run_server(host: &str, port: u16, state: Arc<AppState>) -> std::io::Result<()> {
    let backend = state.backend.name();
    let app = router(state);

    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await?;

    info!(%addr, backend, "Gateway listening");
    axum::serve(listener, app).await
}
