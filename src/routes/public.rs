use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Endpoints for anonymous and logged in clients alike.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /
        // Static landing page linking to login, logout, register and the private page.
        .route("/", get(handlers::get_root))
}
