use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// Every handler here relies on the `authorize` guard layered above this router, so an
/// `AuthUser` is always available to it.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /private
        // Returns "secrets" to logged in, unlocked, confirmed users.
        .route("/private", get(handlers::get_private))
}
