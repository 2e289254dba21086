use axum::{
    http::header,
    response::{IntoResponse, Response},
};

use crate::auth::authorize::AuthUser;

const HTML: &str = "text/html; charset=utf-8";

/// Landing page: links to the auth pages and the protected page.
const INDEX: &str = "welcome <a href=\"/auth/login\">login</A> <a href=\"/auth/logout\">logout</a> <a href=\"/auth/register\">register</a> <a href=\"/private\">private</a> ";

/// GET /
pub async fn get_root() -> Response {
    ([(header::CONTENT_TYPE, HTML)], INDEX).into_response()
}

/// GET /private
///
/// Only reachable through the auth, lock and confirm gates.
pub async fn get_private(AuthUser(user): AuthUser) -> Response {
    tracing::debug!(pid = %user.pid(), "serving private page");
    ([(header::CONTENT_TYPE, HTML)], "secrets").into_response()
}
