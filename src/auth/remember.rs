//! Remember-me: long-lived login through a rotating cookie token.
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use super::{
    AuthEngine,
    client_state::{COOKIE_REMEMBER, ClientState, SESSION_HALF_AUTH_KEY, SESSION_KEY},
    config::Module,
    tokens::{generate_remember_token, parse_remember_cookie},
};
use crate::error::AuthError;

/// Stores a new remember token for `pid` and hands it to the client as a cookie.
pub async fn issue(engine: &AuthEngine, state: &ClientState, pid: &str) -> Result<(), AuthError> {
    let token = generate_remember_token(pid);
    engine.storer().add_remember_token(pid, token.hash).await?;
    state.put_cookie(COOKIE_REMEMBER, token.cookie);
    Ok(())
}

/// remember
///
/// Middleware: requests without a session but with a remember cookie are logged in from
/// the cookie. The token is consumed and replaced, and the session is marked half
/// authenticated so full-auth routes still ask for the password.
pub async fn remember(
    State(engine): State<AuthEngine>,
    state: ClientState,
    request: Request,
    next: Next,
) -> Response {
    if engine.is_enabled(Module::Remember) && state.current_pid().is_none() {
        if let Some(cookie) = state.get_cookie(COOKIE_REMEMBER) {
            if let Err(err) = authenticate(&engine, &state, &cookie).await {
                tracing::error!(error = %err, "remember token login failed");
            }
        }
    }
    next.run(request).await
}

async fn authenticate(engine: &AuthEngine, state: &ClientState, cookie: &str) -> Result<(), AuthError> {
    let (pid, hash) = match parse_remember_cookie(cookie) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::info!(error = %err, "discarding malformed remember cookie");
            state.del_cookie(COOKIE_REMEMBER);
            return Ok(());
        }
    };

    match engine.storer().use_remember_token(&pid, &hash).await {
        Ok(()) => {}
        Err(AuthError::TokenNotFound) => {
            tracing::info!(pid = %pid, "remember token not found");
            state.del_cookie(COOKIE_REMEMBER);
            return Ok(());
        }
        Err(err) => return Err(err),
    }

    issue(engine, state, &pid).await?;
    state.put_session(SESSION_KEY, pid.clone());
    state.put_session(SESSION_HALF_AUTH_KEY, "true");
    tracing::info!(pid = %pid, "user logged in via remember token");
    Ok(())
}
