//! Login and logout.
use axum::{
    Extension,
    extract::{Query, State},
    http::StatusCode,
    response::Response,
};

use super::{
    AuthEngine,
    client_state::{COOKIE_REMEMBER, ClientState, SESSION_HALF_AUTH_KEY, SESSION_KEY},
    config::Module,
    confirm, lock, remember,
    render::{Page, RedirectOptions, Values},
    validation::validate_login,
    validation_data,
};
use crate::{
    error::AuthError,
    models::{DATA_ERR, DATA_PRIMARY_ID, DATA_REDIR, HtmlData, LoginForm, RedirQuery},
};

const MSG_INVALID_CREDENTIALS: &str = "Invalid Credentials";
const MSG_LOGGED_OUT: &str = "You have been logged out";

/// GET /login
pub async fn get_login(
    State(engine): State<AuthEngine>,
    layout: Option<Extension<HtmlData>>,
    Query(query): Query<RedirQuery>,
) -> Response {
    let mut data = HtmlData::new();
    if let Some(redir) = query.redir {
        data.insert(DATA_REDIR, redir);
    }
    engine.respond(StatusCode::OK, Page::Login, layout, data)
}

/// POST /login
///
/// Checks the credentials, then runs the pre-auth checks (confirmed, not locked) before
/// the session is established. A failed password counts towards the lock.
pub async fn post_login(
    State(engine): State<AuthEngine>,
    state: ClientState,
    layout: Option<Extension<HtmlData>>,
    Values(form): Values<LoginForm>,
) -> Result<Response, AuthError> {
    let retry = |mut data: HtmlData| {
        data.insert(DATA_PRIMARY_ID, form.email.clone());
        if let Some(redir) = &form.redir {
            data.insert(DATA_REDIR, redir.clone());
        }
        data
    };

    let errors = validate_login(&form);
    if !errors.is_empty() {
        let data = retry(validation_data(&errors));
        return Ok(engine.respond(StatusCode::OK, Page::Login, layout, data));
    }

    let mut user = match engine.storer().load(&form.email).await {
        Ok(user) => user,
        Err(AuthError::UserNotFound) => {
            tracing::info!(pid = %form.email, "login attempt for unknown user");
            let data = retry(HtmlData::new().with(DATA_ERR, MSG_INVALID_CREDENTIALS));
            return Ok(engine.respond(StatusCode::OK, Page::Login, layout, data));
        }
        Err(err) => return Err(err),
    };

    if !engine.hasher().verify(&user.password, &form.password) {
        tracing::info!(pid = %user.pid(), "user failed to log in");
        if engine.is_enabled(Module::Lock) {
            if let Some(locked) = lock::record_failure(&engine, &state, &mut user).await? {
                return Ok(locked);
            }
        }
        let data = retry(HtmlData::new().with(DATA_ERR, MSG_INVALID_CREDENTIALS));
        return Ok(engine.respond(StatusCode::OK, Page::Login, layout, data));
    }

    if engine.is_enabled(Module::Confirm) && !user.confirmed {
        return Ok(confirm::reject_unconfirmed(&engine, &state, &user));
    }
    if engine.is_enabled(Module::Lock) && user.is_locked(chrono::Utc::now()) {
        return Ok(lock::reject_locked(&engine, &state, &user));
    }

    let pid = user.pid().to_string();
    state.put_session(SESSION_KEY, pid.clone());
    state.del_session(SESSION_HALF_AUTH_KEY);

    if engine.is_enabled(Module::Lock) {
        lock::reset_attempts(&engine, user).await?;
    }
    if engine.is_enabled(Module::Remember) && form.wants_remember() {
        remember::issue(&engine, &state, &pid).await?;
    }

    tracing::info!(pid = %pid, "user logged in");
    let opts = RedirectOptions::to(engine.config().paths.auth_login_ok.clone()).follow(form.redir);
    Ok(engine.redirect(&state, opts))
}

/// logout
///
/// Mounted on the configured logout method. Drops the session, the remember cookie and
/// the user's stored remember tokens.
pub async fn logout(
    State(engine): State<AuthEngine>,
    state: ClientState,
) -> Result<Response, AuthError> {
    if let Some(pid) = state.current_pid() {
        if engine.is_enabled(Module::Remember) {
            engine.storer().del_remember_tokens(&pid).await?;
        }
        tracing::info!(pid = %pid, "user logged out");
    }

    if state.get_cookie(COOKIE_REMEMBER).is_some() {
        state.del_cookie(COOKIE_REMEMBER);
    }
    state.clear_session(&[]);

    let opts = RedirectOptions::to(engine.config().paths.logout_ok.clone()).success(MSG_LOGGED_OUT);
    Ok(engine.redirect(&state, opts))
}
