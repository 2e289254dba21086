//! E-mail confirmation of new accounts.
use axum::{
    extract::{Query, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::{
    AuthEngine,
    client_state::{ClientState, SESSION_HALF_AUTH_KEY, SESSION_KEY},
    mail::MailTemplate,
    render::RedirectOptions,
    tokens::{parse_split_token, verifier_matches},
};
use crate::{
    error::AuthError,
    models::{ConfirmQuery, User},
};

const MSG_INVALID_TOKEN: &str = "Your confirmation token is invalid.";
const MSG_CONFIRMED: &str = "You have successfully confirmed your account.";
const MSG_NOT_CONFIRMED: &str = "Your account has not been confirmed, please check your e-mail.";

/// Mails the confirmation link for a freshly registered user.
pub async fn send_confirm_email(engine: &AuthEngine, user: &User, token: &str) {
    let url = engine
        .config()
        .paths
        .absolute(&format!("/confirm?cnf={token}"));
    tracing::info!(pid = %user.pid(), "sending confirm e-mail");
    engine
        .send_mail(&user.email, MailTemplate::Confirm { url })
        .await;
}

/// GET /confirm?cnf=<token>
///
/// Confirms the account owning the token and logs it in. Tokens are single use.
pub async fn get_confirm(
    State(engine): State<AuthEngine>,
    state: ClientState,
    Query(query): Query<ConfirmQuery>,
) -> Result<Response, AuthError> {
    let invalid = || {
        let opts = RedirectOptions::to(engine.config().paths.confirm_not_ok.clone())
            .failure(MSG_INVALID_TOKEN);
        engine.redirect(&state, opts)
    };

    let token = match parse_split_token(&query.cnf) {
        Ok(token) => token,
        Err(err) => {
            tracing::info!(error = %err, "rejected malformed confirm token");
            return Ok(invalid());
        }
    };

    let mut user = match engine.storer().load_by_confirm_selector(&token.selector).await {
        Ok(user) => user,
        Err(AuthError::UserNotFound) => {
            tracing::info!("confirm selector matched no user");
            return Ok(invalid());
        }
        Err(err) => return Err(err),
    };
    if !verifier_matches(user.confirm_verifier.as_deref(), &token.verifier) {
        tracing::info!(pid = %user.pid(), "confirm verifier mismatch");
        return Ok(invalid());
    }

    user.confirmed = true;
    user.confirm_selector = None;
    user.confirm_verifier = None;
    let pid = user.pid().to_string();
    engine.storer().save(user).await?;

    tracing::info!(pid = %pid, "user confirmed");
    state.put_session(SESSION_KEY, pid);
    state.del_session(SESSION_HALF_AUTH_KEY);
    let opts = RedirectOptions::to(engine.config().paths.confirm_ok.clone()).success(MSG_CONFIRMED);
    Ok(engine.redirect(&state, opts))
}

pub fn reject_unconfirmed(engine: &AuthEngine, state: &ClientState, user: &User) -> Response {
    tracing::info!(pid = %user.pid(), "unconfirmed user rejected");
    let opts =
        RedirectOptions::to(engine.config().paths.confirm_not_ok.clone()).failure(MSG_NOT_CONFIRMED);
    engine.redirect(state, opts)
}

/// require_confirmed
///
/// Route middleware: a logged in but unconfirmed user is sent to `confirm_not_ok`.
/// Anonymous requests pass through.
pub async fn require_confirmed(
    State(engine): State<AuthEngine>,
    state: ClientState,
    request: Request,
    next: Next,
) -> Response {
    match engine.load_current_user(&state).await {
        Ok(Some(user)) if !user.confirmed => reject_unconfirmed(&engine, &state, &user),
        Ok(_) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}
