//! Password recovery by e-mailed token.
use axum::{
    Extension,
    extract::{Query, State},
    http::StatusCode,
    response::Response,
};
use chrono::Utc;
use serde_json::json;

use super::{
    AuthEngine,
    client_state::{ClientState, SESSION_KEY},
    mail::MailTemplate,
    render::{Page, RedirectOptions, Values},
    tokens::{generate_split_token, parse_split_token, verifier_matches},
    validation::{validate_recover_end, validate_recover_start},
    validation_data,
};
use crate::{
    error::AuthError,
    models::{
        DATA_PRESERVE, DATA_RECOVER_TOKEN, HtmlData, RecoverEndForm, RecoverEndQuery,
        RecoverStartForm,
    },
};

const MSG_SENT: &str =
    "An email has been sent to you with further instructions on how to reset your password.";
const MSG_INVALID_TOKEN: &str = "Your password recovery token is invalid.";
const MSG_UPDATED: &str = "Successfully updated password";
const MSG_UPDATED_LOGGED_IN: &str = "Successfully updated password and logged in";

/// GET /recover
pub async fn get_recover_start(
    State(engine): State<AuthEngine>,
    layout: Option<Extension<HtmlData>>,
) -> Response {
    engine.respond(StatusCode::OK, Page::RecoverStart, layout, HtmlData::new())
}

/// POST /recover
///
/// Stores a recovery token and mails the link. Unknown addresses get the same answer
/// as known ones.
pub async fn post_recover_start(
    State(engine): State<AuthEngine>,
    state: ClientState,
    layout: Option<Extension<HtmlData>>,
    Values(form): Values<RecoverStartForm>,
) -> Result<Response, AuthError> {
    let errors = validate_recover_start(&form);
    if !errors.is_empty() {
        let data = validation_data(&errors).with(DATA_PRESERVE, json!({ "email": form.email }));
        return Ok(engine.respond(StatusCode::OK, Page::RecoverStart, layout, data));
    }

    match engine.storer().load(&form.email).await {
        Ok(mut user) => {
            let creds = generate_split_token();
            user.recover_selector = Some(creds.selector);
            user.recover_verifier = Some(creds.verifier);
            user.recover_token_expiry =
                Some(Utc::now() + engine.config().modules.recover_token_duration);
            let email = user.email.clone();
            engine.storer().save(user).await?;

            let url = engine
                .config()
                .paths
                .absolute(&format!("/recover/end?token={}", creds.token));
            tracing::info!(pid = %email, "sending recover e-mail");
            engine.send_mail(&email, MailTemplate::Recover { url }).await;
        }
        Err(AuthError::UserNotFound) => {
            tracing::info!(pid = %form.email, "recover requested for unknown user");
        }
        Err(err) => return Err(err),
    }

    let opts = RedirectOptions::to(engine.config().paths.recover_ok.clone()).success(MSG_SENT);
    Ok(engine.redirect(&state, opts))
}

/// GET /recover/end?token=<token>
pub async fn get_recover_end(
    State(engine): State<AuthEngine>,
    layout: Option<Extension<HtmlData>>,
    Query(query): Query<RecoverEndQuery>,
) -> Response {
    let data = HtmlData::new().with(DATA_RECOVER_TOKEN, query.token);
    engine.respond(StatusCode::OK, Page::RecoverEnd, layout, data)
}

/// POST /recover/end
///
/// Sets the new password if the token is valid and unexpired. An expired token is
/// cleared from the user it belongs to.
pub async fn post_recover_end(
    State(engine): State<AuthEngine>,
    state: ClientState,
    layout: Option<Extension<HtmlData>>,
    Values(form): Values<RecoverEndForm>,
) -> Result<Response, AuthError> {
    let errors = validate_recover_end(&form);
    if !errors.is_empty() {
        let data = validation_data(&errors).with(DATA_RECOVER_TOKEN, form.token);
        return Ok(engine.respond(StatusCode::OK, Page::RecoverEnd, layout, data));
    }

    let invalid = || {
        let opts =
            RedirectOptions::to(engine.config().paths.recover_ok.clone()).failure(MSG_INVALID_TOKEN);
        engine.redirect(&state, opts)
    };

    let token = match parse_split_token(&form.token) {
        Ok(token) => token,
        Err(err) => {
            tracing::info!(error = %err, "rejected malformed recover token");
            return Ok(invalid());
        }
    };
    let mut user = match engine.storer().load_by_recover_selector(&token.selector).await {
        Ok(user) => user,
        Err(AuthError::UserNotFound) => {
            tracing::info!("recover selector matched no user");
            return Ok(invalid());
        }
        Err(err) => return Err(err),
    };

    let verified = verifier_matches(user.recover_verifier.as_deref(), &token.verifier);
    let expired = user.recover_token_expiry.is_none_or(|expiry| expiry <= Utc::now());
    if !verified || expired {
        tracing::info!(pid = %user.pid(), expired, "recover token rejected");
        if expired {
            user.recover_selector = None;
            user.recover_verifier = None;
            user.recover_token_expiry = None;
            engine.storer().save(user).await?;
        }
        return Ok(invalid());
    }

    user.password = engine.hasher().hash(&form.password)?;
    user.recover_selector = None;
    user.recover_verifier = None;
    user.recover_token_expiry = None;
    let pid = user.pid().to_string();
    engine.storer().save(user).await?;
    tracing::info!(pid = %pid, "user recovered password");

    let message = if engine.config().modules.recover_login_after_recovery {
        state.put_session(SESSION_KEY, pid);
        MSG_UPDATED_LOGGED_IN
    } else {
        MSG_UPDATED
    };
    let opts = RedirectOptions::to(engine.config().paths.recover_ok.clone()).success(message);
    Ok(engine.redirect(&state, opts))
}
