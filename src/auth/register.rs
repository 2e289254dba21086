//! Account registration.
use axum::{Extension, extract::State, http::StatusCode, response::Response};
use serde_json::json;

use super::{
    AuthEngine,
    client_state::{ClientState, SESSION_KEY},
    config::Module,
    confirm,
    render::{Page, RedirectOptions, Values},
    tokens::generate_split_token,
    validation::validate_register,
    validation_data,
};
use crate::{
    error::AuthError,
    models::{DATA_ERR, DATA_PRESERVE, HtmlData, RegisterForm, User},
};

const MSG_USER_EXISTS: &str = "That user already exists";
const MSG_VERIFY: &str = "Please verify your account, an e-mail has been sent to you.";
const MSG_REGISTERED: &str = "Account successfully created, you are now logged in";

/// GET /register
pub async fn get_register(
    State(engine): State<AuthEngine>,
    layout: Option<Extension<HtmlData>>,
) -> Response {
    engine.respond(StatusCode::OK, Page::Register, layout, HtmlData::new())
}

/// POST /register
///
/// Creates the user. With confirm enabled the user gets a confirmation e-mail and stays
/// logged out; otherwise they are logged in right away.
pub async fn post_register(
    State(engine): State<AuthEngine>,
    state: ClientState,
    layout: Option<Extension<HtmlData>>,
    Values(form): Values<RegisterForm>,
) -> Result<Response, AuthError> {
    let preserve = json!({ "email": form.email, "name": form.name });

    let errors = validate_register(&form);
    if !errors.is_empty() {
        let data = validation_data(&errors).with(DATA_PRESERVE, preserve);
        return Ok(engine.respond(StatusCode::OK, Page::Register, layout, data));
    }

    let mut user = User::new(
        form.email.clone(),
        form.name.clone(),
        engine.hasher().hash(&form.password)?,
    );

    let confirm = engine.is_enabled(Module::Confirm);
    let token = if confirm {
        let creds = generate_split_token();
        user.confirm_selector = Some(creds.selector);
        user.confirm_verifier = Some(creds.verifier);
        Some(creds.token)
    } else {
        user.confirmed = true;
        None
    };

    match engine.storer().create(user.clone()).await {
        Ok(()) => {}
        Err(AuthError::UserExists) => {
            tracing::info!(pid = %user.pid(), "registration for existing user");
            let data = HtmlData::new()
                .with(DATA_ERR, MSG_USER_EXISTS)
                .with(DATA_PRESERVE, preserve);
            return Ok(engine.respond(StatusCode::OK, Page::Register, layout, data));
        }
        Err(err) => return Err(err),
    }
    tracing::info!(pid = %user.pid(), "registered new user");

    if let Some(token) = token {
        confirm::send_confirm_email(&engine, &user, &token).await;
        let opts = RedirectOptions::to(engine.config().paths.confirm_not_ok.clone()).success(MSG_VERIFY);
        return Ok(engine.redirect(&state, opts));
    }

    state.put_session(SESSION_KEY, user.pid());
    let opts = RedirectOptions::to(engine.config().paths.register_ok.clone()).success(MSG_REGISTERED);
    Ok(engine.redirect(&state, opts))
}
