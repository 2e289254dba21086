use axum::{
    Extension,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{
    AppState,
    auth::client_state::{ClientState, FLASH_ERROR_KEY, FLASH_SUCCESS_KEY},
    csrf::CsrfToken,
    models::{
        DATA_CSRF_TOKEN, DATA_CURRENT_USER_NAME, DATA_FLASH_ERROR, DATA_FLASH_SUCCESS,
        DATA_LOGGED_IN, DATA_MOUNT, HtmlData,
    },
};

/// debug_logger
///
/// Logs `METHOD path version` for every request. With `-debugdb` it also logs the whole
/// user store before the request is handled.
pub async fn debug_logger(State(state): State<AppState>, request: Request, next: Next) -> Response {
    tracing::info!(
        "{} {} {:?}",
        request.method(),
        request.uri().path(),
        request.version()
    );

    if state.config.debug_db {
        for line in state.engine.storer().dump().await {
            tracing::info!("{line}");
        }
    }

    next.run(request).await
}

/// data_injector
///
/// Builds the layout data every page gets: who is logged in, the CSRF token, and the
/// flash messages, which are consumed here. Stored as an `HtmlData` request extension.
pub async fn data_injector(
    State(state): State<AppState>,
    client: ClientState,
    csrf: Option<Extension<CsrfToken>>,
    mut request: Request,
    next: Next,
) -> Response {
    let user = match state.engine.load_current_user(&client).await {
        Ok(user) => user,
        Err(err) => {
            tracing::error!(error = %err, "failed to load current user for page data");
            None
        }
    };

    let data = HtmlData::new()
        .with(DATA_MOUNT, state.engine.config().paths.mount.clone())
        .with(DATA_LOGGED_IN, user.is_some())
        .with(
            DATA_CURRENT_USER_NAME,
            user.map(|u| u.name).unwrap_or_default(),
        )
        .with(
            DATA_CSRF_TOKEN,
            csrf.map(|Extension(CsrfToken(token))| token).unwrap_or_default(),
        )
        .with(
            DATA_FLASH_SUCCESS,
            client.take_session(FLASH_SUCCESS_KEY).unwrap_or_default(),
        )
        .with(
            DATA_FLASH_ERROR,
            client.take_session(FLASH_ERROR_KEY).unwrap_or_default(),
        );

    if state.config.debug_ctx {
        tracing::info!(data = ?data, "page data");
    }

    request.extensions_mut().insert(data);
    next.run(request).await
}
