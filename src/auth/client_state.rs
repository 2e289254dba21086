//! Session and cookie state carried by the client.
//!
//! Two encrypted cookie stores back the state: the session cookie (one cookie holding a
//! JSON map) and a general cookie store used for the remember token. Both are loaded by
//! `load_client_state` before the handlers run and written back after the response is
//! produced, so handlers only ever touch the `ClientState` extension.
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, Key, PrivateCookieJar, SameSite};
use parking_lot::Mutex;
use std::{collections::BTreeMap, sync::Arc};

use super::{AuthEngine, config::ClientStorage};

// Session keys.
pub const SESSION_KEY: &str = "uid";
pub const SESSION_HALF_AUTH_KEY: &str = "halfauth";
pub const FLASH_SUCCESS_KEY: &str = "flash_success";
pub const FLASH_ERROR_KEY: &str = "flash_error";

// Cookie keys.
pub const COOKIE_REMEMBER: &str = "rm";

type Values = BTreeMap<String, String>;

#[derive(Debug, Default)]
struct Inner {
    session: Values,
    session_dirty: bool,
    cookies: Values,
    // name -> Some(value) to write, None to delete
    cookie_writes: BTreeMap<String, Option<String>>,
}

/// ClientState
///
/// Per-request handle on the session and cookie values. Cloning shares the same state, so
/// a middleware and the handler after it see each other's writes.
#[derive(Clone, Debug, Default)]
pub struct ClientState(Arc<Mutex<Inner>>);

impl ClientState {
    pub fn new(session: Values, cookies: Values) -> Self {
        Self(Arc::new(Mutex::new(Inner {
            session,
            cookies,
            ..Default::default()
        })))
    }

    // --- Session ---

    pub fn get_session(&self, key: &str) -> Option<String> {
        self.0.lock().session.get(key).cloned()
    }

    pub fn put_session(&self, key: &str, value: impl Into<String>) {
        let mut inner = self.0.lock();
        inner.session.insert(key.to_string(), value.into());
        inner.session_dirty = true;
    }

    pub fn del_session(&self, key: &str) {
        self.take_session(key);
    }

    /// Removes and returns a value; used for flash messages.
    pub fn take_session(&self, key: &str) -> Option<String> {
        let mut inner = self.0.lock();
        let value = inner.session.remove(key);
        if value.is_some() {
            inner.session_dirty = true;
        }
        value
    }

    /// Drops every session value, keeping those listed in `keep`.
    pub fn clear_session(&self, keep: &[&str]) {
        let mut inner = self.0.lock();
        let before = inner.session.len();
        inner.session.retain(|k, _| keep.contains(&k.as_str()));
        if inner.session.len() != before {
            inner.session_dirty = true;
        }
    }

    // --- Cookies ---

    pub fn get_cookie(&self, key: &str) -> Option<String> {
        self.0.lock().cookies.get(key).cloned()
    }

    pub fn put_cookie(&self, key: &str, value: impl Into<String>) {
        let value = value.into();
        let mut inner = self.0.lock();
        inner.cookies.insert(key.to_string(), value.clone());
        inner.cookie_writes.insert(key.to_string(), Some(value));
    }

    pub fn del_cookie(&self, key: &str) {
        let mut inner = self.0.lock();
        inner.cookies.remove(key);
        inner.cookie_writes.insert(key.to_string(), None);
    }

    // --- Convenience ---

    pub fn flash_success(&self, message: impl Into<String>) {
        self.put_session(FLASH_SUCCESS_KEY, message);
    }

    pub fn flash_error(&self, message: impl Into<String>) {
        self.put_session(FLASH_ERROR_KEY, message);
    }

    /// The PID of the logged in user, if any.
    pub fn current_pid(&self) -> Option<String> {
        self.get_session(SESSION_KEY).filter(|pid| !pid.is_empty())
    }

    pub fn is_half_authed(&self) -> bool {
        self.get_session(SESSION_HALF_AUTH_KEY).as_deref() == Some("true")
    }

    /// Session values changed during the request, `None` when untouched.
    fn take_session_write(&self) -> Option<Values> {
        let mut inner = self.0.lock();
        if !inner.session_dirty {
            return None;
        }
        inner.session_dirty = false;
        Some(inner.session.clone())
    }

    fn take_cookie_writes(&self) -> BTreeMap<String, Option<String>> {
        std::mem::take(&mut self.0.lock().cookie_writes)
    }
}

/// Handlers receive the state inserted by `load_client_state`.
impl<S> FromRequestParts<S> for ClientState
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<ClientState>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "client state middleware is not installed",
        ))
    }
}

/// ClientStateStore
///
/// The decoded keys of the two encrypted cookie stores plus their cookie settings.
#[derive(Clone)]
pub struct ClientStateStore {
    pub(crate) session_key: Key,
    pub(crate) cookie_key: Key,
    pub(crate) settings: ClientStorage,
}

impl ClientStateStore {
    fn session_cookie(&self, value: String) -> Cookie<'static> {
        Cookie::build((self.settings.session_cookie_name.clone(), value))
            .path("/")
            .http_only(self.settings.http_only)
            .secure(self.settings.secure)
            .same_site(SameSite::Lax)
            .max_age(to_cookie_duration(self.settings.session_max_age))
            .build()
    }

    fn store_cookie(&self, name: String, value: String) -> Cookie<'static> {
        Cookie::build((name, value))
            .path("/")
            .http_only(self.settings.http_only)
            .secure(self.settings.secure)
            .same_site(SameSite::Lax)
            .max_age(to_cookie_duration(self.settings.cookie_max_age))
            .build()
    }

    fn removal(name: String) -> Cookie<'static> {
        Cookie::build((name, "")).path("/").build()
    }
}

fn to_cookie_duration(d: chrono::Duration) -> time::Duration {
    time::Duration::seconds(d.num_seconds())
}

/// load_client_state
///
/// Middleware that decrypts the session and cookie stores into a `ClientState`
/// extension, runs the inner service, then emits `Set-Cookie` headers for whatever the
/// request changed. Cookies that fail to decrypt are treated as absent.
pub async fn load_client_state(
    State(engine): State<AuthEngine>,
    mut request: Request,
    next: Next,
) -> Response {
    let store = engine.client_store();

    let session_jar: PrivateCookieJar =
        PrivateCookieJar::from_headers(request.headers(), store.session_key.clone());
    let cookie_jar: PrivateCookieJar =
        PrivateCookieJar::from_headers(request.headers(), store.cookie_key.clone());

    let session = session_jar
        .get(&store.settings.session_cookie_name)
        .and_then(|cookie| serde_json::from_str::<Values>(cookie.value()).ok())
        .unwrap_or_default();
    let mut cookies = Values::new();
    if let Some(cookie) = cookie_jar.get(COOKIE_REMEMBER) {
        cookies.insert(COOKIE_REMEMBER.to_string(), cookie.value().to_string());
    }

    let state = ClientState::new(session, cookies);
    request.extensions_mut().insert(state.clone());

    let response = next.run(request).await;

    let mut session_jar = session_jar;
    if let Some(values) = state.take_session_write() {
        if values.is_empty() {
            session_jar = session_jar.remove(ClientStateStore::removal(
                store.settings.session_cookie_name.clone(),
            ));
        } else {
            match serde_json::to_string(&values) {
                Ok(json) => session_jar = session_jar.add(store.session_cookie(json)),
                Err(err) => tracing::error!(error = %err, "failed to encode session"),
            }
        }
    }

    let mut cookie_jar = cookie_jar;
    for (name, value) in state.take_cookie_writes() {
        cookie_jar = match value {
            Some(value) => cookie_jar.add(store.store_cookie(name, value)),
            None => cookie_jar.remove(ClientStateStore::removal(name)),
        };
    }

    (session_jar, cookie_jar, response).into_response()
}
