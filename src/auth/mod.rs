//! The authentication engine.
//!
//! `AuthEngine` owns the auth configuration, the user storer, the renderers and the
//! mailer. It is validated once at startup by [`AuthEngine::init`] and then cloned into
//! every handler and middleware that needs it. [`AuthEngine::router`] builds the routes
//! of the enabled modules, to be mounted under `paths.mount`.
pub mod authorize;
pub mod client_state;
pub mod config;
pub mod confirm;
pub mod lock;
pub mod login;
pub mod mail;
pub mod password;
pub mod recover;
pub mod register;
pub mod remember;
pub mod render;
pub mod tokens;
pub mod validation;

use axum::{
    Extension, Router,
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::Response,
    routing::{MethodFilter, get, on},
};
use axum_extra::extract::cookie::Key;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::{
    error::AuthError,
    models::{DATA_MODULES, DATA_VALIDATION, HtmlData, User},
    repository::StorerState,
};
use client_state::{ClientState, ClientStateStore};
use config::{AuthConfig, Module};
use mail::{MailRenderer, MailTemplate, Mailer};
use password::Hasher;
use render::{
    HtmlRenderer, JsonRenderer, Page, RedirectOptions, Renderer, html_redirect, json_redirect,
    rendered_response,
};
use validation::FieldErrors;

struct Inner {
    config: AuthConfig,
    storer: StorerState,
    renderer: Box<dyn Renderer>,
    mail_renderer: MailRenderer,
    mailer: Arc<dyn Mailer>,
    client_store: ClientStateStore,
    logout_filter: MethodFilter,
}

/// AuthEngine
///
/// Shared handle on the configured engine. Cheap to clone.
#[derive(Clone)]
pub struct AuthEngine(Arc<Inner>);

impl AuthEngine {
    /// init
    ///
    /// Validates the configuration and assembles the engine. Any error here means the
    /// application cannot serve auth requests and should not start.
    pub fn init(
        config: AuthConfig,
        storer: StorerState,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, AuthError> {
        let mount = &config.paths.mount;
        if !mount.starts_with('/') || mount.len() < 2 || mount.ends_with('/') {
            return Err(AuthError::Config(format!(
                "mount path must look like /auth, got {mount:?}"
            )));
        }

        let root = url::Url::parse(&config.paths.root_url)
            .map_err(|e| AuthError::Config(format!("root url: {e}")))?;
        if !matches!(root.scheme(), "http" | "https") {
            return Err(AuthError::Config(format!(
                "root url must be http or https, got {}",
                root.scheme()
            )));
        }

        if config.modules.is_enabled(Module::Lock) && config.modules.lock_after == 0 {
            return Err(AuthError::Config("lock_after must be at least 1".into()));
        }

        let logout_filter = logout_filter(&config.modules.logout_method)?;

        let client_store = ClientStateStore {
            session_key: decode_key("session", &config.storage.session_key)?,
            cookie_key: decode_key("cookie", &config.storage.cookie_key)?,
            settings: config.storage.clone(),
        };

        let renderer: Box<dyn Renderer> = if config.core.api {
            Box::new(JsonRenderer)
        } else {
            Box::new(HtmlRenderer::new(
                config.paths.mount.clone(),
                config.modules.logout_method == Method::GET,
            ))
        };

        tracing::debug!(
            modules = ?config.modules.enabled,
            api = config.core.api,
            mount = %config.paths.mount,
            "auth engine initialized"
        );

        Ok(Self(Arc::new(Inner {
            mail_renderer: MailRenderer::new(&config.mail),
            config,
            storer,
            renderer,
            mailer,
            client_store,
            logout_filter,
        })))
    }

    pub fn config(&self) -> &AuthConfig {
        &self.0.config
    }

    pub fn storer(&self) -> &StorerState {
        &self.0.storer
    }

    pub fn hasher(&self) -> &Hasher {
        &self.0.config.core.hasher
    }

    pub(crate) fn client_store(&self) -> &ClientStateStore {
        &self.0.client_store
    }

    pub(crate) fn is_enabled(&self, module: Module) -> bool {
        self.0.config.modules.is_enabled(module)
    }

    /// Secret derived from the session key, for signing CSRF tokens.
    pub fn csrf_secret(&self) -> Vec<u8> {
        self.0.client_store.session_key.signing().to_vec()
    }

    /// Names of the enabled modules, in a stable order.
    pub fn module_names(&self) -> Vec<&'static str> {
        let mut modules = self.0.config.modules.enabled.clone();
        modules.sort();
        modules.dedup();
        modules.into_iter().map(Module::name).collect()
    }

    /// The PID stored in the session, without touching the storer.
    pub fn current_user_pid(&self, state: &ClientState) -> Option<String> {
        state.current_pid()
    }

    /// load_current_user
    ///
    /// The user behind the session PID. A PID whose user no longer exists is treated as
    /// logged out rather than an error.
    pub async fn load_current_user(&self, state: &ClientState) -> Result<Option<User>, AuthError> {
        let Some(pid) = self.current_user_pid(state) else {
            return Ok(None);
        };
        match self.0.storer.load(&pid).await {
            Ok(user) => Ok(Some(user)),
            Err(AuthError::UserNotFound) => {
                tracing::debug!(pid = %pid, "session refers to an unknown user");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Renders `page` with the request's layout data merged under the page data.
    pub fn respond(
        &self,
        status: StatusCode,
        page: Page,
        layout: Option<Extension<HtmlData>>,
        data: HtmlData,
    ) -> Response {
        let mut merged = layout.map(|Extension(d)| d).unwrap_or_default();
        merged.merge(data);
        tracing::trace!(page = page.name(), "rendering page");
        rendered_response(status, self.0.renderer.render(page, &merged))
    }

    /// Finishes a flow: a flash and a 302 for HTML clients, a JSON status for API clients.
    pub fn redirect(&self, state: &ClientState, opts: RedirectOptions) -> Response {
        if self.0.config.core.api {
            json_redirect(&opts)
        } else {
            html_redirect(state, &opts)
        }
    }

    /// Composes and sends an e-mail. Delivery failures are logged, not returned, so a
    /// broken mailer never fails the request that triggered it.
    pub(crate) async fn send_mail(&self, to: &str, template: MailTemplate) {
        let email = self.0.mail_renderer.compose(to, &template);
        if let Err(err) = self.0.mailer.send(email).await {
            tracing::error!(error = %err, to = %to, "failed to send e-mail");
        }
    }

    /// router
    ///
    /// Routes of the enabled modules, relative to the mount path.
    pub fn router(&self) -> Router {
        let mut router: Router<AuthEngine> = Router::new();

        if self.is_enabled(Module::Auth) {
            router = router.route("/login", get(login::get_login).post(login::post_login));
        }
        if self.is_enabled(Module::Logout) {
            router = router.route("/logout", on(self.0.logout_filter, login::logout));
        }
        if self.is_enabled(Module::Register) {
            router = router.route(
                "/register",
                get(register::get_register).post(register::post_register),
            );
        }
        if self.is_enabled(Module::Confirm) {
            router = router.route("/confirm", get(confirm::get_confirm));
        }
        if self.is_enabled(Module::Recover) {
            router = router
                .route(
                    "/recover",
                    get(recover::get_recover_start).post(recover::post_recover_start),
                )
                .route(
                    "/recover/end",
                    get(recover::get_recover_end).post(recover::post_recover_end),
                );
        }

        router.with_state(self.clone())
    }
}

fn decode_key(which: &str, encoded: &str) -> Result<Key, AuthError> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| AuthError::Config(format!("{which} store key is not valid base64: {e}")))?;
    Key::try_from(bytes.as_slice())
        .map_err(|e| AuthError::Config(format!("{which} store key: {e}")))
}

fn logout_filter(method: &Method) -> Result<MethodFilter, AuthError> {
    match *method {
        Method::GET => Ok(MethodFilter::GET),
        Method::POST => Ok(MethodFilter::POST),
        Method::DELETE => Ok(MethodFilter::DELETE),
        ref other => Err(AuthError::Config(format!(
            "logout method must be GET, POST or DELETE, got {other}"
        ))),
    }
}

/// Page data carrying per-field validation messages.
pub(crate) fn validation_data(errors: &FieldErrors) -> HtmlData {
    let errors: Map<String, Value> = errors
        .iter()
        .map(|(field, messages)| (field.clone(), Value::from(messages.clone())))
        .collect();
    HtmlData::new().with(DATA_VALIDATION, errors)
}

/// module_list
///
/// Adds the enabled module names to the request's page data, so templates can show
/// only the links that lead somewhere.
pub async fn module_list(
    State(engine): State<AuthEngine>,
    mut request: Request,
    next: Next,
) -> Response {
    let modules: Map<String, Value> = engine
        .module_names()
        .into_iter()
        .map(|name| (name.to_string(), Value::Bool(true)))
        .collect();

    match request.extensions_mut().get_mut::<HtmlData>() {
        Some(data) => data.insert(DATA_MODULES, modules),
        None => {
            request
                .extensions_mut()
                .insert(HtmlData::new().with(DATA_MODULES, modules));
        }
    }
    next.run(request).await
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::repository::MemStorer;

    pub const TEST_KEY: &str = "yYql7721umGLk/Q10E9M92zNl5WDpFE0yQP4KDo5xhQtAyykWKVckIsHLqx2iPHJSHLz4QHLCwoSDLVhIzcJRg==";

    pub fn test_config() -> AuthConfig {
        let mut config = AuthConfig::default();
        config.core.hasher = Hasher::low_cost();
        config.storage.session_key = TEST_KEY.into();
        config.storage.cookie_key = TEST_KEY.into();
        config
    }

    pub fn engine_with(config: AuthConfig) -> Result<AuthEngine, AuthError> {
        AuthEngine::init(config, Arc::new(MemStorer::new()), Arc::new(mail::LogMailer))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn init_accepts_defaults_with_keys() {
        let engine = engine_with(test_config()).unwrap();
        assert_eq!(
            engine.module_names(),
            vec!["auth", "confirm", "lock", "logout", "recover", "register", "remember"]
        );
        assert_eq!(engine.csrf_secret().len(), 32);
    }

    #[test]
    fn init_rejects_bad_keys() {
        let mut config = test_config();
        config.storage.session_key = "not base64!".into();
        assert!(matches!(engine_with(config), Err(AuthError::Config(_))));

        let mut config = test_config();
        config.storage.cookie_key = STANDARD.encode([1u8; 16]);
        assert!(matches!(engine_with(config), Err(AuthError::Config(_))));
    }

    #[test]
    fn init_rejects_bad_paths_and_policy() {
        let mut config = test_config();
        config.paths.mount = "auth/".into();
        assert!(engine_with(config).is_err());

        let mut config = test_config();
        config.paths.root_url = "ftp://localhost".into();
        assert!(engine_with(config).is_err());

        let mut config = test_config();
        config.modules.lock_after = 0;
        assert!(engine_with(config).is_err());

        let mut config = test_config();
        config.modules.logout_method = Method::PUT;
        assert!(engine_with(config).is_err());
    }

    #[tokio::test]
    async fn stale_session_is_logged_out() {
        let engine = engine_with(test_config()).unwrap();
        let state = ClientState::default();
        assert!(engine.load_current_user(&state).await.unwrap().is_none());

        state.put_session(client_state::SESSION_KEY, "gone@example.com");
        assert!(engine.load_current_user(&state).await.unwrap().is_none());
    }

    #[test]
    fn validation_data_is_keyed_by_field() {
        let mut errors = FieldErrors::new();
        errors.insert("email".into(), vec!["Cannot be blank".into()]);
        let data = validation_data(&errors);
        assert_eq!(
            data.get(DATA_VALIDATION).unwrap()["email"][0],
            Value::from("Cannot be blank")
        );
    }
}
