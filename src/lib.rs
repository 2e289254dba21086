use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
    middleware::from_fn_with_state,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// The authentication engine and its modules.
pub mod auth;
pub mod cli;
pub mod config;
pub mod csrf;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repository;

// Routing segregation (Public, Authenticated).
pub mod routes;
use routes::{authenticated, public};

use auth::{
    AuthEngine,
    authorize::{AuthRequirement, FailureResponse, Guard, authorize},
    client_state::load_client_state,
    confirm::require_confirmed,
    lock::require_unlocked,
    mail::Mailer,
    module_list,
    remember::remember,
};
use csrf::{Csrf, csrf_protect};
use error::AuthError;
use middleware::{data_injector, debug_logger};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use repository::{MemStorer, StorerState};

/// AppState
///
/// The single shared container handed to every handler and middleware. Cloning is cheap:
/// the engine and CSRF key are reference counted.
#[derive(Clone)]
pub struct AppState {
    /// The configured authentication engine (storer, renderers, mailer, cookie keys).
    pub engine: AuthEngine,
    /// CSRF signing key, derived from the session store key.
    pub csrf: Csrf,
    /// Configuration: the loaded, immutable application configuration.
    pub config: AppConfig,
}

impl AppState {
    pub fn new(config: AppConfig, engine: AuthEngine) -> Self {
        let csrf = Csrf::new(engine.csrf_secret(), engine.config().storage.secure);
        Self {
            engine,
            csrf,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for AuthEngine {
    fn from_ref(app_state: &AppState) -> AuthEngine {
        app_state.engine.clone()
    }
}

impl FromRef<AppState> for Csrf {
    fn from_ref(app_state: &AppState) -> Csrf {
        app_state.csrf.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// build_state
///
/// Initializes the auth engine for `config` on top of `storer` and `mailer`. An error
/// here is fatal at startup.
pub fn build_state(
    config: AppConfig,
    storer: StorerState,
    mailer: Arc<dyn Mailer>,
) -> Result<AppState, AuthError> {
    let engine = AuthEngine::init(config.auth_config(), storer, mailer)?;
    Ok(AppState::new(config, engine))
}

/// create_router
///
/// Assembles the routes, the per-route gates and the global middleware chain.
pub fn create_router(state: AppState) -> Router {
    let engine = state.engine.clone();
    let x_request_id = HeaderName::from_static("x-request-id");

    // 1. Gates for the private page: logged in, then not locked, then confirmed.
    let guard = Guard::new(
        engine.clone(),
        AuthRequirement::None,
        FailureResponse::Unauthorized,
    );
    let gates = ServiceBuilder::new()
        .layer(from_fn_with_state(guard, authorize))
        .layer(from_fn_with_state(engine.clone(), require_unlocked))
        .layer(from_fn_with_state(engine.clone(), require_confirmed));

    // 2. Auth routes, mounted with the module list for their templates.
    let auth_router = engine
        .router()
        .layer(from_fn_with_state(engine.clone(), module_list));

    // 3. Global chain, outermost first.
    let chain = ServiceBuilder::new()
        .layer(from_fn_with_state(state.clone(), debug_logger))
        .layer(from_fn_with_state(state.csrf.clone(), csrf_protect))
        .layer(from_fn_with_state(engine.clone(), load_client_state))
        .layer(from_fn_with_state(engine.clone(), remember))
        .layer(from_fn_with_state(state.clone(), data_injector));

    let base_router = Router::new()
        .merge(public::public_routes())
        .merge(authenticated::authenticated_routes().route_layer(gates))
        .nest_service(&engine.config().paths.mount, auth_router)
        .layer(chain)
        .with_state(state);

    // 4. Observability and Correlation Layers (applied outermost)
    base_router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(trace_span_logger)
                    .on_response(
                        DefaultOnResponse::new()
                            .level(Level::INFO)
                            .latency_unit(tower_http::LatencyUnit::Millis),
                    ),
            )
            .layer(PropagateRequestIdLayer::new(x_request_id)),
    )
}

/// trace_span_logger
///
/// Span for each request, carrying the `x-request-id` so every log line of a request can
/// be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
