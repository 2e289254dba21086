use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use url::form_urlencoded;

use super::{AuthEngine, client_state::ClientState, render::RedirectOptions};
use crate::models::User;

const MSG_PLEASE_LOG_IN: &str = "Please log in";

/// What a route demands of the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthRequirement {
    /// Any logged in user, including one restored from a remember cookie.
    None,
    /// A user who entered their password in this session.
    FullAuth,
}

/// How a rejected request is answered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureResponse {
    Unauthorized,
    NotFound,
    /// Send the user to the login page, returning here afterwards.
    Redirect,
}

/// Guard
///
/// State of the `authorize` middleware: the engine plus the route's policy.
#[derive(Clone)]
pub struct Guard {
    engine: AuthEngine,
    requirement: AuthRequirement,
    failure: FailureResponse,
}

impl Guard {
    pub fn new(engine: AuthEngine, requirement: AuthRequirement, failure: FailureResponse) -> Self {
        Self {
            engine,
            requirement,
            failure,
        }
    }
}

/// AuthUser
///
/// The logged in user behind a request. `authorize` stores it in the request
/// extensions; handlers behind the guard take it as an argument.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

/// AuthUser Extractor Implementation
///
/// Reuses the user resolved by `authorize` when present, otherwise resolves it from the
/// session. Rejection: `401 Unauthorized` when nobody is logged in.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AuthEngine: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let engine = AuthEngine::from_ref(state);
        let client = parts
            .extensions
            .get::<ClientState>()
            .cloned()
            .ok_or(StatusCode::UNAUTHORIZED)?;

        engine
            .load_current_user(&client)
            .await
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .map(AuthUser)
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

/// authorize
///
/// Route middleware that lets a request through only when the guard's requirement is
/// met. Half-authenticated sessions (restored from a remember cookie) pass
/// `AuthRequirement::None` but not `AuthRequirement::FullAuth`.
pub async fn authorize(
    State(guard): State<Guard>,
    state: ClientState,
    mut request: Request,
    next: Next,
) -> Response {
    let user = match guard.engine.load_current_user(&state).await {
        Ok(user) => user,
        Err(err) => return err.into_response(),
    };

    let user = user.filter(|_| {
        guard.requirement == AuthRequirement::None || !state.is_half_authed()
    });
    if let Some(user) = user {
        request.extensions_mut().insert(AuthUser(user));
        return next.run(request).await;
    }

    tracing::info!(path = %request.uri().path(), "request not authorized");
    match guard.failure {
        FailureResponse::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
        FailureResponse::NotFound => StatusCode::NOT_FOUND.into_response(),
        FailureResponse::Redirect => {
            let here = request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/");
            let redir: String = form_urlencoded::byte_serialize(here.as_bytes()).collect();
            let login = guard.engine.config().paths.mounted("/login");
            let opts = RedirectOptions::to(format!("{login}?redir={redir}")).failure(MSG_PLEASE_LOG_IN);
            guard.engine.redirect(&state, opts)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{
            client_state::{FLASH_ERROR_KEY, SESSION_HALF_AUTH_KEY, SESSION_KEY},
            mail::LogMailer,
            password::Hasher,
            test_support::test_config,
        },
        repository::MemStorer,
    };
    use axum::{Router, body::Body, http::header, middleware::from_fn_with_state, routing::get};
    use std::sync::Arc;
    use tower::ServiceExt;

    const RICK: &str = "rick@councilofricks.com";

    async fn whoami(AuthUser(user): AuthUser) -> String {
        user.email
    }

    fn guarded(requirement: AuthRequirement, failure: FailureResponse) -> Router {
        let storer = MemStorer::seeded(&Hasher::low_cost()).unwrap();
        let engine = AuthEngine::init(test_config(), Arc::new(storer), Arc::new(LogMailer)).unwrap();
        let guard = Guard::new(engine.clone(), requirement, failure);

        Router::new()
            .route("/guarded", get(whoami))
            .route_layer(from_fn_with_state(guard, authorize))
            .with_state(engine)
    }

    async fn call(router: Router, uri: &str, state: &ClientState) -> Response {
        let request = axum::http::Request::builder()
            .uri(uri)
            .extension(state.clone())
            .body(Body::empty())
            .unwrap();
        router.oneshot(request).await.unwrap()
    }

    fn session_for(pid: &str, half_authed: bool) -> ClientState {
        let state = ClientState::default();
        state.put_session(SESSION_KEY, pid);
        if half_authed {
            state.put_session(SESSION_HALF_AUTH_KEY, "true");
        }
        state
    }

    #[tokio::test]
    async fn any_login_passes_when_full_auth_is_not_required() {
        let router = guarded(AuthRequirement::None, FailureResponse::Unauthorized);
        let response = call(router, "/guarded", &session_for(RICK, true)).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], RICK.as_bytes());
    }

    #[tokio::test]
    async fn full_auth_rejects_remembered_session() {
        let router = guarded(AuthRequirement::FullAuth, FailureResponse::Unauthorized);

        let response = call(router.clone(), "/guarded", &session_for(RICK, true)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = call(router, "/guarded", &session_for(RICK, false)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn not_found_failure_hides_the_route() {
        let router = guarded(AuthRequirement::None, FailureResponse::NotFound);
        let response = call(router, "/guarded", &ClientState::default()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn redirect_failure_sends_to_login_with_return_path() {
        let router = guarded(AuthRequirement::FullAuth, FailureResponse::Redirect);
        let state = session_for(RICK, true);
        let response = call(router, "/guarded?tab=1", &state).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "/auth/login?redir=%2Fguarded%3Ftab%3D1"
        );
        assert_eq!(
            state.take_session(FLASH_ERROR_KEY).as_deref(),
            Some(MSG_PLEASE_LOG_IN)
        );
    }

    #[tokio::test]
    async fn unknown_session_user_is_rejected() {
        let router = guarded(AuthRequirement::None, FailureResponse::Unauthorized);
        let response = call(router, "/guarded", &session_for("gone@example.com", false)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
