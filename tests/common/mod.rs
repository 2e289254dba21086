#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use hello_auth::{
    AppConfig, AppState, MemStorer, StorerState,
    auth::{
        AuthEngine,
        mail::{Email, Mailer},
        password::Hasher,
    },
    create_router,
    error::AuthError,
};
use parking_lot::Mutex;
use std::{collections::BTreeMap, sync::Arc};
use tower::ServiceExt;

pub const RICK: &str = "rick@councilofricks.com";
pub const RICK_PASSWORD: &str = "1234";
pub const ROOT_URL: &str = "http://localhost:4000";

// --- Mock Mailer ---

/// Keeps every e-mail instead of sending it, so tests can follow the mailed links.
#[derive(Default)]
pub struct CapturingMailer {
    pub sent: Mutex<Vec<Email>>,
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send(&self, email: Email) -> Result<(), AuthError> {
        self.sent.lock().push(email);
        Ok(())
    }
}

impl CapturingMailer {
    /// Path and query of the link in the last e-mail, relative to the root URL.
    pub fn last_link(&self) -> String {
        let sent = self.sent.lock();
        let email = sent.last().expect("no e-mail was sent");
        let url = email
            .text_body
            .lines()
            .find(|line| line.starts_with(ROOT_URL))
            .expect("e-mail has no link");
        url.trim_start_matches(ROOT_URL).to_string()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

// --- Test Client ---

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn location(&self) -> &str {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("body is not JSON")
    }
}

/// TestApp
///
/// The full router over a seeded in-memory store, plus a cookie jar that behaves like a
/// browser: cookies from `Set-Cookie` are stored and sent back on later requests.
pub struct TestApp {
    pub router: Router,
    pub storer: Arc<MemStorer>,
    pub mailer: Arc<CapturingMailer>,
    pub cookies: BTreeMap<String, String>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let hasher = Hasher::low_cost();
        let storer = Arc::new(MemStorer::seeded(&hasher).unwrap());
        let mailer = Arc::new(CapturingMailer::default());

        let mut auth_config = config.auth_config();
        auth_config.core.hasher = hasher;
        let engine = AuthEngine::init(
            auth_config,
            storer.clone() as StorerState,
            mailer.clone() as Arc<dyn Mailer>,
        )
        .unwrap();

        Self {
            router: create_router(AppState::new(config, engine)),
            storer,
            mailer,
            cookies: BTreeMap::new(),
        }
    }

    pub async fn send(&mut self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();

        for value in response.headers().get_all(header::SET_COOKIE) {
            self.store_cookie(value.to_str().unwrap());
        }

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        TestResponse {
            status,
            headers,
            body: String::from_utf8(bytes.to_vec()).unwrap(),
        }
    }

    fn store_cookie(&mut self, set_cookie: &str) {
        let mut parts = set_cookie.split(';').map(str::trim);
        let Some((name, value)) = parts.next().and_then(|pair| pair.split_once('=')) else {
            return;
        };
        let removed = parts.any(|attr| attr.eq_ignore_ascii_case("max-age=0"));
        if removed || value.is_empty() {
            self.cookies.remove(name);
        } else {
            self.cookies.insert(name.to_string(), value.to_string());
        }
    }

    fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn builder(&self, method: Method, uri: &str) -> axum::http::request::Builder {
        let mut builder = Request::builder().method(method).uri(uri);
        if !self.cookies.is_empty() {
            builder = builder.header(header::COOKIE, self.cookie_header());
        }
        builder
    }

    pub async fn get(&mut self, uri: &str) -> TestResponse {
        let request = self.builder(Method::GET, uri).body(Body::empty()).unwrap();
        self.send(request).await
    }

    /// The CSRF token the browser holds, fetching a page first if there is none yet.
    pub async fn csrf_token(&mut self) -> String {
        if !self.cookies.contains_key("csrf_token") {
            self.get("/").await;
        }
        self.cookies["csrf_token"].clone()
    }

    /// Posts an urlencoded form with the CSRF token filled in, like a rendered page would.
    pub async fn post_form(&mut self, uri: &str, fields: &[(&str, &str)]) -> TestResponse {
        let token = self.csrf_token().await;
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields.iter().copied())
            .append_pair("csrf_token", &token)
            .finish();
        self.post_raw(uri, body).await
    }

    /// Posts an urlencoded body exactly as given.
    pub async fn post_raw(&mut self, uri: &str, body: String) -> TestResponse {
        let request = self
            .builder(Method::POST, uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    pub async fn login(&mut self, email: &str, password: &str) -> TestResponse {
        self.post_form("/auth/login", &[("email", email), ("password", password)])
            .await
    }
}
