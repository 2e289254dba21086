//! Double-submit cookie CSRF protection.
//!
//! Every response to a safe request carries a signed `csrf_token` cookie. Unsafe requests
//! must echo the same token back in the `X-CSRF-Token` header or in a `csrf_token` form
//! or JSON field. Tokens are `HMAC-SHA256(key, nonce) || nonce`, so a cookie planted by
//! another site cannot be forged without the key.
use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::{RngCore, rngs::OsRng};
use sha2::Sha256;
use std::sync::Arc;

pub const CSRF_COOKIE: &str = "csrf_token";
pub const CSRF_HEADER: &str = "x-csrf-token";
pub const CSRF_FIELD: &str = "csrf_token";

const NONCE_SIZE: usize = 32;
const SIGNATURE_SIZE: usize = 32;
const MAX_BODY_SIZE: usize = 1024 * 1024;

type HmacSha256 = Hmac<Sha256>;

/// The token valid for the current request, for embedding in forms.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrfToken(pub String);

/// Csrf
///
/// Signing key and cookie settings of the CSRF middleware.
#[derive(Clone)]
pub struct Csrf {
    key: Arc<[u8]>,
    secure: bool,
}

impl Csrf {
    pub fn new(key: impl Into<Vec<u8>>, secure: bool) -> Self {
        Self {
            key: Arc::from(key.into()),
            secure,
        }
    }

    fn mac(&self, nonce: &[u8]) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key).ok()?;
        mac.update(nonce);
        Some(mac)
    }

    /// A fresh signed token.
    pub fn issue(&self) -> String {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let mut raw = Vec::with_capacity(SIGNATURE_SIZE + NONCE_SIZE);
        if let Some(mac) = self.mac(&nonce) {
            raw.extend_from_slice(&mac.finalize().into_bytes());
        }
        raw.extend_from_slice(&nonce);
        URL_SAFE_NO_PAD.encode(raw)
    }

    /// Whether `token` was signed with this key.
    pub fn is_valid(&self, token: &str) -> bool {
        let Ok(raw) = URL_SAFE_NO_PAD.decode(token) else {
            return false;
        };
        if raw.len() != SIGNATURE_SIZE + NONCE_SIZE {
            return false;
        }
        let (signature, nonce) = raw.split_at(SIGNATURE_SIZE);
        self.mac(nonce)
            .is_some_and(|mac| mac.verify_slice(signature).is_ok())
    }

    fn cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((CSRF_COOKIE, token))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .build()
    }
}

fn is_safe(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

fn reject(reason: &str) -> Response {
    tracing::warn!(reason, "CSRF check failed");
    (StatusCode::BAD_REQUEST, "Bad Request: CSRF token invalid").into_response()
}

/// Reads the submitted token from a buffered form or JSON body.
fn token_from_body(content_type: Option<&str>, body: &[u8]) -> Option<String> {
    if content_type.is_some_and(|ct| ct.starts_with("application/json")) {
        let value: serde_json::Value = serde_json::from_slice(body).ok()?;
        return value.get(CSRF_FIELD)?.as_str().map(str::to_string);
    }
    url::form_urlencoded::parse(body)
        .find(|(name, _)| name == CSRF_FIELD)
        .map(|(_, value)| value.into_owned())
}

/// csrf_protect
///
/// Middleware enforcing the double-submit check on unsafe methods and handing out the
/// cookie on safe ones. Handlers find the current token in the `CsrfToken` extension.
pub async fn csrf_protect(State(csrf): State<Csrf>, request: Request, next: Next) -> Response {
    let jar = CookieJar::from_headers(request.headers());
    let existing = jar
        .get(CSRF_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|token| csrf.is_valid(token));

    if is_safe(request.method()) {
        let (token, fresh) = match existing {
            Some(token) => (token, false),
            None => (csrf.issue(), true),
        };
        let mut request = request;
        request.extensions_mut().insert(CsrfToken(token.clone()));
        let response = next.run(request).await;
        if fresh {
            return (jar.add(csrf.cookie(token)), response).into_response();
        }
        return response;
    }

    let Some(expected) = existing else {
        return reject("missing or forged cookie token");
    };

    let header_token = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut request = match header_token {
        Some(submitted) if submitted == expected => request,
        Some(_) => return reject("header token does not match cookie"),
        None => {
            let (parts, body) = request.into_parts();
            let bytes = match to_bytes(body, MAX_BODY_SIZE).await {
                Ok(bytes) => bytes,
                Err(_) => return reject("unreadable request body"),
            };
            let content_type = parts
                .headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            if token_from_body(content_type, &bytes).as_deref() != Some(expected.as_str()) {
                return reject("form token missing or does not match cookie");
            }
            Request::from_parts(parts, Body::from(bytes))
        }
    };

    request.extensions_mut().insert(CsrfToken(expected));
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_verify_only_under_their_key() {
        let csrf = Csrf::new(vec![7u8; 32], false);
        let token = csrf.issue();
        assert!(csrf.is_valid(&token));
        assert_ne!(token, csrf.issue());

        let other = Csrf::new(vec![8u8; 32], false);
        assert!(!other.is_valid(&token));
        assert!(!csrf.is_valid("short"));
        assert!(!csrf.is_valid("!!!"));
    }

    #[test]
    fn body_token_from_form_and_json() {
        let form = b"email=a%40b.com&csrf_token=abc&password=x";
        assert_eq!(token_from_body(None, form).as_deref(), Some("abc"));
        assert_eq!(
            token_from_body(
                Some("application/x-www-form-urlencoded"),
                b"email=a"
            ),
            None
        );

        let json = br#"{"email":"a@b.com","csrf_token":"xyz"}"#;
        assert_eq!(
            token_from_body(Some("application/json"), json).as_deref(),
            Some("xyz")
        );
    }

    #[test]
    fn safe_methods() {
        assert!(is_safe(&Method::GET));
        assert!(is_safe(&Method::HEAD));
        assert!(!is_safe(&Method::POST));
        assert!(!is_safe(&Method::DELETE));
    }
}
