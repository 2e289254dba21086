mod common;

use axum::{
    body::Body,
    http::{Method, StatusCode, header},
};
use common::{RICK, RICK_PASSWORD, TestApp};

#[tokio::test]
async fn test_root_lists_links() {
    let mut app = TestApp::new();
    let response = app.get("/").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.headers[header::CONTENT_TYPE],
        "text/html; charset=utf-8"
    );
    assert_eq!(
        response.body,
        "welcome <a href=\"/auth/login\">login</A> <a href=\"/auth/logout\">logout</a> <a href=\"/auth/register\">register</a> <a href=\"/private\">private</a> "
    );
    // Request correlation id is echoed back.
    assert!(response.headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_private_requires_login() {
    let mut app = TestApp::new();
    let response = app.get("/private").await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_private_after_login() {
    let mut app = TestApp::new();

    let login = app.login(RICK, RICK_PASSWORD).await;
    assert_eq!(login.status, StatusCode::FOUND);
    assert_eq!(login.location(), "/");
    assert!(app.cookies.contains_key("ab_hello"));

    let response = app.get("/private").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, "secrets");
    assert_eq!(
        response.headers[header::CONTENT_TYPE],
        "text/html; charset=utf-8"
    );
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let mut app = TestApp::new();
    assert_eq!(app.get("/nope").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_safe_request_hands_out_csrf_cookie() {
    let mut app = TestApp::new();
    let response = app.get("/auth/login").await;

    assert_eq!(response.status, StatusCode::OK);
    let token = app.cookies.get("csrf_token").cloned().unwrap();
    // The login form embeds the same token.
    assert!(response.body.contains(&format!("value=\"{token}\"")));

    // A second page view keeps the existing token.
    app.get("/auth/login").await;
    assert_eq!(app.cookies["csrf_token"], token);
}

#[tokio::test]
async fn test_post_without_csrf_token_is_rejected() {
    let mut app = TestApp::new();
    app.get("/").await;

    let body = format!("email={RICK}&password={RICK_PASSWORD}");
    let response = app.post_raw("/auth/login", body).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(!app.cookies.contains_key("ab_hello"));
}

#[tokio::test]
async fn test_post_with_mismatched_csrf_token_is_rejected() {
    let mut app = TestApp::new();
    app.get("/").await;

    let body = format!("email={RICK}&password={RICK_PASSWORD}&csrf_token=forged");
    let response = app.post_raw("/auth/login", body).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_post_without_csrf_cookie_is_rejected() {
    let mut app = TestApp::new();
    let response = app
        .post_raw("/auth/login", "csrf_token=abc".to_string())
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_csrf_token_accepted_from_header() {
    let mut app = TestApp::new();
    let token = app.csrf_token().await;

    let request = app
        .builder(Method::POST, "/auth/login")
        .header("x-csrf-token", token)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("email=rick%40councilofricks.com&password=1234"))
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status, StatusCode::FOUND);
    assert_eq!(app.get("/private").await.status, StatusCode::OK);
}
