//! Page rendering and the two response styles of the engine.
//!
//! HTML mode renders pages with a small layout and answers flows with `302 Found` plus a
//! flash message in the session. API mode serializes the page data as JSON and answers
//! flows with a JSON status object instead of a redirect.
use axum::{
    Json,
    extract::{FromRequest, Request},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::fmt::Write as _;
use url::Url;

use super::client_state::ClientState;
use crate::{
    error::AuthError,
    models::{
        DATA_CSRF_TOKEN, DATA_CURRENT_USER_NAME, DATA_ERR, DATA_FLASH_ERROR, DATA_FLASH_SUCCESS,
        DATA_LOGGED_IN, DATA_PRESERVE, DATA_PRIMARY_ID, DATA_RECOVER_TOKEN, DATA_REDIR,
        DATA_VALIDATION, HtmlData,
    },
};

/// Page
///
/// The pages the auth modules render.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Page {
    Login,
    Register,
    RecoverStart,
    RecoverEnd,
}

impl Page {
    pub fn name(self) -> &'static str {
        match self {
            Page::Login => "login",
            Page::Register => "register",
            Page::RecoverStart => "recover_start",
            Page::RecoverEnd => "recover_end",
        }
    }
}

/// Rendered output and its content type.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub body: String,
    pub content_type: &'static str,
}

/// Renderer
///
/// Turns a page plus its data into bytes. Selected once at engine init from `core.api`.
pub trait Renderer: Send + Sync {
    fn render(&self, page: Page, data: &HtmlData) -> Result<Rendered, AuthError>;
}

/// JsonRenderer
///
/// Serializes the data as-is; the page only matters to HTML clients.
pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn render(&self, _page: Page, data: &HtmlData) -> Result<Rendered, AuthError> {
        Ok(Rendered {
            body: serde_json::to_string(data)?,
            content_type: "application/json",
        })
    }
}

/// HtmlRenderer
///
/// Inline templates for the four auth pages, wrapped in a layout that shows the flash
/// messages and who is logged in. Every interpolated value is escaped.
pub struct HtmlRenderer {
    mount: String,
    logout_via_link: bool,
}

impl HtmlRenderer {
    pub fn new(mount: impl Into<String>, logout_via_link: bool) -> Self {
        Self {
            mount: mount.into(),
            logout_via_link,
        }
    }

    fn layout(&self, title: &str, data: &HtmlData, content: &str) -> String {
        let mut html = String::new();
        let _ = write!(
            html,
            "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n<nav>",
            escape(title)
        );

        if data.get_bool(DATA_LOGGED_IN) {
            let name = data.get_str(DATA_CURRENT_USER_NAME).unwrap_or("");
            let _ = write!(html, "Logged in as {} ", escape(name));
            if self.logout_via_link {
                let _ = write!(html, "<a href=\"{}/logout\">logout</a>", self.mount);
            } else {
                let _ = write!(
                    html,
                    "<form method=\"post\" action=\"{}/logout\">{}<button type=\"submit\">logout</button></form>",
                    self.mount,
                    csrf_input(data)
                );
            }
        } else {
            let _ = write!(
                html,
                "<a href=\"{m}/login\">login</a> <a href=\"{m}/register\">register</a>",
                m = self.mount
            );
        }
        html.push_str(" <a href=\"/\">home</a> <a href=\"/private\">private</a></nav>\n");

        if let Some(msg) = data.get_str(DATA_FLASH_SUCCESS) {
            let _ = writeln!(html, "<div class=\"flash-success\">{}</div>", escape(msg));
        }
        if let Some(msg) = data.get_str(DATA_FLASH_ERROR) {
            let _ = writeln!(html, "<div class=\"flash-error\">{}</div>", escape(msg));
        }
        if let Some(msg) = data.get_str(DATA_ERR) {
            let _ = writeln!(html, "<div class=\"error\">{}</div>", escape(msg));
        }

        html.push_str(content);
        html.push_str("\n</body>\n</html>\n");
        html
    }

    fn login(&self, data: &HtmlData) -> String {
        let mut form = format!("<form method=\"post\" action=\"{}/login\">\n", self.mount);
        form.push_str(&csrf_input(data));
        if let Some(redir) = data.get_str(DATA_REDIR) {
            let _ = writeln!(
                form,
                "<input type=\"hidden\" name=\"redir\" value=\"{}\">",
                escape(redir)
            );
        }
        form.push_str(&text_input(
            "E-mail",
            "email",
            "email",
            data.get_str(DATA_PRIMARY_ID).unwrap_or(""),
            data,
        ));
        form.push_str(&text_input("Password", "password", "password", "", data));
        form.push_str(
            "<label><input type=\"checkbox\" name=\"rm\" value=\"true\"> Remember me</label>\n",
        );
        form.push_str("<button type=\"submit\">Login</button>\n</form>\n");
        let _ = write!(
            form,
            "<a href=\"{m}/register\">Register</a> <a href=\"{m}/recover\">Forgot password?</a>",
            m = self.mount
        );
        form
    }

    fn register(&self, data: &HtmlData) -> String {
        let preserved = |field: &str| -> String {
            data.get(DATA_PRESERVE)
                .and_then(|p| p.get(field))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string()
        };

        let mut form = format!("<form method=\"post\" action=\"{}/register\">\n", self.mount);
        form.push_str(&csrf_input(data));
        form.push_str(&text_input("E-mail", "email", "email", &preserved("email"), data));
        form.push_str(&text_input("Name", "name", "text", &preserved("name"), data));
        form.push_str(&text_input("Password", "password", "password", "", data));
        form.push_str(&text_input(
            "Confirm password",
            "confirm_password",
            "password",
            "",
            data,
        ));
        form.push_str("<button type=\"submit\">Register</button>\n</form>\n");
        form
    }

    fn recover_start(&self, data: &HtmlData) -> String {
        let mut form = format!("<form method=\"post\" action=\"{}/recover\">\n", self.mount);
        form.push_str(&csrf_input(data));
        form.push_str(&text_input(
            "E-mail",
            "email",
            "email",
            data.get_str(DATA_PRIMARY_ID).unwrap_or(""),
            data,
        ));
        form.push_str("<button type=\"submit\">Send recovery e-mail</button>\n</form>\n");
        form
    }

    fn recover_end(&self, data: &HtmlData) -> String {
        let mut form = format!(
            "<form method=\"post\" action=\"{}/recover/end\">\n",
            self.mount
        );
        form.push_str(&csrf_input(data));
        let _ = writeln!(
            form,
            "<input type=\"hidden\" name=\"token\" value=\"{}\">",
            escape(data.get_str(DATA_RECOVER_TOKEN).unwrap_or(""))
        );
        form.push_str(&field_errors("token", data));
        form.push_str(&text_input("New password", "password", "password", "", data));
        form.push_str(&text_input(
            "Confirm password",
            "confirm_password",
            "password",
            "",
            data,
        ));
        form.push_str("<button type=\"submit\">Change password</button>\n</form>\n");
        form
    }
}

impl Renderer for HtmlRenderer {
    fn render(&self, page: Page, data: &HtmlData) -> Result<Rendered, AuthError> {
        let (title, content) = match page {
            Page::Login => ("Login", self.login(data)),
            Page::Register => ("Register", self.register(data)),
            Page::RecoverStart => ("Recover", self.recover_start(data)),
            Page::RecoverEnd => ("Reset password", self.recover_end(data)),
        };
        Ok(Rendered {
            body: self.layout(title, data, &content),
            content_type: "text/html; charset=utf-8",
        })
    }
}

fn csrf_input(data: &HtmlData) -> String {
    format!(
        "<input type=\"hidden\" name=\"csrf_token\" value=\"{}\">\n",
        escape(data.get_str(DATA_CSRF_TOKEN).unwrap_or(""))
    )
}

fn text_input(label: &str, name: &str, kind: &str, value: &str, data: &HtmlData) -> String {
    format!(
        "<label>{label} <input type=\"{kind}\" name=\"{name}\" value=\"{}\"></label>\n{}",
        escape(value),
        field_errors(name, data)
    )
}

fn field_errors(name: &str, data: &HtmlData) -> String {
    let mut out = String::new();
    let messages = data
        .get(DATA_VALIDATION)
        .and_then(|errors| errors.get(name))
        .and_then(Value::as_array);
    for message in messages.into_iter().flatten().filter_map(Value::as_str) {
        let _ = writeln!(out, "<span class=\"field-error\">{}</span>", escape(message));
    }
    out
}

/// Minimal HTML escaping for text and attribute values.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Builds the response for a rendered page, or a 500 when rendering fails.
pub fn rendered_response(status: StatusCode, rendered: Result<Rendered, AuthError>) -> Response {
    match rendered {
        Ok(Rendered { body, content_type }) => (
            status,
            [(header::CONTENT_TYPE, HeaderValue::from_static(content_type))],
            body,
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

/// RedirectOptions
///
/// Where a finished flow sends the user and which flash message goes with it.
/// `redir` is the caller-supplied return path; it wins over `path` when it is local.
#[derive(Debug, Clone, Default)]
pub struct RedirectOptions {
    pub path: String,
    pub success: Option<String>,
    pub failure: Option<String>,
    pub redir: Option<String>,
}

impl RedirectOptions {
    pub fn to(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn success(mut self, message: impl Into<String>) -> Self {
        self.success = Some(message.into());
        self
    }

    pub fn failure(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn follow(mut self, redir: Option<String>) -> Self {
        self.redir = redir;
        self
    }

    fn location(&self) -> &str {
        self.redir
            .as_deref()
            .filter(|r| is_local_path(r))
            .unwrap_or(&self.path)
    }
}

/// Only same-site absolute paths may be used as a return location.
///
/// Browsers drop tabs and newlines and read `\` as `/` when resolving a location, so
/// any control character, whitespace or backslash disqualifies the path outright.
pub fn is_local_path(path: &str) -> bool {
    if !path.starts_with('/')
        || path.starts_with("//")
        || path
            .chars()
            .any(|c| c.is_control() || c.is_whitespace() || c == '\\')
    {
        return false;
    }

    let Ok(base) = Url::parse("http://localhost/") else {
        return false;
    };
    base.join(path).is_ok_and(|resolved| {
        resolved.scheme() == base.scheme()
            && resolved.host() == base.host()
            && resolved.port() == base.port()
    })
}

/// HTML clients get a flash message and a `302 Found`.
pub fn html_redirect(state: &ClientState, opts: &RedirectOptions) -> Response {
    if let Some(msg) = &opts.success {
        state.flash_success(msg.clone());
    }
    if let Some(msg) = &opts.failure {
        state.flash_error(msg.clone());
    }
    match HeaderValue::from_str(opts.location()) {
        Ok(location) => (StatusCode::FOUND, [(header::LOCATION, location)]).into_response(),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}

/// API clients get the outcome as JSON.
pub fn json_redirect(opts: &RedirectOptions) -> Response {
    let body = match &opts.failure {
        Some(error) => json!({ "status": "failure", "location": opts.location(), "error": error }),
        None => {
            let mut body = json!({ "status": "success", "location": opts.location() });
            if let Some(message) = &opts.success {
                body["message"] = Value::String(message.clone());
            }
            body
        }
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// Values
///
/// Form input extractor for the auth pages: JSON bodies when the request says
/// `application/json`, urlencoded forms otherwise.
pub struct Values<T>(pub T);

impl<T, S> FromRequest<S> for Values<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));

        if is_json {
            Json::<T>::from_request(req, state)
                .await
                .map(|Json(value)| Values(value))
                .map_err(IntoResponse::into_response)
        } else {
            axum::Form::<T>::from_request(req, state)
                .await
                .map(|axum::Form(value)| Values(value))
                .map_err(IntoResponse::into_response)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_blocks_markup() {
        assert_eq!(
            escape("<script>\"x\" & 'y'</script>"),
            "&lt;script&gt;&quot;x&quot; &amp; &#39;y&#39;&lt;/script&gt;"
        );
    }

    #[test]
    fn login_page_keeps_pid_and_error() {
        let renderer = HtmlRenderer::new("/auth", true);
        let data = HtmlData::new()
            .with(DATA_ERR, "Invalid Credentials")
            .with(DATA_PRIMARY_ID, "rick@councilofricks.com")
            .with(DATA_CSRF_TOKEN, "tok");

        let out = renderer.render(Page::Login, &data).unwrap();
        assert_eq!(out.content_type, "text/html; charset=utf-8");
        assert!(out.body.contains("Invalid Credentials"));
        assert!(out.body.contains("value=\"rick@councilofricks.com\""));
        assert!(out.body.contains("name=\"csrf_token\" value=\"tok\""));
        assert!(out.body.contains("action=\"/auth/login\""));
    }

    #[test]
    fn register_page_shows_field_errors() {
        let renderer = HtmlRenderer::new("/auth", true);
        let data = HtmlData::new()
            .with(DATA_VALIDATION, json!({ "email": ["Must be a valid e-mail address"] }))
            .with(DATA_PRESERVE, json!({ "email": "nope", "name": "Morty" }));

        let body = renderer.render(Page::Register, &data).unwrap().body;
        assert!(body.contains("Must be a valid e-mail address"));
        assert!(body.contains("value=\"Morty\""));
    }

    #[test]
    fn logged_in_layout_uses_form_when_logout_is_not_get() {
        let renderer = HtmlRenderer::new("/auth", false);
        let data = HtmlData::new()
            .with(DATA_LOGGED_IN, true)
            .with(DATA_CURRENT_USER_NAME, "Rick");

        let body = renderer.render(Page::Login, &data).unwrap().body;
        assert!(body.contains("Logged in as Rick"));
        assert!(body.contains("<form method=\"post\" action=\"/auth/logout\">"));
    }

    #[test]
    fn json_renderer_serializes_data() {
        let data = HtmlData::new().with(DATA_ERR, "Invalid Credentials");
        let out = JsonRenderer.render(Page::Login, &data).unwrap();
        assert_eq!(out.content_type, "application/json");
        assert_eq!(out.body, r#"{"error":"Invalid Credentials"}"#);
    }

    #[test]
    fn redirect_location_only_follows_local_paths() {
        let opts = RedirectOptions::to("/").follow(Some("/private".into()));
        assert_eq!(opts.location(), "/private");

        let opts = RedirectOptions::to("/").follow(Some("//evil.example".into()));
        assert_eq!(opts.location(), "/");

        let opts = RedirectOptions::to("/").follow(Some("https://evil.example".into()));
        assert_eq!(opts.location(), "/");

        for redir in ["/\t/evil.example", "/\n/evil.example", "/\\evil.example", "/ /x"] {
            let opts = RedirectOptions::to("/").follow(Some(redir.into()));
            assert_eq!(opts.location(), "/", "{redir:?} must not be followed");
        }

        let opts = RedirectOptions::to("/").follow(Some("/private?tab=1#top".into()));
        assert_eq!(opts.location(), "/private?tab=1#top");
    }

    #[tokio::test]
    async fn json_redirect_ignores_smuggled_host() {
        let opts = RedirectOptions::to("/").follow(Some("/\t/evil.example".into()));
        let response = json_redirect(&opts);
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["location"], "/");
    }

    #[test]
    fn html_redirect_sets_flash() {
        let state = ClientState::default();
        let response = html_redirect(&state, &RedirectOptions::to("/").success("done"));

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/");
        assert_eq!(
            state.take_session(super::super::client_state::FLASH_SUCCESS_KEY).as_deref(),
            Some("done")
        );
    }
}
