use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// --- Stored Records ---

/// User
///
/// The record the auth engine reads and writes through the `UserStorer`.
/// It carries the credentials plus the confirm, lock, and recover state of an account.
/// The e-mail address is the primary identifier (PID).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct User {
    pub id: Uuid,
    // Display name, shown as `current_user_name` in the layout.
    pub name: String,
    pub email: String,
    // PHC-formatted argon2 hash, never the plain password.
    pub password: String,

    // Confirmation state. Selector and verifier are base64 SHA-512 digests.
    pub confirm_selector: Option<String>,
    pub confirm_verifier: Option<String>,
    pub confirmed: bool,

    // Lock state.
    pub attempt_count: u32,
    pub last_attempt: Option<DateTime<Utc>>,
    pub locked: Option<DateTime<Utc>>,

    // Recovery state.
    pub recover_selector: Option<String>,
    pub recover_verifier: Option<String>,
    pub recover_token_expiry: Option<DateTime<Utc>>,
}

impl User {
    /// Creates an unconfirmed, unlocked user with a fresh id.
    pub fn new(email: impl Into<String>, name: impl Into<String>, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            password: password_hash,
            ..Default::default()
        }
    }

    /// The primary identifier used in sessions and remember tokens.
    pub fn pid(&self) -> &str {
        &self.email
    }

    /// Whether the account is locked at `now`.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked.is_some_and(|until| until > now)
    }
}

// --- Request Payloads ---

/// LoginForm
///
/// Body of `POST /auth/login`. `rm` is the remember-me checkbox.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub rm: Option<String>,
    #[serde(default)]
    pub redir: Option<String>,
}

impl LoginForm {
    pub fn wants_remember(&self) -> bool {
        matches!(self.rm.as_deref(), Some("true") | Some("on") | Some("1"))
    }
}

/// RegisterForm
///
/// Body of `POST /auth/register`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RegisterForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RecoverStartForm {
    #[serde(default)]
    pub email: String,
}

/// RecoverEndForm
///
/// Body of `POST /auth/recover/end`. `token` is the value mailed to the user.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RecoverEndForm {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfirmQuery {
    #[serde(default)]
    pub cnf: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RecoverEndQuery {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RedirQuery {
    pub redir: Option<String>,
}

// --- Template Data ---

// Well-known keys of `HtmlData`.
pub const DATA_LOGGED_IN: &str = "loggedin";
pub const DATA_CURRENT_USER_NAME: &str = "current_user_name";
pub const DATA_CSRF_TOKEN: &str = "csrf_token";
pub const DATA_FLASH_SUCCESS: &str = "flash_success";
pub const DATA_FLASH_ERROR: &str = "flash_error";
pub const DATA_MODULES: &str = "modules";
pub const DATA_ERR: &str = "error";
pub const DATA_VALIDATION: &str = "errors";
pub const DATA_PRIMARY_ID: &str = "primaryID";
pub const DATA_PRESERVE: &str = "preserve";
pub const DATA_RECOVER_TOKEN: &str = "recover_token";
pub const DATA_MOUNT: &str = "mount";
pub const DATA_REDIR: &str = "redir";

/// HtmlData
///
/// String-keyed values handed to a renderer. The layout part is built once per request by
/// the data injector; pages merge their own values on top.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(transparent)]
pub struct HtmlData(Map<String, Value>);

impl HtmlData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns the value under `key` when it is a non-empty string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Copies every entry of `other` into `self`, overwriting existing keys.
    pub fn merge(&mut self, other: HtmlData) {
        self.0.extend(other.0);
    }
}
