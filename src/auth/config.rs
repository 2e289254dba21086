use axum::http::Method;
use chrono::Duration;

use super::password::Hasher;

/// AuthConfig
///
/// Everything the auth engine needs to know about its surroundings, grouped the way the
/// application configures it in `main`: where it is mounted and where it redirects to,
/// which modules run and with which policy, how mail is addressed, and how client state
/// is stored.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    pub paths: Paths,
    pub modules: Modules,
    pub mail: MailConfig,
    pub core: Core,
    pub storage: ClientStorage,
}

/// Paths
///
/// `mount` prefixes every auth route; `root_url` is used to build links in e-mails.
/// The remaining fields are redirect targets after each flow.
#[derive(Clone, Debug)]
pub struct Paths {
    pub mount: String,
    pub root_url: String,
    pub auth_login_ok: String,
    pub confirm_ok: String,
    pub confirm_not_ok: String,
    pub lock_not_ok: String,
    pub logout_ok: String,
    pub recover_ok: String,
    pub register_ok: String,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            mount: "/auth".to_string(),
            root_url: "http://localhost:4000".to_string(),
            auth_login_ok: "/".to_string(),
            confirm_ok: "/".to_string(),
            confirm_not_ok: "/".to_string(),
            lock_not_ok: "/".to_string(),
            logout_ok: "/".to_string(),
            recover_ok: "/".to_string(),
            register_ok: "/".to_string(),
        }
    }
}

impl Paths {
    /// `<mount><path>`, e.g. `/auth/login`.
    pub fn mounted(&self, path: &str) -> String {
        format!("{}{}", self.mount, path)
    }

    /// `<root_url><mount><path>`, used for links sent by e-mail.
    pub fn absolute(&self, path: &str) -> String {
        format!("{}{}{}", self.root_url.trim_end_matches('/'), self.mount, path)
    }
}

/// Module
///
/// The flows the engine can mount.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Module {
    Auth,
    Confirm,
    Lock,
    Logout,
    Recover,
    Register,
    Remember,
}

impl Module {
    pub const ALL: [Module; 7] = [
        Module::Auth,
        Module::Confirm,
        Module::Lock,
        Module::Logout,
        Module::Recover,
        Module::Register,
        Module::Remember,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Module::Auth => "auth",
            Module::Confirm => "confirm",
            Module::Lock => "lock",
            Module::Logout => "logout",
            Module::Recover => "recover",
            Module::Register => "register",
            Module::Remember => "remember",
        }
    }
}

/// Modules
///
/// Enabled modules and their policy knobs.
#[derive(Clone, Debug)]
pub struct Modules {
    pub enabled: Vec<Module>,
    pub logout_method: Method,
    // Lock: failures within `lock_window` counted; `lock_after` of them lock the account.
    pub lock_after: u32,
    pub lock_window: Duration,
    pub lock_duration: Duration,
    pub recover_token_duration: Duration,
    pub recover_login_after_recovery: bool,
}

impl Default for Modules {
    fn default() -> Self {
        Self {
            enabled: Module::ALL.to_vec(),
            logout_method: Method::DELETE,
            lock_after: 3,
            lock_window: Duration::minutes(5),
            lock_duration: Duration::hours(12),
            recover_token_duration: Duration::hours(24),
            recover_login_after_recovery: false,
        }
    }
}

impl Modules {
    pub fn is_enabled(&self, module: Module) -> bool {
        self.enabled.contains(&module)
    }
}

#[derive(Clone, Debug)]
pub struct MailConfig {
    pub from: String,
    pub subject_prefix: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: "hello-auth@localhost".to_string(),
            subject_prefix: String::new(),
        }
    }
}

/// Core
///
/// `api` selects JSON rendering and JSON redirects instead of HTML pages and 302s.
#[derive(Clone, Debug, Default)]
pub struct Core {
    pub api: bool,
    pub hasher: Hasher,
}

/// ClientStorage
///
/// Cookie names, lifetimes, flags, and the base64 keys of the two encrypted cookie stores.
#[derive(Clone, Debug)]
pub struct ClientStorage {
    pub session_cookie_name: String,
    pub session_max_age: Duration,
    pub cookie_max_age: Duration,
    pub http_only: bool,
    pub secure: bool,
    pub session_key: String,
    pub cookie_key: String,
}

impl Default for ClientStorage {
    fn default() -> Self {
        Self {
            session_cookie_name: "ab_hello".to_string(),
            session_max_age: Duration::days(30),
            cookie_max_age: Duration::hours(730),
            http_only: false,
            secure: false,
            session_key: String::new(),
            cookie_key: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mounted_and_absolute_paths() {
        let paths = Paths::default();
        assert_eq!(paths.mounted("/login"), "/auth/login");
        assert_eq!(
            paths.absolute("/confirm?cnf=abc"),
            "http://localhost:4000/auth/confirm?cnf=abc"
        );
    }

    #[test]
    fn every_module_enabled_by_default() {
        let modules = Modules::default();
        assert!(Module::ALL.iter().all(|m| modules.is_enabled(*m)));
        assert_eq!(modules.lock_after, 3);
    }
}
