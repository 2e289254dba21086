use axum::http::Method;
use std::env;

use crate::{
    auth::config::{AuthConfig, Paths},
    cli::Flags,
    error::ConfigError,
};

/// Key of the remember cookie store used when `COOKIE_STORE_KEY` is unset outside production.
pub const DEFAULT_COOKIE_STORE_KEY: &str =
    "yYql7721umGLk/Q10E9M92zNl5WDpFE0yQP4KDo5xhQtAyykWKVckIsHLqx2iPHJSHLz4QHLCwoSDLVhIzcJRg==";
/// Key of the session store used when `SESSION_STORE_KEY` is unset outside production.
pub const DEFAULT_SESSION_STORE_KEY: &str =
    "4DuexvT9AMyK9QcYeVo3MsOq+k8roanWE3nJqByw8ybWVzXEdXmgGAlYyUmDS4TB4ELHcnu1VKpH0FS6vDJVEg==";

/// AppConfig
///
/// Application configuration, immutable once loaded. Built from environment variables
/// and command line flags, then handed to the router through `AppState`.
#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    // Runtime environment marker. Production requires real cookie keys and logs JSON.
    pub env: Env,
    // Socket address the HTTP server binds to.
    pub listen_addr: String,
    // Public URL of the site, used for links in e-mails.
    pub root_url: String,
    // Base64 keys of the encrypted cookie stores.
    pub cookie_store_key: String,
    pub session_store_key: String,
    // -debug, -debugdb, -debugctx
    pub debug: bool,
    pub debug_db: bool,
    pub debug_ctx: bool,
    // -api: JSON responses instead of HTML.
    pub api: bool,
}

/// Env
///
/// The runtime context: local development or production.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// default
    ///
    /// The local development configuration with no environment overrides and no flags.
    fn default() -> Self {
        Self {
            env: Env::Local,
            listen_addr: "0.0.0.0:4000".to_string(),
            root_url: "http://localhost:4000".to_string(),
            cookie_store_key: DEFAULT_COOKIE_STORE_KEY.to_string(),
            session_store_key: DEFAULT_SESSION_STORE_KEY.to_string(),
            debug: false,
            debug_db: false,
            debug_ctx: false,
            api: false,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads `APP_ENV`, `LISTEN_ADDR`, `ROOT_URL`, `COOKIE_STORE_KEY` and
    /// `SESSION_STORE_KEY`, then applies the command line flags.
    ///
    /// # Errors
    /// In production both store keys must be set explicitly; the built-in development keys
    /// are never used there.
    pub fn load(flags: &Flags) -> Result<Self, ConfigError> {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let secret = |name: &'static str, fallback: &str| match (env, env::var(name)) {
            (_, Ok(value)) if !value.is_empty() => Ok(value),
            (Env::Production, _) => Err(ConfigError::MissingSecret(name)),
            (Env::Local, _) => Ok(fallback.to_string()),
        };
        let cookie_store_key = secret("COOKIE_STORE_KEY", DEFAULT_COOKIE_STORE_KEY)?;
        let session_store_key = secret("SESSION_STORE_KEY", DEFAULT_SESSION_STORE_KEY)?;

        let defaults = Self::default();
        let listen_addr = env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr);
        if listen_addr.trim().is_empty() {
            return Err(ConfigError::Invalid {
                name: "LISTEN_ADDR",
                reason: "must not be empty".into(),
            });
        }

        Ok(Self {
            env,
            listen_addr,
            root_url: env::var("ROOT_URL").unwrap_or(defaults.root_url),
            cookie_store_key,
            session_store_key,
            debug: flags.debug,
            debug_db: flags.debug_db,
            debug_ctx: flags.debug_ctx,
            api: flags.api,
        })
    }

    /// auth_config
    ///
    /// The auth engine settings for this application: mounted at `/auth`, every module on,
    /// logout over GET for HTML clients (links) and DELETE for API clients.
    pub fn auth_config(&self) -> AuthConfig {
        let mut config = AuthConfig {
            paths: Paths {
                root_url: self.root_url.clone(),
                ..Paths::default()
            },
            ..AuthConfig::default()
        };
        config.core.api = self.api;
        config.modules.logout_method = if self.api {
            Method::DELETE
        } else {
            Method::GET
        };
        config.storage.cookie_key = self.cookie_store_key.clone();
        config.storage.session_key = self.session_store_key.clone();
        config.storage.secure = self.env == Env::Production;
        config
    }
}
