use hello_auth::{
    MemStorer, StorerState, build_state,
    auth::mail::LogMailer,
    cli::Flags,
    config::{AppConfig, Env},
    create_router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration and flags, sets up logging, builds the auth engine on an in-memory
/// user store and serves the app. Any initialization failure aborts the process.
#[tokio::main]
async fn main() {
    // 1. Configuration & Flags (Fail-Fast)
    dotenv::dotenv().ok();
    let flags = Flags::parse_args(std::env::args());
    let config = AppConfig::load(&flags)
        .unwrap_or_else(|err| panic!("FATAL: invalid configuration: {err}"));

    // 2. Logging Filter Setup
    // RUST_LOG wins; otherwise -debug decides the default level.
    let default_filter = if config.debug {
        "hello_auth=debug,tower_http=debug"
    } else {
        "hello_auth=info,tower_http=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    // 3. Initialize Logging based on Environment
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. User Store
    // In-memory only; seeded with one confirmed demo account.
    let auth_config = config.auth_config();
    let storer = Arc::new(
        MemStorer::seeded(&auth_config.core.hasher)
            .expect("FATAL: failed to seed the user store"),
    ) as StorerState;

    // 5. Auth Engine & Unified State
    let listen_addr = config.listen_addr.clone();
    let root_url = config.root_url.clone();
    let state = build_state(config, storer, Arc::new(LogMailer))
        .unwrap_or_else(|err| panic!("FATAL: auth engine initialization failed: {err}"));

    // 6. Router and Server Startup
    let app = create_router(state);
    let listener = TcpListener::bind(&listen_addr)
        .await
        .unwrap_or_else(|err| panic!("FATAL: failed to bind {listen_addr}: {err}"));

    tracing::info!("Listening on {listen_addr}");
    tracing::info!("Open {root_url} in a browser");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated");
}
