use rantboard::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    identity::{IdentityState, StytchClient},
    store::{SqliteContentStore, StoreState},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads the configuration, sets up logging, opens the content store, builds the
/// identity provider client and serves the board.
#[tokio::main]
async fn main() {
    // 1. Configuration (fails fast on missing production secrets)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise crate debug and request-level info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "rantboard=debug,tower_http=info".into());

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
    if config.dev_mode {
        tracing::warn!("DEV_ENV is set: dev identity header and /admin/reset are enabled");
    }

    // 3. Content store (SQLite, schema bootstrapped on open)
    let store = SqliteContentStore::open(&config.db_url, config.edit_policy)
        .await
        .expect("FATAL: Failed to open the content store. Check DATABASE_URL.");
    let store = Arc::new(store) as StoreState;

    // 4. Identity provider
    let identity = StytchClient::new(&config)
        .expect("FATAL: Failed to build the identity provider client.");
    let identity = Arc::new(identity) as IdentityState;

    // 5. State, router and server
    let listen_addr = config.listen_addr.clone();
    let app = create_router(AppState {
        store,
        identity,
        config,
    });

    let listener = TcpListener::bind(&listen_addr)
        .await
        .expect("FATAL: Failed to bind the listen address. Check LISTEN_ADDR.");

    tracing::info!("Listening on {}", listen_addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server exited with error: {:?}", e);
    }
}
