use std::{env, time::Duration};

use crate::models::EditPolicy;

/// AppConfig
///
/// Holds the application's entire configuration state. Loaded once at startup and
/// shared read-only with every request through the application state.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Socket address the HTTP listener binds to.
    pub listen_addr: String,
    // sqlx connection string for the sqlite store.
    pub db_url: String,
    // Base URL the magic links point back to (e.g. https://board.example.com).
    pub public_url: String,
    // Identity provider credentials.
    pub stytch_project_id: String,
    pub stytch_secret: String,
    // Runtime environment marker. Selects the provider endpoint and log format.
    pub env: Env,
    // Development mode: enables /admin/reset and the x-user-id bypass.
    pub dev_mode: bool,
    // Who may edit a post's mood and description.
    pub edit_policy: EditPolicy,
    // Per-request deadline, also bounding identity provider calls.
    pub request_timeout: Duration,
    // Directory served under /static.
    pub static_dir: String,
}

/// Env
///
/// Defines the runtime context.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// Safe, non-panicking values for tests and local scaffolding.
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".to_string(),
            db_url: "sqlite::memory:".to_string(),
            public_url: "http://localhost:3000".to_string(),
            stytch_project_id: "project-test-local".to_string(),
            stytch_secret: "secret-test-local".to_string(),
            env: Env::Local,
            dev_mode: false,
            edit_policy: EditPolicy::Collaborative,
            request_timeout: Duration::from_secs(10),
            static_dir: "./static".to_string(),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads every parameter from the environment.
    ///
    /// # Panics
    /// Panics in production when the identity provider credentials are missing, so the
    /// server never starts with a login flow that cannot work.
    pub fn load() -> Self {
        let env_str = env::var("APP_ENV").unwrap_or_else(|_| "local".to_string());
        let env = match env_str.as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };

        let (stytch_project_id, stytch_secret) = match env {
            Env::Production => (
                env::var("STYTCH_PROJECT_ID")
                    .expect("FATAL: STYTCH_PROJECT_ID must be set in production."),
                env::var("STYTCH_SECRET").expect("FATAL: STYTCH_SECRET must be set in production."),
            ),
            Env::Local => (
                env::var("STYTCH_PROJECT_ID").unwrap_or_else(|_| "project-test-local".to_string()),
                env::var("STYTCH_SECRET").unwrap_or_else(|_| "secret-test-local".to_string()),
            ),
        };

        let edit_policy = match env::var("EDIT_POLICY") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!("Unknown EDIT_POLICY {:?}, using collaborative", raw);
                EditPolicy::Collaborative
            }),
            Err(_) => EditPolicy::Collaborative,
        };

        let request_timeout = env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(10));

        Self {
            listen_addr: env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            db_url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://rantboard.db".to_string()),
            public_url: env::var("PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            stytch_project_id,
            stytch_secret,
            dev_mode: env::var("DEV_ENV").map(|v| v == "TRUE").unwrap_or(false),
            env,
            edit_policy,
            request_timeout,
            static_dir: env::var("STATIC_DIR").unwrap_or_else(|_| "./static".to_string()),
        }
    }

    /// Base URL of the identity provider's API for this environment.
    pub fn stytch_base_url(&self) -> &'static str {
        match self.env {
            Env::Production => "https://api.stytch.com",
            Env::Local => "https://test.stytch.com",
        }
    }
}
