use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Ungated endpoints: the magic-link login flow, static informational pages and the
/// health check. Nothing here reads an `Identity`.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check.
        .route("/health", get(|| async { "ok" }))
        // GET /login?r=new
        // Login form, with a contextual message for the reason code.
        .route("/login", get(handlers::login))
        // POST /login/sendlink
        // Asks the identity provider to email a magic link.
        .route("/login/sendlink", post(handlers::send_link))
        // GET /authenticate?token=..
        // Landing point of the emailed link; exchanges it for a session cookie.
        .route("/authenticate", get(handlers::authenticate))
        // GET /logout
        .route("/logout", get(handlers::logout).post(handlers::logout))
        .route("/error", get(handlers::error_page))
        .route("/about", get(handlers::about))
}
