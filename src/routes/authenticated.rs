use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Routes that never run for anonymous users. The hard gate mounted in
/// `create_router` redirects them to the login page first, so every handler here can
/// rely on an authenticated `Identity`.

/// POST /posts
/// Creates a post named by the submitted slug and lands on it. Gated with the `new`
/// login reason.
pub fn post_routes() -> Router<AppState> {
    Router::new().route("/posts", post(handlers::create_post))
}

/// Per-user settings.
pub fn settings_routes() -> Router<AppState> {
    Router::new()
        // GET /settings?r=firstlogin
        .route("/settings", get(handlers::settings).post(handlers::edit_settings))
        // POST /settings/edit
        .route("/settings/edit", post(handlers::edit_settings))
}
