use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// Maintenance endpoints. Each handler checks the development flag itself; outside
/// development mode they refuse to act.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/reset
        // Wipes posts, comments and settings.
        .route("/reset", get(handlers::admin_reset))
}
