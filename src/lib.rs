use axum::{
    Router,
    extract::FromRef,
    http::{HeaderName, StatusCode},
    middleware,
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod models;
pub mod response;
pub mod store;
pub mod views;

// Route groups, one per access policy.
pub mod routes;
use auth::{AccessGate, access_gate};
use response::LoginReason;
use routes::{admin, authenticated, board, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use identity::{Identity, IdentityResolver, IdentityState, MockIdentityProvider, StytchClient};
pub use store::{ContentStore, SqliteContentStore, StoreState};

/// AppState
///
/// The single, cloneable container of everything handlers share: the content store,
/// the identity provider and the configuration. Holds no per-request data; the
/// requester's identity travels in the request itself.
#[derive(Clone)]
pub struct AppState {
    pub store: StoreState,
    pub identity: IdentityState,
    pub config: AppConfig,
}

impl AppState {
    pub fn resolver(&self) -> IdentityResolver {
        IdentityResolver::new(self.identity.clone(), &self.config)
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for StoreState {
    fn from_ref(app_state: &AppState) -> StoreState {
        app_state.store.clone()
    }
}

impl FromRef<AppState> for IdentityState {
    fn from_ref(app_state: &AppState) -> IdentityState {
        app_state.identity.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the route groups, puts each behind its access gate and wraps the whole
/// application in the request id, tracing and deadline layers.
pub fn create_router(state: AppState) -> Router {
    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        // Board pages and interactions: identity resolved, never blocked here.
        .merge(board::board_routes().route_layer(middleware::from_fn_with_state(
            AccessGate::soft(&state),
            access_gate,
        )))
        // Creating a post requires a login; the login page explains why.
        .merge(
            authenticated::post_routes().route_layer(middleware::from_fn_with_state(
                AccessGate::hard(Some(LoginReason::NewPost), &state),
                access_gate,
            )),
        )
        // Per-user settings.
        .merge(
            authenticated::settings_routes().route_layer(middleware::from_fn_with_state(
                AccessGate::hard(None, &state),
                access_gate,
            )),
        )
        .merge(public::public_routes())
        .nest("/admin", admin::admin_routes())
        .nest_service("/static", ServeDir::new(&state.config.static_dir))
        .with_state(state.clone());

    base_router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(trace_span_logger)
                    .on_response(
                        DefaultOnResponse::new()
                            .level(Level::INFO)
                            .latency_unit(tower_http::LatencyUnit::Millis),
                    ),
            )
            .layer(PropagateRequestIdLayer::new(x_request_id))
            // Aborts anything stalled past the deadline, identity provider calls included.
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                state.config.request_timeout,
            )),
    )
}

/// trace_span_logger
///
/// Span for every request, correlated by its `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
