use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    AppState,
    identity::IdentityResolver,
    response::{LoginReason, Outcome, RenderMode},
};

/// GatePolicy
///
/// `Soft` resolves the identity and always lets the request through; `Hard` turns
/// anonymous requests away before the handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePolicy {
    Soft,
    Hard,
}

/// AccessGate
///
/// State of the `access_gate` middleware. One gate per route group: the policy and
/// the login reason are data, the control flow is shared.
#[derive(Clone)]
pub struct AccessGate {
    pub policy: GatePolicy,
    // Carried to the login page when a hard gate turns a request away.
    pub reason: Option<LoginReason>,
    resolver: IdentityResolver,
}

impl AccessGate {
    pub fn new(policy: GatePolicy, reason: Option<LoginReason>, state: &AppState) -> Self {
        Self {
            policy,
            reason,
            resolver: state.resolver(),
        }
    }

    pub fn soft(state: &AppState) -> Self {
        Self::new(GatePolicy::Soft, None, state)
    }

    pub fn hard(reason: Option<LoginReason>, state: &AppState) -> Self {
        Self::new(GatePolicy::Hard, reason, state)
    }
}

/// access_gate
///
/// Resolves the request's `Identity` and stores it in the request extensions, where
/// handlers pick it up through the `Identity` extractor.
///
/// Under the hard policy an anonymous request is answered by the response router as
/// `AuthRequired`: a 303 to the login page for full navigations, a client redirect
/// for partial updates.
pub async fn access_gate(
    State(gate): State<AccessGate>,
    mode: RenderMode,
    mut request: Request,
    next: Next,
) -> Response {
    let identity = gate.resolver.resolve(request.headers()).await;

    if gate.policy == GatePolicy::Hard && !identity.is_authenticated() {
        tracing::debug!(uri = %request.uri(), "hard gate rejected anonymous request");
        return mode
            .reply(Outcome::AuthRequired {
                reason: gate.reason,
                prompt: None,
            })
            .into_response();
    }

    request.extensions_mut().insert(identity);
    next.run(request).await
}
