use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, StatusCode, request::Parts},
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use serde_json::json;

use crate::{config::AppConfig, error::ProviderError};

/// Name of the cookie carrying the provider's session token.
pub const SESSION_COOKIE: &str = "session_token";

/// Header accepted as a direct identity when development mode is on.
pub const DEV_USER_HEADER: &str = "x-user-id";

/// How long a session minted from a magic link stays valid at the provider.
const SESSION_DURATION_MINUTES: u32 = 60 * 24 * 7;

/// Identity
///
/// The per-request authentication state. Built fresh by the access gate for every
/// request and carried in the request extensions; never stored on shared state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub authenticated: bool,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            authenticated: true,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated && !self.user_id.is_empty()
    }
}

/// Identity Extractor
///
/// Hands the identity resolved by the access gate to a handler. A handler mounted
/// without a gate has no identity to read; that is a routing bug, answered with a 500.
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Identity>().cloned().ok_or_else(|| {
            tracing::error!(uri = %parts.uri, "handler reached without an access gate");
            StatusCode::INTERNAL_SERVER_ERROR
        })
    }
}

/// ProviderSession
///
/// What the provider hands back after a successful magic-link exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSession {
    pub user_id: String,
    pub session_token: String,
}

/// IdentityProvider
///
/// Contract with the hosted magic-link service. Verification is opaque to us: a token
/// goes in, a user id (or an error) comes out.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Emails a login-or-signup magic link to `email`.
    async fn send_magic_link(&self, email: &str) -> Result<(), ProviderError>;

    /// Exchanges the token from a clicked magic link for a session.
    async fn authenticate_magic_link(&self, token: &str) -> Result<ProviderSession, ProviderError>;

    /// Verifies a session token and returns the user id it belongs to.
    async fn authenticate_session(&self, session_token: &str) -> Result<String, ProviderError>;

    /// Ends a session at the provider.
    async fn revoke_session(&self, session_token: &str) -> Result<(), ProviderError>;
}

/// IdentityState
///
/// The concrete type used to share the provider across the application state.
pub type IdentityState = Arc<dyn IdentityProvider>;

// --- Stytch Implementation ---

#[derive(Deserialize)]
struct MagicLinkAuthResponse {
    user_id: String,
    session_token: String,
}

#[derive(Deserialize)]
struct SessionAuthResponse {
    session: SessionBody,
}

#[derive(Deserialize)]
struct SessionBody {
    user_id: String,
}

#[derive(Deserialize, Default)]
struct ProviderErrorBody {
    #[serde(default)]
    error_message: String,
}

/// StytchClient
///
/// `IdentityProvider` backed by the Stytch consumer API, authenticated with HTTP basic
/// auth (project id / secret).
#[derive(Clone)]
pub struct StytchClient {
    http: reqwest::Client,
    base_url: String,
    project_id: String,
    secret: String,
    // Where the emailed link lands, e.g. https://board.example.com/authenticate
    redirect_url: String,
}

impl StytchClient {
    pub fn new(config: &AppConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.stytch_base_url().to_string(),
            project_id: config.stytch_project_id.clone(),
            secret: config.stytch_secret.clone(),
            redirect_url: format!("{}/authenticate", config.public_url.trim_end_matches('/')),
        })
    }

    async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .basic_auth(&self.project_id, Some(&self.secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| if e.is_timeout() { ProviderError::Timeout } else { e.into() })?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.json::<ProviderErrorBody>().await.unwrap_or_default();
        Err(ProviderError::Rejected {
            status,
            message: body.error_message,
        })
    }
}

#[async_trait]
impl IdentityProvider for StytchClient {
    async fn send_magic_link(&self, email: &str) -> Result<(), ProviderError> {
        self.post(
            "/v1/magic_links/email/login_or_create",
            json!({
                "email": email,
                "login_magic_link_url": self.redirect_url,
                "signup_magic_link_url": self.redirect_url,
            }),
        )
        .await?;
        Ok(())
    }

    async fn authenticate_magic_link(&self, token: &str) -> Result<ProviderSession, ProviderError> {
        let body = self
            .post(
                "/v1/magic_links/authenticate",
                json!({ "token": token, "session_duration_minutes": SESSION_DURATION_MINUTES }),
            )
            .await?
            .json::<MagicLinkAuthResponse>()
            .await?;

        Ok(ProviderSession {
            user_id: body.user_id,
            session_token: body.session_token,
        })
    }

    async fn authenticate_session(&self, session_token: &str) -> Result<String, ProviderError> {
        let body = self
            .post("/v1/sessions/authenticate", json!({ "session_token": session_token }))
            .await?
            .json::<SessionAuthResponse>()
            .await?;

        Ok(body.session.user_id)
    }

    async fn revoke_session(&self, session_token: &str) -> Result<(), ProviderError> {
        self.post("/v1/sessions/revoke", json!({ "session_token": session_token }))
            .await?;
        Ok(())
    }
}

// --- Mock Implementation (for tests) ---

/// MockIdentityProvider
///
/// In-memory provider. `sessions` maps session tokens to user ids, `magic_links` maps
/// magic-link tokens to the session they mint. `delay` simulates a stalled provider.
#[derive(Clone, Default)]
pub struct MockIdentityProvider {
    pub sessions: HashMap<String, String>,
    pub magic_links: HashMap<String, ProviderSession>,
    pub should_fail: bool,
    pub delay: Option<Duration>,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a live session token for `user_id`.
    pub fn with_session(mut self, session_token: &str, user_id: &str) -> Self {
        self.sessions
            .insert(session_token.to_string(), user_id.to_string());
        self
    }

    /// Registers a magic-link token that mints `session_token` for `user_id`.
    pub fn with_magic_link(mut self, token: &str, session_token: &str, user_id: &str) -> Self {
        self.magic_links.insert(
            token.to_string(),
            ProviderSession {
                user_id: user_id.to_string(),
                session_token: session_token.to_string(),
            },
        );
        self
    }

    async fn simulate(&self) -> Result<(), ProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.should_fail {
            return Err(ProviderError::Rejected {
                status: 503,
                message: "Mock provider failure: simulation requested".to_string(),
            });
        }
        Ok(())
    }

    fn unknown(what: &str) -> ProviderError {
        ProviderError::Rejected {
            status: 404,
            message: format!("{what} not found"),
        }
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn send_magic_link(&self, _email: &str) -> Result<(), ProviderError> {
        self.simulate().await
    }

    async fn authenticate_magic_link(&self, token: &str) -> Result<ProviderSession, ProviderError> {
        self.simulate().await?;
        self.magic_links
            .get(token)
            .cloned()
            .ok_or_else(|| Self::unknown("magic link"))
    }

    async fn authenticate_session(&self, session_token: &str) -> Result<String, ProviderError> {
        self.simulate().await?;
        self.sessions
            .get(session_token)
            .cloned()
            .ok_or_else(|| Self::unknown("session"))
    }

    async fn revoke_session(&self, _session_token: &str) -> Result<(), ProviderError> {
        self.simulate().await
    }
}

// --- Resolver ---

/// IdentityResolver
///
/// Turns the request's session evidence into an `Identity`. Never fails: missing,
/// invalid or unverifiable evidence resolves to the anonymous identity and the gate
/// decides what that means.
#[derive(Clone)]
pub struct IdentityResolver {
    provider: IdentityState,
    dev_mode: bool,
    timeout: Duration,
}

impl IdentityResolver {
    pub fn new(provider: IdentityState, config: &AppConfig) -> Self {
        Self {
            provider,
            dev_mode: config.dev_mode,
            // Half the request deadline, so a stalled provider still leaves time to render.
            timeout: config.request_timeout / 2,
        }
    }

    pub async fn resolve(&self, headers: &HeaderMap) -> Identity {
        // Local bypass, guarded by the development flag.
        if self.dev_mode {
            if let Some(user_id) = headers
                .get(DEV_USER_HEADER)
                .and_then(|value| value.to_str().ok())
                .filter(|value| !value.is_empty())
            {
                return Identity::user(user_id);
            }
        }

        let jar = CookieJar::from_headers(headers);
        let Some(session_token) = jar
            .get(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|token| !token.is_empty())
        else {
            return Identity::anonymous();
        };

        let verification = self.provider.authenticate_session(&session_token);
        match tokio::time::timeout(self.timeout, verification).await {
            Ok(Ok(user_id)) if !user_id.is_empty() => Identity::user(user_id),
            Ok(Ok(_)) => Identity::anonymous(),
            Ok(Err(e)) => {
                tracing::warn!("session verification failed: {}", e);
                Identity::anonymous()
            }
            Err(_) => {
                tracing::warn!("session verification failed: {}", ProviderError::Timeout);
                Identity::anonymous()
            }
        }
    }
}
