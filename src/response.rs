//! Response router: turns what a handler did into what the client gets.
//!
//! Handlers only describe the outcome of their operation; the rendering mode of the
//! request (full navigation or in-page partial update) and the outcome together pick
//! the status code, the shell and whether to redirect.

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{HeaderValue, StatusCode, request::Parts},
    response::{Html, IntoResponse, Redirect, Response},
};

use crate::{
    error::StoreError,
    views::{self, View},
};

/// Header set by the in-page partial-update client.
pub const PARTIAL_REQUEST_HEADER: &str = "hx-request";

/// Header telling the partial-update client to perform a full navigation.
pub const CLIENT_REDIRECT_HEADER: &str = "hx-redirect";

/// RenderMode
///
/// Whether the request came from a full navigation or an in-page update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    FullPage,
    Fragment,
}

impl<S> FromRequestParts<S> for RenderMode
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let partial = parts
            .headers
            .get(PARTIAL_REQUEST_HEADER)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| !value.is_empty());

        Ok(if partial {
            RenderMode::Fragment
        } else {
            RenderMode::FullPage
        })
    }
}

impl RenderMode {
    pub fn reply(self, outcome: Outcome) -> Reply {
        Reply {
            mode: self,
            outcome,
        }
    }
}

/// Reason code carried to the login page (`/login?r=..`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginReason {
    NewPost,
    Interact,
}

impl LoginReason {
    pub fn code(&self) -> &'static str {
        match self {
            LoginReason::NewPost => "new",
            LoginReason::Interact => "comment",
        }
    }

    pub fn login_url(reason: Option<LoginReason>) -> String {
        match reason {
            Some(reason) => format!("/login?r={}", reason.code()),
            None => "/login".to_string(),
        }
    }
}

/// What a handler's operation came to.
#[derive(Debug)]
pub enum Outcome {
    /// Render the view where the request was made.
    Render(View),
    /// State changed. Full navigations are sent to `location`, fragments get `view`.
    Updated { view: View, location: String },
    /// Go somewhere else entirely.
    Moved(String),
    /// Validation or conflict, with the submitted state echoed back in the view.
    Rejected(View),
    /// The action needs a logged-in user. `prompt` is the fragment to show instead
    /// of the action's result; without one, the client is sent to the login page.
    AuthRequired {
        reason: Option<LoginReason>,
        prompt: Option<View>,
    },
    /// Not found, forbidden or storage failure.
    Failed(StoreError),
}

impl From<StoreError> for Outcome {
    fn from(err: StoreError) -> Self {
        Outcome::Failed(err)
    }
}

/// Reply
///
/// A handler's return value: the outcome plus the request's rendering mode.
#[derive(Debug)]
pub struct Reply {
    pub mode: RenderMode,
    pub outcome: Outcome,
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        route(self.mode, self.outcome)
    }
}

/// route
///
/// The decision table:
/// - full navigations render whole pages, redirect after state changes, and go to
///   `/error` on storage failures;
/// - partial updates render the narrowest fragment for the outcome and are always 200,
///   since the partial-update client only swaps successful responses.
pub fn route(mode: RenderMode, outcome: Outcome) -> Response {
    match (mode, outcome) {
        (mode, Outcome::Render(view)) | (mode, Outcome::Rejected(view)) => {
            render(mode, &view, StatusCode::OK)
        }

        (RenderMode::FullPage, Outcome::Updated { location, .. }) => {
            Redirect::to(&location).into_response()
        }
        (RenderMode::Fragment, Outcome::Updated { view, .. }) => {
            render(RenderMode::Fragment, &view, StatusCode::OK)
        }

        (mode, Outcome::Moved(location)) => navigate(mode, &location),

        (RenderMode::Fragment, Outcome::AuthRequired { prompt: Some(view), .. }) => {
            render(RenderMode::Fragment, &view, StatusCode::OK)
        }
        (mode, Outcome::AuthRequired { reason, .. }) => {
            navigate(mode, &LoginReason::login_url(reason))
        }

        (mode, Outcome::Failed(err)) => failure(mode, err),
    }
}

fn render(mode: RenderMode, view: &View, status: StatusCode) -> Response {
    let body = match mode {
        RenderMode::FullPage => views::page(view),
        RenderMode::Fragment => views::fragment(view),
    };
    (status, Html(body)).into_response()
}

/// 303 for full navigations; a client-side redirect instruction for partial updates.
fn navigate(mode: RenderMode, location: &str) -> Response {
    match mode {
        RenderMode::FullPage => Redirect::to(location).into_response(),
        RenderMode::Fragment => match HeaderValue::from_str(location) {
            Ok(value) => {
                let mut response = StatusCode::OK.into_response();
                response.headers_mut().insert(CLIENT_REDIRECT_HEADER, value);
                response
            }
            Err(_) => render(mode, &View::error("Oops, something went wrong."), StatusCode::OK),
        },
    }
}

fn failure(mode: RenderMode, err: StoreError) -> Response {
    let fragment_status = |status: StatusCode| match mode {
        RenderMode::FullPage => status,
        RenderMode::Fragment => StatusCode::OK,
    };

    match err {
        StoreError::NotFound(what) => render(
            mode,
            &View::NotFound { what },
            fragment_status(StatusCode::NOT_FOUND),
        ),
        // Same view whether or not the resource exists.
        StoreError::Forbidden => render(
            mode,
            &View::error("You're not allowed to do that."),
            fragment_status(StatusCode::FORBIDDEN),
        ),
        StoreError::Validation(message) | StoreError::Conflict(message) => render(
            mode,
            &View::error(message),
            fragment_status(StatusCode::UNPROCESSABLE_ENTITY),
        ),
        StoreError::Storage(e) => {
            tracing::error!("storage failure reached the response router: {:?}", e);
            match mode {
                RenderMode::FullPage => Redirect::to("/error").into_response(),
                RenderMode::Fragment => render(
                    mode,
                    &View::error("Oops, something went wrong."),
                    StatusCode::OK,
                ),
            }
        }
    }
}
