use crate::{
    AppState,
    config::Env,
    error::StoreError,
    identity::{Identity, SESSION_COOKIE},
    models::{
        self, AuthenticateQuery, CommentForm, CreatePostForm, DescriptionForm, NewComment,
        PostQuery, ReasonQuery, SendLinkForm, Settings, SettingsForm,
    },
    response::{LoginReason, Outcome, RenderMode, Reply},
    views::{Notice, View},
};
use axum::{
    Form,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;

// --- Helpers ---

fn post_location(slug: &str) -> String {
    format!("/posts/{slug}")
}

fn login_prompt(message: &str) -> Option<Notice> {
    Some(Notice::LoginRequired {
        message: message.to_string(),
        reason: Some(LoginReason::Interact.code().to_string()),
    })
}

/// Loads the thread and wraps it in a `View::Thread`, or gives up with the store error.
async fn thread_view(
    state: &AppState,
    identity: &Identity,
    slug: &str,
    draft: String,
    notice: Option<Notice>,
) -> Result<View, Outcome> {
    let thread = state
        .store
        .get_post_with_comments(slug, &identity.user_id)
        .await?;
    Ok(View::Thread {
        identity: identity.clone(),
        thread,
        draft,
        notice,
    })
}

/// Loads a post on its own, for the mood and description widgets.
async fn post_widget_source(
    state: &AppState,
    identity: &Identity,
    slug: &str,
) -> Result<models::Post, Outcome> {
    Ok(state
        .store
        .get_post_with_comments(slug, &identity.user_id)
        .await?
        .post)
}

/// Answer to an anonymous interaction: the thread again, with a login prompt where
/// the result would have been.
async fn thread_login_prompt(
    state: &AppState,
    identity: &Identity,
    slug: &str,
    draft: String,
    message: &str,
) -> Outcome {
    settle(
        thread_view(state, identity, slug, draft, login_prompt(message))
            .await
            .map(|view| Outcome::AuthRequired {
                reason: Some(LoginReason::Interact),
                prompt: Some(view),
            }),
    )
}

/// Collapses the two halves of a handler's flow into one outcome.
fn settle(result: Result<Outcome, Outcome>) -> Outcome {
    result.unwrap_or_else(|outcome| outcome)
}

// --- Board Handlers (soft gate) ---

/// home
///
/// Front page. Anonymous visitors get the list and a login link instead of the form.
pub async fn home(identity: Identity, mode: RenderMode, State(state): State<AppState>) -> Reply {
    let outcome = match state.store.list_posts().await {
        Ok(posts) => Outcome::Render(View::Home {
            identity,
            posts,
            draft_slug: String::new(),
            notice: None,
        }),
        Err(e) => e.into(),
    };
    mode.reply(outcome)
}

/// find_post
///
/// `GET /posts?post-id=slug`: sends the visitor to the named post when it exists.
pub async fn find_post(
    mode: RenderMode,
    State(state): State<AppState>,
    Query(query): Query<PostQuery>,
) -> Reply {
    let slug = query.post_id.trim();
    let outcome = match state.store.post_exists(slug).await {
        Ok(true) => Outcome::Moved(post_location(slug)),
        Ok(false) => Outcome::Moved("/error".to_string()),
        Err(e) => e.into(),
    };
    mode.reply(outcome)
}

/// show_post
///
/// The post and its thread. Unknown slugs get the not-found view.
pub async fn show_post(
    identity: Identity,
    mode: RenderMode,
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Reply {
    let outcome = settle(
        thread_view(&state, &identity, &slug, String::new(), None)
            .await
            .map(Outcome::Render),
    );
    mode.reply(outcome)
}

/// redirect_to_post
///
/// `GET /posts/{slug}/new` lands on the post itself. Segments that are not valid
/// slugs never make it into a `Location` header.
pub async fn redirect_to_post(mode: RenderMode, Path(slug): Path<String>) -> Response {
    if models::validate_slug(&slug).is_err() {
        return mode
            .reply(StoreError::not_found(format!("post '{slug}'")).into())
            .into_response();
    }
    Redirect::to(&post_location(&slug)).into_response()
}

/// add_comment
///
/// Anonymous requests never reach the store: they get the thread back with a login
/// prompt. Invalid content is echoed back in the form with the error above it.
pub async fn add_comment(
    identity: Identity,
    mode: RenderMode,
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Form(form): Form<CommentForm>,
) -> Reply {
    if !identity.is_authenticated() {
        tracing::debug!(slug = %slug, "anonymous comment refused");
        let prompt = thread_login_prompt(
            &state,
            &identity,
            &slug,
            form.message,
            "You need to log in before you can comment.",
        )
        .await;
        return mode.reply(prompt);
    }

    let comment = NewComment {
        post_id: slug.clone(),
        author_id: identity.user_id.clone(),
        content: form.message.clone(),
    };

    let outcome = match state.store.insert_comment(comment).await {
        Ok(comment_id) => {
            tracing::info!(slug = %slug, comment_id = %comment_id, "comment added");
            settle(
                thread_view(
                    &state,
                    &identity,
                    &slug,
                    String::new(),
                    Some(Notice::Success("Comment posted.".to_string())),
                )
                .await
                .map(|view| Outcome::Updated {
                    view,
                    location: post_location(&slug),
                }),
            )
        }
        Err(StoreError::Validation(message)) => settle(
            thread_view(
                &state,
                &identity,
                &slug,
                form.message,
                Some(Notice::Error(message)),
            )
            .await
            .map(Outcome::Rejected),
        ),
        Err(e) => e.into(),
    };
    mode.reply(outcome)
}

/// upvote_comment
///
/// One more vote per call; the refreshed thread goes back to the client.
pub async fn upvote_comment(
    identity: Identity,
    mode: RenderMode,
    State(state): State<AppState>,
    Path((slug, comment_id)): Path<(String, String)>,
) -> Reply {
    if !identity.is_authenticated() {
        let prompt = thread_login_prompt(
            &state,
            &identity,
            &slug,
            String::new(),
            "You need to log in before you can vote.",
        )
        .await;
        return mode.reply(prompt);
    }

    let outcome = match state.store.upvote(&slug, &comment_id, &identity.user_id).await {
        Ok(count) => {
            tracing::debug!(slug = %slug, comment_id = %comment_id, count, "comment upvoted");
            settle(
                thread_view(&state, &identity, &slug, String::new(), None)
                    .await
                    .map(|view| Outcome::Updated {
                        view,
                        location: post_location(&slug),
                    }),
            )
        }
        Err(e) => e.into(),
    };
    mode.reply(outcome)
}

/// delete_comment
///
/// Author-only. Someone else's comment yields the generic forbidden view.
pub async fn delete_comment(
    identity: Identity,
    mode: RenderMode,
    State(state): State<AppState>,
    Path((slug, comment_id)): Path<(String, String)>,
) -> Reply {
    if !identity.is_authenticated() {
        let prompt = thread_login_prompt(
            &state,
            &identity,
            &slug,
            String::new(),
            "You need to log in before you can delete comments.",
        )
        .await;
        return mode.reply(prompt);
    }

    let outcome = match state
        .store
        .delete_comment(&slug, &comment_id, &identity.user_id)
        .await
    {
        Ok(()) => {
            tracing::info!(slug = %slug, comment_id = %comment_id, "comment deleted");
            settle(
                thread_view(
                    &state,
                    &identity,
                    &slug,
                    String::new(),
                    Some(Notice::Success("Comment deleted.".to_string())),
                )
                .await
                .map(|view| Outcome::Updated {
                    view,
                    location: post_location(&slug),
                }),
            )
        }
        Err(e) => e.into(),
    };
    mode.reply(outcome)
}

/// edit_mood
///
/// Whether non-owners may edit is decided by the store's edit policy.
pub async fn edit_mood(
    identity: Identity,
    mode: RenderMode,
    State(state): State<AppState>,
    Path((slug, mood)): Path<(String, String)>,
) -> Reply {
    if !identity.is_authenticated() {
        let prompt = post_widget_source(&state, &identity, &slug).await;
        return mode.reply(match prompt {
            Ok(post) => Outcome::AuthRequired {
                reason: Some(LoginReason::Interact),
                prompt: Some(View::Mood {
                    identity,
                    post,
                    notice: login_prompt("You need to log in to change the mood."),
                }),
            },
            Err(outcome) => outcome,
        });
    }

    let outcome = match state.store.edit_mood(&slug, &mood, &identity.user_id).await {
        Ok(post) => Outcome::Updated {
            view: View::Mood {
                identity,
                post,
                notice: None,
            },
            location: post_location(&slug),
        },
        Err(StoreError::Validation(message)) => {
            settle(post_widget_source(&state, &identity, &slug).await.map(|post| {
                Outcome::Rejected(View::Mood {
                    identity: identity.clone(),
                    post,
                    notice: Some(Notice::Error(message)),
                })
            }))
        }
        Err(e) => e.into(),
    };
    mode.reply(outcome)
}

/// edit_description
///
/// Same policy as `edit_mood`. Over-long text is echoed back in the editor.
pub async fn edit_description(
    identity: Identity,
    mode: RenderMode,
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Form(form): Form<DescriptionForm>,
) -> Reply {
    if !identity.is_authenticated() {
        let prompt = post_widget_source(&state, &identity, &slug).await;
        return mode.reply(match prompt {
            Ok(post) => Outcome::AuthRequired {
                reason: Some(LoginReason::Interact),
                prompt: Some(View::Description {
                    identity,
                    post,
                    draft: Some(form.description),
                    notice: login_prompt("You need to log in to edit the description."),
                }),
            },
            Err(outcome) => outcome,
        });
    }

    let outcome = match state
        .store
        .edit_description(&slug, &form.description, &identity.user_id)
        .await
    {
        Ok(post) => Outcome::Updated {
            view: View::Description {
                identity,
                post,
                draft: None,
                notice: Some(Notice::Success("Description saved.".to_string())),
            },
            location: post_location(&slug),
        },
        Err(StoreError::Validation(message)) => {
            settle(post_widget_source(&state, &identity, &slug).await.map(|post| {
                Outcome::Rejected(View::Description {
                    identity: identity.clone(),
                    post,
                    draft: Some(form.description),
                    notice: Some(Notice::Error(message)),
                })
            }))
        }
        Err(e) => e.into(),
    };
    mode.reply(outcome)
}

// --- Authenticated Handlers (hard gate) ---

/// create_post
///
/// Creates the post and lands on its own URL, so refreshing never resubmits the
/// form. A bad or taken slug comes back inline on the front page.
pub async fn create_post(
    identity: Identity,
    mode: RenderMode,
    State(state): State<AppState>,
    Form(form): Form<CreatePostForm>,
) -> Reply {
    let slug = form.post_id.trim().to_string();

    let outcome = match state.store.create_post(&slug, &identity.user_id).await {
        Ok(post) => Outcome::Moved(post_location(&post.id)),
        Err(StoreError::Validation(message) | StoreError::Conflict(message)) => {
            match state.store.list_posts().await {
                Ok(posts) => Outcome::Rejected(View::Home {
                    identity,
                    posts,
                    draft_slug: slug,
                    notice: Some(Notice::Error(message)),
                }),
                Err(e) => e.into(),
            }
        }
        Err(e) => e.into(),
    };
    mode.reply(outcome)
}

/// settings
///
/// `?r=firstlogin` greets users arriving straight from their first magic link.
pub async fn settings(
    identity: Identity,
    mode: RenderMode,
    State(state): State<AppState>,
    Query(query): Query<ReasonQuery>,
) -> Reply {
    let notice = match query.r.as_deref() {
        Some("firstlogin") => Some(Notice::Info(
            "Welcome! Pick the name other ranters will see.".to_string(),
        )),
        _ => None,
    };

    let outcome = match state.store.get_settings(&identity.user_id).await {
        Ok(settings) => Outcome::Render(View::Settings { settings, notice }),
        Err(e) => e.into(),
    };
    mode.reply(outcome)
}

pub async fn edit_settings(
    identity: Identity,
    mode: RenderMode,
    State(state): State<AppState>,
    Form(form): Form<SettingsForm>,
) -> Reply {
    let submitted = Settings {
        user_id: identity.user_id.clone(),
        preferred_name: form.preferred_name.clone(),
        contact_me: form.contact_me.clone(),
    };

    let outcome = match state.store.save_settings(&identity.user_id, form).await {
        Ok(settings) => Outcome::Updated {
            view: View::Settings {
                settings,
                notice: Some(Notice::Success("Settings saved.".to_string())),
            },
            location: "/settings".to_string(),
        },
        Err(StoreError::Validation(message)) => Outcome::Rejected(View::Settings {
            settings: submitted,
            notice: Some(Notice::Error(message)),
        }),
        Err(e) => e.into(),
    };
    mode.reply(outcome)
}

// --- Login Flow (public) ---

/// login
///
/// Login form. The reason code explains why the visitor was sent here.
pub async fn login(mode: RenderMode, Query(query): Query<ReasonQuery>) -> Reply {
    let notice = match query.r.as_deref() {
        Some("new") => Some(Notice::Error(
            "You need to login before you can create a new post".to_string(),
        )),
        Some("comment") => Some(Notice::Info(
            "Log in to join the conversation.".to_string(),
        )),
        _ => None,
    };
    mode.reply(Outcome::Render(View::Login {
        email: String::new(),
        notice,
    }))
}

/// send_link
///
/// Asks the identity provider to email a magic link.
pub async fn send_link(
    mode: RenderMode,
    State(state): State<AppState>,
    Form(form): Form<SendLinkForm>,
) -> Reply {
    let email = form.email.trim().to_string();

    if let Err(e) = models::validate_email(&email) {
        return mode.reply(Outcome::Rejected(View::Login {
            email,
            notice: Some(Notice::Error(e.to_string())),
        }));
    }

    let outcome = match state.identity.send_magic_link(&email).await {
        Ok(()) => Outcome::Render(View::LinkSent { email }),
        Err(e) => {
            tracing::error!("send_magic_link error: {}", e);
            Outcome::Rejected(View::Login {
                email,
                notice: Some(Notice::Error(
                    "We couldn't send a login link right now. Please try again.".to_string(),
                )),
            })
        }
    };
    mode.reply(outcome)
}

/// authenticate
///
/// Landing point of the emailed link. Exchanges the token for a session, stores the
/// session token in an HttpOnly cookie and sends first-time users to their settings.
pub async fn authenticate(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<AuthenticateQuery>,
) -> Response {
    let failed = |message: &str| {
        RenderMode::FullPage
            .reply(Outcome::Rejected(View::Login {
                email: String::new(),
                notice: Some(Notice::Error(message.to_string())),
            }))
            .into_response()
    };

    let Some(token) = query.token.filter(|token| !token.is_empty()) else {
        return failed("That login link is missing its token.");
    };

    let session = match state.identity.authenticate_magic_link(&token).await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!("magic link authentication failed: {}", e);
            return failed("That login link is invalid or has expired. Please request a new one.");
        }
    };

    tracing::info!(user_id = %session.user_id, "user logged in");

    let cookie = Cookie::build((SESSION_COOKIE, session.session_token))
        .path("/")
        .http_only(true)
        .secure(state.config.env == Env::Production)
        .same_site(SameSite::Lax);

    let landing = match state.store.get_settings(&session.user_id).await {
        Ok(settings) if settings.preferred_name.is_empty() => "/settings?r=firstlogin",
        Ok(_) => "/",
        Err(e) => {
            tracing::error!("get_settings after login error: {:?}", e);
            "/"
        }
    };

    (jar.add(cookie), Redirect::to(landing)).into_response()
}

/// logout
///
/// Revokes the session at the provider and drops the cookie. A failed revocation is
/// logged; the cookie goes either way.
pub async fn logout(mode: RenderMode, State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) {
        if let Err(e) = state.identity.revoke_session(&token).await {
            tracing::warn!("session revocation failed: {}", e);
        }
    }

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, mode.reply(Outcome::Render(View::LoggedOut))).into_response()
}

// --- Static Pages ---

pub async fn error_page(mode: RenderMode) -> Reply {
    mode.reply(Outcome::Render(View::error("Oops something went wrong.")))
}

pub async fn about(mode: RenderMode) -> Reply {
    mode.reply(Outcome::Render(View::About))
}

// --- Admin ---

/// admin_reset
///
/// Destructive. Refuses unless the server runs in development mode.
pub async fn admin_reset(mode: RenderMode, State(state): State<AppState>) -> Response {
    if !state.config.dev_mode {
        tracing::warn!("admin reset refused outside development mode");
        return (StatusCode::FORBIDDEN, "Not allowed!").into_response();
    }

    match state.store.reset().await {
        Ok(()) => mode
            .reply(Outcome::Render(View::Reset { at: Utc::now() }))
            .into_response(),
        Err(e) => {
            tracing::error!("reset error: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Reset failed, errored out").into_response()
        }
    }
}
