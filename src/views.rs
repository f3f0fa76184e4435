//! HTML rendering delegate.
//!
//! Every `View` can be rendered two ways: wrapped in the page shell (navigation,
//! head, footer) for full navigations, or as the bare fragment an in-page update
//! swaps in. Markup is built with `maud`, which escapes every spliced value.

use chrono::{DateTime, Utc};
use maud::{DOCTYPE, Markup, html};

use crate::{
    identity::Identity,
    models::{Comment, Mood, Post, PostSummary, PostThread, Settings},
};

/// Inline message shown above the part of the page it concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Error(String),
    Info(String),
    /// Prompt to log in, with a link carrying the reason code.
    LoginRequired { message: String, reason: Option<String> },
}

#[derive(Debug, Clone)]
pub enum View {
    Home {
        identity: Identity,
        posts: Vec<PostSummary>,
        draft_slug: String,
        notice: Option<Notice>,
    },
    Thread {
        identity: Identity,
        thread: PostThread,
        draft: String,
        notice: Option<Notice>,
    },
    Mood {
        identity: Identity,
        post: Post,
        notice: Option<Notice>,
    },
    Description {
        identity: Identity,
        post: Post,
        draft: Option<String>,
        notice: Option<Notice>,
    },
    Settings {
        settings: Settings,
        notice: Option<Notice>,
    },
    Login {
        email: String,
        notice: Option<Notice>,
    },
    LinkSent {
        email: String,
    },
    LoggedOut,
    About,
    Reset {
        at: DateTime<Utc>,
    },
    NotFound {
        what: String,
    },
    Error {
        message: String,
    },
}

impl View {
    pub fn error(message: impl Into<String>) -> Self {
        View::Error {
            message: message.into(),
        }
    }

    fn title(&self) -> String {
        match self {
            View::Home { .. } => "Welcome".to_string(),
            View::Thread { thread, .. } => format!("Posts - {}", thread.post.id),
            View::Mood { post, .. } | View::Description { post, .. } => {
                format!("Posts - {}", post.id)
            }
            View::Settings { .. } => "Settings".to_string(),
            View::Login { .. } | View::LinkSent { .. } => "Log in".to_string(),
            View::LoggedOut => "Logged out".to_string(),
            View::About => "About".to_string(),
            View::Reset { .. } => "Reset".to_string(),
            View::NotFound { .. } => "Not found".to_string(),
            View::Error { .. } => "Error".to_string(),
        }
    }
}

/// Full page: shell with navigation around the view's content.
pub fn page(view: &View) -> String {
    let content = match view {
        View::Thread {
            identity, thread, ..
        } => html! {
            (post_header(&thread.post))
            (description_block(identity, &thread.post, None, None))
            (render_fragment(view))
        },
        View::Home { .. } => html! {
            h1 { "Get ranting" }
            (render_fragment(view))
        },
        View::Mood { post, .. } | View::Description { post, .. } => html! {
            (post_header(post))
            (render_fragment(view))
            p { a href=(post_href(&post.id)) { "Back to the thread" } }
        },
        _ => render_fragment(view),
    };

    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                title { (view.title()) }
                link rel="stylesheet" href="/static/style.css";
                script src="https://unpkg.com/htmx.org@1.9.12" defer {}
            }
            body {
                nav {
                    a href="/" { "Home" } " "
                    a href="/settings" { "Settings" } " "
                    a href="/about" { "About" } " "
                    a href="/login" { "Log in" } " "
                    a href="/logout" { "Log out" }
                }
                main { (content) }
            }
        }
    }
    .into_string()
}

/// Bare fragment for in-page updates. Never contains the navigation shell.
pub fn fragment(view: &View) -> String {
    render_fragment(view).into_string()
}

fn render_fragment(view: &View) -> Markup {
    match view {
        View::Home {
            identity,
            posts,
            draft_slug,
            notice,
        } => home(identity, posts, draft_slug, notice.as_ref()),
        View::Thread {
            identity,
            thread,
            draft,
            notice,
        } => comments_section(identity, thread, draft, notice.as_ref()),
        View::Mood {
            identity,
            post,
            notice,
        } => mood_block(identity, post, notice.as_ref()),
        View::Description {
            identity,
            post,
            draft,
            notice,
        } => description_block(identity, post, draft.as_deref(), notice.as_ref()),
        View::Settings { settings, notice } => settings_form(settings, notice.as_ref()),
        View::Login { email, notice } => html! {
            section #login {
                h1 { "Log in" }
                (notice_html(notice.as_ref()))
                form method="post" action="/login/sendlink" hx-post="/login/sendlink"
                    hx-target="#login" hx-swap="outerHTML" {
                    input type="email" name="email" value=(email) required;
                    button type="submit" { "Email me a link" }
                }
            }
        },
        View::LinkSent { email } => html! {
            section #login {
                p.notice.success {
                    "Check your inbox: we sent a login link to " (email) "."
                }
            }
        },
        View::LoggedOut => html! {
            section {
                h1 { "Logged out" }
                p { "See you soon." }
            }
        },
        View::About => html! {
            section {
                h1 { "About" }
                p { "A small place to start threads, leave comments and tag how you feel." }
            }
        },
        View::Reset { at } => html! {
            section {
                h1 { "Reset" }
                p { "Store wiped at " (at.to_rfc3339()) "." }
            }
        },
        View::NotFound { what } => html! {
            section.error {
                h1 { "Not found" }
                p { "We couldn't find " (what) "." }
            }
        },
        View::Error { message } => html! {
            section.error {
                h1 { "Oops" }
                p { (message) }
            }
        },
    }
}

// --- Building blocks ---

fn post_href(slug: &str) -> String {
    format!("/posts/{slug}")
}

fn home(
    identity: &Identity,
    posts: &[PostSummary],
    draft_slug: &str,
    notice: Option<&Notice>,
) -> Markup {
    html! {
        section #posts {
            (notice_html(notice))
            @if identity.is_authenticated() {
                form method="post" action="/posts" hx-post="/posts" hx-target="#posts"
                    hx-swap="outerHTML" {
                    input name="post-id" value=(draft_slug) placeholder="name-your-post";
                    button type="submit" { "Start a post" }
                }
            } @else {
                p { a href="/login?r=new" { "Log in" } " to start a post." }
            }
            ul.posts {
                @for post in posts {
                    li {
                        a href=(post_href(&post.id)) { (post.id) }
                        " "
                        span.mood { (post.mood.as_str()) }
                        " "
                        span.count { (post.comment_count) " comments" }
                    }
                }
            }
        }
    }
}

fn post_header(post: &Post) -> Markup {
    html! {
        header {
            h1 { (post.id) }
            p.meta { "started " (post.created_at.format("%Y-%m-%d %H:%M").to_string()) }
        }
    }
}

fn mood_block(identity: &Identity, post: &Post, notice: Option<&Notice>) -> Markup {
    html! {
        div #mood {
            (notice_html(notice))
            span.mood.current { (post.mood.as_str()) }
            @if identity.is_authenticated() {
                @for mood in Mood::ALL.iter().filter(|m| **m != post.mood) {
                    @let action = format!("/posts/{}/mood/edit/{}", post.id, mood.as_str());
                    form method="post" action=(action) hx-post=(action) hx-target="#mood"
                        hx-swap="outerHTML" {
                        button type="submit" { (mood.as_str()) }
                    }
                }
            }
        }
    }
}

fn description_block(
    identity: &Identity,
    post: &Post,
    draft: Option<&str>,
    notice: Option<&Notice>,
) -> Markup {
    let action = format!("/posts/{}/description/edit", post.id);
    html! {
        div #description {
            (notice_html(notice))
            p.description { (post.description) }
            @if identity.is_authenticated() {
                form method="post" action=(action) hx-post=(action) hx-target="#description"
                    hx-swap="outerHTML" {
                    textarea name="post-description-input" {
                        (draft.unwrap_or(&post.description))
                    }
                    button type="submit" { "Save" }
                }
            }
        }
    }
}

fn comments_section(
    identity: &Identity,
    thread: &PostThread,
    draft: &str,
    notice: Option<&Notice>,
) -> Markup {
    let slug = &thread.post.id;
    let action = format!("/posts/{slug}/new");
    html! {
        section #comments {
            (mood_block(identity, &thread.post, None))
            (notice_html(notice))
            ol.comments {
                @for comment in &thread.comments {
                    (comment_item(slug, comment, identity))
                }
            }
            @if identity.is_authenticated() {
                form method="post" action=(action) hx-post=(action) hx-target="#comments"
                    hx-swap="outerHTML" {
                    textarea name="message" { (draft) }
                    button type="submit" { "Comment" }
                }
            } @else {
                p { a href="/login?r=comment" { "Log in" } " to comment." }
            }
        }
    }
}

fn comment_item(slug: &str, comment: &Comment, identity: &Identity) -> Markup {
    let author = comment.author_name.as_deref().unwrap_or("anonymous ranter");
    let base = format!("/posts/{slug}/comment/{}", comment.id);
    let upvote = format!("{base}/upvote");
    let delete = format!("{base}/delete");
    html! {
        li id=(format!("comment-{}", comment.id)) {
            p.author { (author) }
            p { (comment.content) }
            span.votes { (comment.upvote_count) }
            @if identity.is_authenticated() {
                form method="post" action=(upvote) hx-post=(upvote) hx-target="#comments"
                    hx-swap="outerHTML" {
                    button type="submit" { "+1" }
                }
            }
            @if comment.viewer_is_author {
                form method="post" action=(delete) hx-post=(delete) hx-target="#comments"
                    hx-swap="outerHTML" {
                    button type="submit" { "Delete" }
                }
            }
        }
    }
}

fn settings_form(settings: &Settings, notice: Option<&Notice>) -> Markup {
    html! {
        section #settings {
            h1 { "Settings" }
            (notice_html(notice))
            form method="post" action="/settings/edit" hx-post="/settings/edit"
                hx-target="#settings" hx-swap="outerHTML" {
                label {
                    "Preferred name "
                    input name="preferred-name" value=(settings.preferred_name);
                }
                label {
                    "Contact me "
                    input name="contact-me" value=(settings.contact_me);
                }
                button type="submit" { "Save" }
            }
        }
    }
}

fn notice_html(notice: Option<&Notice>) -> Markup {
    html! {
        @match notice {
            None => {}
            Some(Notice::Success(msg)) => p.notice.success { (msg) },
            Some(Notice::Error(msg)) => p.notice.error { (msg) },
            Some(Notice::Info(msg)) => p.notice.info { (msg) },
            Some(Notice::LoginRequired { message, reason }) => {
                @let href = match reason {
                    Some(reason) => format!("/login?r={reason}"),
                    None => "/login".to_string(),
                };
                p.notice.login { (message) " " a href=(href) { "Log in" } }
            },
        }
    }
}
