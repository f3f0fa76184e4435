use rantboard::{
    AppConfig, AppState, MockIdentityProvider,
    config::Env,
    create_router,
    identity::IdentityState,
    models::{NewComment, SettingsForm},
    store::{ContentStore, SqliteContentStore, StoreState},
};
use reqwest::{StatusCode, redirect::Policy};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;

struct TestApp {
    address: String,
    store: StoreState,
    client: reqwest::Client,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }
}

async fn spawn_app_with(dev_mode: bool, provider: MockIdentityProvider) -> TestApp {
    let config = AppConfig {
        dev_mode,
        ..AppConfig::default()
    };
    spawn_app_with_config(config, provider).await
}

async fn spawn_app_with_config(config: AppConfig, provider: MockIdentityProvider) -> TestApp {
    let store = SqliteContentStore::open("sqlite::memory:", config.edit_policy)
        .await
        .expect("Failed to open in-memory store");
    let store = Arc::new(store) as StoreState;
    let identity = Arc::new(provider) as IdentityState;

    let router = create_router(AppState {
        store: store.clone(),
        identity,
        config,
    });

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    // Redirects are part of what is under test; never follow them.
    let client = reqwest::Client::builder()
        .redirect(Policy::none())
        .build()
        .unwrap();

    TestApp {
        address,
        store,
        client,
    }
}

async fn spawn_app() -> TestApp {
    spawn_app_with(true, MockIdentityProvider::new()).await
}

fn location(response: &reqwest::Response) -> &str {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

async fn seed_post(app: &TestApp, slug: &str, owner: &str) {
    app.store.create_post(slug, owner).await.unwrap();
}

async fn seed_comment(app: &TestApp, slug: &str, author: &str, text: &str) -> String {
    app.store
        .insert_comment(NewComment {
            post_id: slug.to_string(),
            author_id: author.to_string(),
            content: text.to_string(),
        })
        .await
        .unwrap()
}

// --- Public pages ---

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let response = app.client.get(app.url("/health")).send().await.unwrap();
    assert!(response.status().is_success());
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_home_for_anonymous_offers_login() {
    let app = spawn_app().await;
    seed_post(&app, "monday", "alice").await;

    let response = app.client.get(app.url("/")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.contains("<nav>"));
    assert!(body.contains("/posts/monday"));
    assert!(body.contains("to start a post."));
    assert!(!body.contains("name=\"post-id\""));
}

#[tokio::test]
async fn test_login_page_explains_reason() {
    let app = spawn_app().await;

    let body = app
        .client
        .get(app.url("/login?r=new"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("You need to login before you can create a new post"));
}

// --- Hard gate ---

#[tokio::test]
async fn test_anonymous_create_post_redirects_to_login() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/posts"))
        .form(&[("post-id", "monday")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login?r=new");
    assert!(!app.store.post_exists("monday").await.unwrap());
}

#[tokio::test]
async fn test_anonymous_create_post_fragment_gets_client_redirect() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/posts"))
        .header("hx-request", "true")
        .form(&[("post-id", "monday")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("hx-redirect").unwrap(),
        "/login?r=new"
    );
}

#[tokio::test]
async fn test_settings_requires_login() {
    let app = spawn_app().await;

    let response = app.client.get(app.url("/settings")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn test_dev_header_ignored_outside_dev_mode() {
    let app = spawn_app_with(false, MockIdentityProvider::new()).await;

    let response = app
        .client
        .post(app.url("/posts"))
        .header("x-user-id", "alice")
        .form(&[("post-id", "monday")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login?r=new");
}

// --- Posts ---

#[tokio::test]
async fn test_create_post_lands_on_thread() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/posts"))
        .header("x-user-id", "alice")
        .form(&[("post-id", "launch-day")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/posts/launch-day");

    let body = app
        .client
        .get(app.url("/posts/launch-day"))
        .header("x-user-id", "alice")
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("<h1>launch-day</h1>"));
    assert!(body.contains("name=\"message\""));
}

#[tokio::test]
async fn test_duplicate_post_fragment_echoes_error_without_shell() {
    let app = spawn_app().await;
    seed_post(&app, "monday", "alice").await;

    let response = app
        .client
        .post(app.url("/posts"))
        .header("x-user-id", "bob")
        .header("hx-request", "true")
        .form(&[("post-id", "monday")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(!body.contains("<nav>"));
    assert!(body.contains("already exists"));
    assert!(body.contains("value=\"monday\""));
}

#[tokio::test]
async fn test_unknown_post_is_404_page() {
    let app = spawn_app().await;

    let response = app.client.get(app.url("/posts/ghost")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response.text().await.unwrap();
    assert!(body.contains("<nav>"));
    assert!(body.contains("Not found"));
}

#[tokio::test]
async fn test_find_post_redirects() {
    let app = spawn_app().await;
    seed_post(&app, "monday", "alice").await;

    let found = app
        .client
        .get(app.url("/posts?post-id=monday"))
        .send()
        .await
        .unwrap();
    assert_eq!(location(&found), "/posts/monday");

    let missing = app
        .client
        .get(app.url("/posts?post-id=ghost"))
        .send()
        .await
        .unwrap();
    assert_eq!(location(&missing), "/error");
}

// --- Comments ---

#[tokio::test]
async fn test_anonymous_comment_gets_login_prompt_and_nothing_saved() {
    let app = spawn_app().await;
    seed_post(&app, "monday", "alice").await;

    let response = app
        .client
        .post(app.url("/posts/monday/new"))
        .header("hx-request", "true")
        .form(&[("message", "let me in")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(!body.contains("<nav>"));
    assert!(body.contains("You need to log in before you can comment."));
    assert!(body.contains("/login?r=comment"));

    let thread = app.store.get_post_with_comments("monday", "").await.unwrap();
    assert!(thread.comments.is_empty());
}

#[tokio::test]
async fn test_anonymous_comment_full_page_redirects_to_login() {
    let app = spawn_app().await;
    seed_post(&app, "monday", "alice").await;

    let response = app
        .client
        .post(app.url("/posts/monday/new"))
        .form(&[("message", "let me in")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login?r=comment");
}

#[tokio::test]
async fn test_comment_full_page_redirects_back_to_thread() {
    let app = spawn_app().await;
    seed_post(&app, "monday", "alice").await;

    let response = app
        .client
        .post(app.url("/posts/monday/new"))
        .header("x-user-id", "bob")
        .form(&[("message", "mondays, am I right")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/posts/monday");

    let thread = app.store.get_post_with_comments("monday", "").await.unwrap();
    assert_eq!(thread.comments.len(), 1);
    assert_eq!(thread.comments[0].author_id, "bob");
}

#[tokio::test]
async fn test_empty_comment_fragment_shows_error_inline() {
    let app = spawn_app().await;
    seed_post(&app, "monday", "alice").await;

    let response = app
        .client
        .post(app.url("/posts/monday/new"))
        .header("x-user-id", "bob")
        .header("hx-request", "true")
        .form(&[("message", "   ")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.starts_with("<section id=\"comments\">"));
    assert!(body.contains("notice error"));
    assert!(!body.contains("<nav>"));
}

#[tokio::test]
async fn test_upvote_fragment_returns_updated_thread() {
    let app = spawn_app().await;
    seed_post(&app, "monday", "alice").await;
    let id = seed_comment(&app, "monday", "bob", "ugh").await;

    let response = app
        .client
        .post(app.url(&format!("/posts/monday/comment/{id}/upvote")))
        .header("x-user-id", "carol")
        .header("hx-request", "true")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.contains("<span class=\"votes\">1</span>"));
}

#[tokio::test]
async fn test_foreign_delete_is_forbidden() {
    let app = spawn_app().await;
    seed_post(&app, "monday", "alice").await;
    let id = seed_comment(&app, "monday", "bob", "mine").await;
    let path = format!("/posts/monday/comment/{id}/delete");

    let full = app
        .client
        .post(app.url(&path))
        .header("x-user-id", "carol")
        .send()
        .await
        .unwrap();
    assert_eq!(full.status(), StatusCode::FORBIDDEN);

    let fragment = app
        .client
        .post(app.url(&path))
        .header("x-user-id", "carol")
        .header("hx-request", "true")
        .send()
        .await
        .unwrap();
    assert_eq!(fragment.status(), StatusCode::OK);
    assert!(fragment.text().await.unwrap().contains("not allowed"));

    let thread = app.store.get_post_with_comments("monday", "").await.unwrap();
    assert_eq!(thread.comments.len(), 1);
}

#[tokio::test]
async fn test_author_delete_removes_comment() {
    let app = spawn_app().await;
    seed_post(&app, "monday", "alice").await;
    let id = seed_comment(&app, "monday", "bob", "mine").await;

    let response = app
        .client
        .post(app.url(&format!("/posts/monday/comment/{id}/delete")))
        .header("x-user-id", "bob")
        .header("hx-request", "true")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.text().await.unwrap().contains("Comment deleted."));

    let thread = app.store.get_post_with_comments("monday", "").await.unwrap();
    assert!(thread.comments.is_empty());
}

#[tokio::test]
async fn test_upvote_through_another_post_is_not_found() {
    let app = spawn_app().await;
    seed_post(&app, "monday", "alice").await;
    seed_post(&app, "tuesday", "alice").await;
    let id = seed_comment(&app, "monday", "bob", "ugh").await;

    let response = app
        .client
        .post(app.url(&format!("/posts/tuesday/comment/{id}/upvote")))
        .header("x-user-id", "carol")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let ghost = app
        .client
        .post(app.url(&format!("/posts/ghost/comment/{id}/upvote")))
        .header("x-user-id", "carol")
        .send()
        .await
        .unwrap();
    assert_eq!(ghost.status(), StatusCode::NOT_FOUND);

    let thread = app.store.get_post_with_comments("monday", "").await.unwrap();
    assert_eq!(thread.comments[0].upvote_count, 0);
}

#[tokio::test]
async fn test_delete_through_another_post_is_not_found() {
    let app = spawn_app().await;
    seed_post(&app, "monday", "alice").await;
    seed_post(&app, "tuesday", "alice").await;
    let id = seed_comment(&app, "monday", "bob", "mine").await;

    let response = app
        .client
        .post(app.url(&format!("/posts/tuesday/comment/{id}/delete")))
        .header("x-user-id", "bob")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let thread = app.store.get_post_with_comments("monday", "").await.unwrap();
    assert_eq!(thread.comments.len(), 1);
}

#[tokio::test]
async fn test_new_comment_link_redirects_to_post() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/posts/monday/new"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/posts/monday");
}

#[tokio::test]
async fn test_new_comment_link_with_bad_segment_is_404() {
    let app = spawn_app().await;

    for path in ["/posts/a%0Ab/new", "/posts/Bad%20Name/new"] {
        let response = app.client.get(app.url(path)).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
        assert!(!response.headers().contains_key("location"));
    }
}

// --- Mood & Description ---

#[tokio::test]
async fn test_edit_mood_fragment() {
    let app = spawn_app().await;
    seed_post(&app, "monday", "alice").await;

    let response = app
        .client
        .post(app.url("/posts/monday/mood/edit/happy"))
        .header("x-user-id", "alice")
        .header("hx-request", "true")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.starts_with("<div id=\"mood\">"));
    assert!(body.contains("<span class=\"mood current\">happy</span>"));
}

#[tokio::test]
async fn test_unknown_mood_is_rejected_inline() {
    let app = spawn_app().await;
    seed_post(&app, "monday", "alice").await;

    let response = app
        .client
        .post(app.url("/posts/monday/mood/edit/furious"))
        .header("x-user-id", "alice")
        .header("hx-request", "true")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    assert!(body.contains("unknown mood: furious"));
    assert!(body.contains("<span class=\"mood current\">neutral</span>"));
}

#[tokio::test]
async fn test_edit_description_redirects_back() {
    let app = spawn_app().await;
    seed_post(&app, "monday", "alice").await;

    let response = app
        .client
        .post(app.url("/posts/monday/description/edit"))
        .header("x-user-id", "alice")
        .form(&[("post-description-input", "Worst day of the week")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/posts/monday");

    let thread = app.store.get_post_with_comments("monday", "").await.unwrap();
    assert_eq!(thread.post.description, "Worst day of the week");
}

// --- Login flow ---

#[tokio::test]
async fn test_authenticate_sets_cookie_and_greets_new_user() {
    let provider = MockIdentityProvider::new()
        .with_magic_link("link-token", "session-abc", "user-bob")
        .with_session("session-abc", "user-bob");
    let app = spawn_app_with(false, provider).await;

    let response = app
        .client
        .get(app.url("/authenticate?token=link-token"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/settings?r=firstlogin");

    let cookie = response
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("session_token=session-abc"));
    assert!(cookie.contains("HttpOnly"));
    assert!(!cookie.contains("Secure"));

    let settings = app
        .client
        .get(app.url("/settings?r=firstlogin"))
        .header("cookie", "session_token=session-abc")
        .send()
        .await
        .unwrap();
    assert_eq!(settings.status(), StatusCode::OK);
    assert!(settings.text().await.unwrap().contains("Welcome!"));
}

#[tokio::test]
async fn test_production_session_cookie_is_secure() {
    let provider = MockIdentityProvider::new().with_magic_link("link-token", "session-abc", "bob");
    let config = AppConfig {
        env: Env::Production,
        ..AppConfig::default()
    };
    let app = spawn_app_with_config(config, provider).await;

    let response = app
        .client
        .get(app.url("/authenticate?token=link-token"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let cookie = response
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert!(cookie.starts_with("session_token=session-abc"));
    assert!(cookie.contains("Secure"));
    assert!(cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn test_authenticate_returning_user_goes_home() {
    let provider =
        MockIdentityProvider::new().with_magic_link("link-token", "session-abc", "bob");
    let app = spawn_app_with(false, provider).await;
    app.store
        .save_settings(
            "bob",
            SettingsForm {
                preferred_name: "Bobby".to_string(),
                contact_me: String::new(),
            },
        )
        .await
        .unwrap();

    let response = app
        .client
        .get(app.url("/authenticate?token=link-token"))
        .send()
        .await
        .unwrap();
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn test_authenticate_bad_token_shows_login_error() {
    let app = spawn_app_with(false, MockIdentityProvider::new()).await;

    let response = app
        .client
        .get(app.url("/authenticate?token=forged"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!response.headers().contains_key("set-cookie"));
    let body = response.text().await.unwrap();
    assert!(body.contains("invalid or has expired"));
}

#[tokio::test]
async fn test_send_link_validates_email() {
    let app = spawn_app().await;

    let rejected = app
        .client
        .post(app.url("/login/sendlink"))
        .header("hx-request", "true")
        .form(&[("email", "not-an-email")])
        .send()
        .await
        .unwrap();
    assert!(
        rejected
            .text()
            .await
            .unwrap()
            .contains("Please enter a valid email address")
    );

    let sent = app
        .client
        .post(app.url("/login/sendlink"))
        .form(&[("email", "bob@example.com")])
        .send()
        .await
        .unwrap();
    assert!(sent.text().await.unwrap().contains("bob@example.com"));
}

#[tokio::test]
async fn test_stalled_provider_call_times_out_with_408() {
    let mut provider = MockIdentityProvider::new();
    provider.delay = Some(Duration::from_secs(5));
    let config = AppConfig {
        request_timeout: Duration::from_millis(200),
        ..AppConfig::default()
    };
    let app = spawn_app_with_config(config, provider).await;

    let response = app
        .client
        .post(app.url("/login/sendlink"))
        .form(&[("email", "bob@example.com")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
}

#[tokio::test]
async fn test_logout_clears_cookie() {
    let provider = MockIdentityProvider::new().with_session("session-abc", "bob");
    let app = spawn_app_with(false, provider).await;

    let response = app
        .client
        .get(app.url("/logout"))
        .header("cookie", "session_token=session-abc")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("session_token="));
    assert!(cookie.contains("Max-Age=0"));
}

// --- Admin ---

#[tokio::test]
async fn test_admin_reset_refused_outside_dev_mode() {
    let app = spawn_app_with(false, MockIdentityProvider::new()).await;
    seed_post(&app, "monday", "alice").await;

    let response = app.client.get(app.url("/admin/reset")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(response.text().await.unwrap(), "Not allowed!");
    assert!(app.store.post_exists("monday").await.unwrap());
}

#[tokio::test]
async fn test_admin_reset_in_dev_mode() {
    let app = spawn_app().await;
    seed_post(&app, "monday", "alice").await;

    let response = app.client.get(app.url("/admin/reset")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!app.store.post_exists("monday").await.unwrap());
}
