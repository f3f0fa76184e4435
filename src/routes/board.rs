use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Board Router Module
///
/// Everything anonymous visitors may see, plus the in-thread interactions. These sit
/// behind the soft gate so pages can offer a "log in to comment" affordance; the
/// interaction handlers themselves answer anonymous requests with a login prompt.
pub fn board_routes() -> Router<AppState> {
    Router::new()
        // GET /
        // Front page: every post, newest first.
        .route("/", get(handlers::home))
        // GET /posts?post-id=slug
        // Jump to a post by name.
        .route("/posts", get(handlers::find_post))
        // GET /posts/{slug}
        // The post and its comment thread.
        .route("/posts/{slug}", get(handlers::show_post))
        // GET|POST /posts/{slug}/new
        // GET canonicalizes back to the thread; POST adds a comment.
        .route(
            "/posts/{slug}/new",
            get(handlers::redirect_to_post).post(handlers::add_comment),
        )
        // POST /posts/{slug}/mood/edit/{mood}
        .route(
            "/posts/{slug}/mood/edit/{mood}",
            post(handlers::edit_mood),
        )
        // POST /posts/{slug}/description/edit
        .route(
            "/posts/{slug}/description/edit",
            post(handlers::edit_description),
        )
        // POST /posts/{slug}/comment/{id}/upvote
        .route(
            "/posts/{slug}/comment/{id}/upvote",
            post(handlers::upvote_comment),
        )
        // POST /posts/{slug}/comment/{id}/delete
        // Author-only.
        .route(
            "/posts/{slug}/comment/{id}/delete",
            post(handlers::delete_comment),
        )
}
