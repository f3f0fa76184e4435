use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::FromRow;
use thiserror::Error;

use crate::error::{StoreError, StoreResult};

// --- Field Limits ---

pub const MAX_SLUG_LEN: usize = 64;
pub const MAX_COMMENT_LEN: usize = 2000;
pub const MAX_DESCRIPTION_LEN: usize = 500;
pub const MAX_PREFERRED_NAME_LEN: usize = 32;
pub const MAX_CONTACT_LEN: usize = 128;

// --- Enumerations ---

/// Mood
///
/// The tag a post owner (or collaborator) attaches to a thread. Stored as its
/// lowercase name in the `posts.mood` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mood {
    #[default]
    Neutral,
    Happy,
    Sad,
    Angry,
    Excited,
}

impl Mood {
    pub const ALL: [Mood; 5] = [Mood::Neutral, Mood::Happy, Mood::Sad, Mood::Angry, Mood::Excited];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Neutral => "neutral",
            Mood::Happy => "happy",
            Mood::Sad => "sad",
            Mood::Angry => "angry",
            Mood::Excited => "excited",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown mood: {0}")]
pub struct UnknownMood(pub String);

impl FromStr for Mood {
    type Err = UnknownMood;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mood::ALL
            .into_iter()
            .find(|mood| mood.as_str() == s)
            .ok_or_else(|| UnknownMood(s.to_string()))
    }
}

// Lets `FromRow` decode the TEXT column straight into the enum.
impl TryFrom<String> for Mood {
    type Error = UnknownMood;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// EditPolicy
///
/// Decides who may change a post's mood and description. `Collaborative` lets any
/// authenticated user edit; `OwnerOnly` restricts edits to the post's creator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditPolicy {
    #[default]
    Collaborative,
    OwnerOnly,
}

impl FromStr for EditPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "collaborative" => Ok(EditPolicy::Collaborative),
            "owner" | "owner-only" | "owner_only" => Ok(EditPolicy::OwnerOnly),
            other => Err(format!("unknown edit policy: {other}")),
        }
    }
}

// --- Stored Records ---

/// Post
///
/// A thread, keyed by the slug its owner chose. The slug is also the URL segment.
#[derive(Debug, Clone, FromRow, PartialEq)]
pub struct Post {
    pub id: String,
    pub owner_id: String,
    pub description: String,
    #[sqlx(try_from = "String")]
    pub mood: Mood,
    pub created_at: DateTime<Utc>,
}

/// PostSummary
///
/// Row shape of the front page listing.
#[derive(Debug, Clone, FromRow)]
pub struct PostSummary {
    pub id: String,
    pub owner_id: String,
    pub description: String,
    #[sqlx(try_from = "String")]
    pub mood: Mood,
    pub created_at: DateTime<Utc>,
    pub comment_count: i64,
}

/// Comment
///
/// A comment as shown in a thread, joined with the author's preferred name and
/// flagged when the viewer wrote it.
#[derive(Debug, Clone, FromRow)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub upvote_count: i64,
    // Loaded via LEFT JOIN on settings; None when the author never set a name.
    pub author_name: Option<String>,
    // Set by the store after the fetch, from the viewer id.
    #[sqlx(skip)]
    pub viewer_is_author: bool,
}

/// PostThread
///
/// A post together with its comments in creation order.
#[derive(Debug, Clone)]
pub struct PostThread {
    pub post: Post,
    pub comments: Vec<Comment>,
}

/// NewComment
///
/// Input of `ContentStore::insert_comment`.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: String,
    pub author_id: String,
    pub content: String,
}

/// Settings
///
/// Per-user preferences, one row per user. Users without a row get the default.
#[derive(Debug, Clone, FromRow, Default, PartialEq)]
pub struct Settings {
    pub user_id: String,
    pub preferred_name: String,
    pub contact_me: String,
}

// --- Form Payloads ---

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CreatePostForm {
    #[serde(rename = "post-id", default)]
    pub post_id: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PostQuery {
    #[serde(rename = "post-id", default)]
    pub post_id: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CommentForm {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DescriptionForm {
    #[serde(rename = "post-description-input", default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SettingsForm {
    #[serde(rename = "preferred-name", default)]
    pub preferred_name: String,
    #[serde(rename = "contact-me", default)]
    pub contact_me: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SendLinkForm {
    #[serde(default)]
    pub email: String,
}

/// Query string carrying a reason code (`?r=new`, `?r=firstlogin`).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReasonQuery {
    pub r: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthenticateQuery {
    pub token: Option<String>,
}

// --- Validation ---

/// Slugs are primary keys and URL segments: 1..=64 chars of `[a-z0-9_-]`,
/// starting with a letter or digit.
pub fn validate_slug(slug: &str) -> StoreResult<()> {
    if slug.is_empty() {
        return Err(StoreError::validation("Post name can't be empty"));
    }
    if slug.len() > MAX_SLUG_LEN {
        return Err(StoreError::validation(format!(
            "Post name can be at most {MAX_SLUG_LEN} characters"
        )));
    }
    let valid_char = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_';
    if !slug.chars().all(valid_char) {
        return Err(StoreError::validation(
            "Post name may only contain lowercase letters, digits, '-' and '_'",
        ));
    }
    if !slug.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(StoreError::validation("Post name must start with a letter or digit"));
    }
    Ok(())
}

pub fn validate_comment(content: &str) -> StoreResult<()> {
    if content.trim().is_empty() {
        return Err(StoreError::validation("Comment can't be empty"));
    }
    if content.chars().count() > MAX_COMMENT_LEN {
        return Err(StoreError::validation(format!(
            "Comment can be at most {MAX_COMMENT_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_description(description: &str) -> StoreResult<()> {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(StoreError::validation(format!(
            "Description can be at most {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_settings(form: &SettingsForm) -> StoreResult<()> {
    if form.preferred_name.chars().count() > MAX_PREFERRED_NAME_LEN {
        return Err(StoreError::validation(format!(
            "Preferred name can be at most {MAX_PREFERRED_NAME_LEN} characters"
        )));
    }
    if form.contact_me.chars().count() > MAX_CONTACT_LEN {
        return Err(StoreError::validation(format!(
            "Contact details can be at most {MAX_CONTACT_LEN} characters"
        )));
    }
    Ok(())
}

/// Loose shape check before handing an address to the identity provider.
pub fn validate_email(email: &str) -> StoreResult<()> {
    let email = email.trim();
    let well_formed = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    };
    if !well_formed || email.contains(char::is_whitespace) {
        return Err(StoreError::validation("Please enter a valid email address"));
    }
    Ok(())
}
