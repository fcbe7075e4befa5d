use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct User {
    pub id: String,
    pub username: String,
    /// Argon2 PHC string.
    pub password: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub image: String,
    pub description: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Comment {
    pub id: String,
    pub body: String,
    pub author: String,
    pub post_id: String,
    pub created_at: DateTime<Utc>,
}

/// Validated `post` payload.
#[derive(Deserialize, Clone, Debug)]
pub struct PostInput {
    pub title: String,
    pub image: String,
    pub description: String,
}

/// Validated `comment` payload.
#[derive(Deserialize, Clone, Debug)]
pub struct CommentInput {
    pub body: String,
}

/// A post with its author and comment authors resolved.
pub struct PostDetail {
    pub post: Post,
    pub author: Option<User>,
    pub comments: Vec<CommentDetail>,
}

pub struct CommentDetail {
    pub comment: Comment,
    pub author: Option<User>,
}

/// A feed entry: the post and its comment ids.
#[derive(Serialize)]
pub struct PostEntry {
    #[serde(flatten)]
    pub post: Post,
    pub comments: Vec<String>,
}

/// One page of the public post feed.
#[derive(Serialize)]
pub struct PostPage {
    pub page: usize,
    pub size: usize,
    pub total: usize,
    pub data: Vec<PostEntry>,
}
