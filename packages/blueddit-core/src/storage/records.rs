//! Record types persisted in the embedded database.
//!
//! Every record serializes in camelCase so the presentation layer sees the
//! same JSON shape it always has (`imageUrl`, `createdAt`, `comments`).

use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// A category tag attached to posts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    /// Small positive integer, unique
    pub id: i64,
    /// Short label, e.g. `Topic-1`
    pub name: String,
    /// What the topic is about
    pub description: String,
}

impl Topic {
    /// Build a topic
    pub fn new(id: i64, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: description.into(),
        }
    }
}

/// A forum post
///
/// `topic` is a snapshot taken when the post was written, not a live
/// reference into the topics store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Time-derived unique id
    pub id: String,
    /// Title
    pub title: String,
    /// Body text
    pub content: String,
    /// Image URL or data URI
    pub image_url: String,
    /// Username of the author (not enforced against the users store)
    pub author: String,
    /// RFC 3339 creation time
    pub created_at: String,
    /// Number of likes
    pub upvotes: i64,
    /// Number of comments
    #[serde(rename = "comments")]
    pub comment_count: i64,
    /// Whether the viewer has liked this post
    pub liked: bool,
    /// Embedded topic snapshot
    pub topic: Topic,
}

impl Post {
    pub(crate) const COLUMNS: &'static str = "id, title, content, image_url, author, created_at, \
         upvotes, comment_count, liked, topic_id, topic_name, topic_description";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            content: row.get(2)?,
            image_url: row.get(3)?,
            author: row.get(4)?,
            created_at: row.get(5)?,
            upvotes: row.get(6)?,
            comment_count: row.get(7)?,
            liked: row.get(8)?,
            topic: Topic {
                id: row.get(9)?,
                name: row.get(10)?,
                description: row.get(11)?,
            },
        })
    }
}

/// A comment on a post; immutable once written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Time-derived unique id
    pub id: String,
    /// The post this belongs to (not enforced)
    pub post_id: String,
    /// Username of the commenter
    pub author: String,
    /// Body text
    pub content: String,
    /// RFC 3339 creation time
    pub created_at: String,
}

impl Comment {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            post_id: row.get(1)?,
            author: row.get(2)?,
            content: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

/// One user's upvote on one post, keyed by `(user_id, post_id)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    /// Username of the liker
    pub user_id: String,
    /// Liked post
    pub post_id: String,
    /// RFC 3339 time of the like
    pub timestamp: String,
}

impl Like {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            post_id: row.get(1)?,
            timestamp: row.get(2)?,
        })
    }
}

/// A stored account, including the password hash
///
/// Never hand this to the presentation layer; see
/// [`PublicUser`](crate::identity::PublicUser).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Unique primary key
    pub username: String,
    /// Unique
    pub email: String,
    /// Argon2 PHC string
    pub password_hash: String,
    /// RFC 3339 creation time
    pub created_at: String,
}

impl User {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            username: row.get(0)?,
            email: row.get(1)?,
            password_hash: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}
