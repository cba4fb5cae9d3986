//! # Storage Module
//!
//! Persistent local storage for Blueddit data.
//!
//! ## Storage Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE SYSTEM                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │  StorageEngine (engine.rs)                                      │    │
//! │  │  ─────────────────────────                                      │    │
//! │  │  • One shared connection, opened lazily and single-flight       │    │
//! │  │  • Reads never fail: errors are logged, defaults returned       │    │
//! │  │  • Writes fail with "Failed to <operation>"                     │    │
//! │  │  • Lifecycle hooks: blocking / terminated / blocked             │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │                                   │                                     │
//! │                                   ▼                                     │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │  SQLite Database (database.rs + schema.rs)                      │    │
//! │  │  ─────────────────────────────────────────                      │    │
//! │  │  Tables:                                                        │    │
//! │  │  • users    - accounts, unique email                            │    │
//! │  │  • posts    - posts with embedded topic snapshot                │    │
//! │  │  • comments - comments, indexed by post and author              │    │
//! │  │  • likes    - one row per (user, post)                          │    │
//! │  │  • topics   - starter topics                                    │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Consumers depend on the [`PostStorage`] and [`UserStorage`] traits rather
//! than on the engine, so tests can substitute their own storage.

mod database;
mod engine;
mod records;
pub mod schema;

use async_trait::async_trait;

pub use database::{Database, DatabaseConfig};
pub use engine::StorageEngine;
pub use records::{Comment, Like, Post, Topic, User};

use crate::error::Result;

/// Post, comment, like and topic storage
#[async_trait]
pub trait PostStorage: Send + Sync {
    /// All posts, newest first; empty on error
    async fn get_all_posts(&self) -> Vec<Post>;

    /// All posts with `liked` derived from `viewer`'s likes; empty on error
    async fn get_all_posts_for_viewer(&self, viewer: &str) -> Vec<Post>;

    /// Stored topics; empty on error
    async fn get_topics(&self) -> Vec<Topic>;

    /// One post by id; `None` on miss or error
    async fn get_post(&self, id: &str) -> Option<Post>;

    /// Insert a new post
    async fn add_post(&self, post: &Post) -> Result<()>;

    /// Insert a post or update its editable fields; counters are left alone
    async fn update_post(&self, post: &Post) -> Result<()>;

    /// Comments on a post, oldest first; empty on error
    async fn get_comments_by_post_id(&self, post_id: &str) -> Vec<Comment>;

    /// Store a comment and bump the post's counter
    async fn add_comment(&self, comment: &Comment) -> Result<()>;

    /// Flip a like; `None` when the post does not exist
    async fn toggle_like(&self, user_id: &str, post_id: &str) -> Result<Option<Post>>;

    /// Whether `user_id` liked `post_id`; false on error
    async fn is_liked(&self, user_id: &str, post_id: &str) -> bool;
}

/// Account storage
///
/// Errors are returned as-is; the identity service decides how each one
/// surfaces.
#[async_trait]
pub trait UserStorage: Send + Sync {
    /// Look up a user by username
    async fn get_user(&self, username: &str) -> Result<Option<User>>;

    /// Insert a new user
    async fn add_user(&self, user: &User) -> Result<()>;

    /// Replace the user with the same username
    async fn put_user(&self, user: &User) -> Result<()>;

    /// Atomically replace `old_username` with `user`
    async fn rename_user(&self, old_username: &str, user: &User) -> Result<()>;
}
