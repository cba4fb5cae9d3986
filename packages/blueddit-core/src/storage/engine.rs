//! # Storage Engine
//!
//! The application-wide handle to the embedded database.
//!
//! ## Open Lifecycle
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        CONNECTION LIFECYCLE                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   caller A ──┐                                                          │
//! │   caller B ──┼──► memo empty? ──yes──► start open (once) ──► memo       │
//! │   caller C ──┘         │                                   │            │
//! │                        no                                  │            │
//! │                        └──────────► clone shared future ◄──┘            │
//! │                                           │                             │
//! │                                           ▼                             │
//! │                               Ok(db)  ──► run operation                 │
//! │                               Err(e)  ──► clear memo, surface error     │
//! │                                                                         │
//! │   on_blocking    : close handle, clear memo                             │
//! │   on_terminated  : clear memo                                           │
//! │   reset_database : close, delete files, reopen                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The memo holds a shared future rather than a lock held across the open, so
//! concurrent first callers all await the same open.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use super::database::{Database, DatabaseConfig};
use super::records::{Comment, Like, Post, Topic, User};
use super::{PostStorage, UserStorage};
use crate::error::{Error, Result};
use crate::time;

type OpenFuture = Shared<BoxFuture<'static, Result<Arc<Database>>>>;

/// Lazily opened, shared database handle
pub struct StorageEngine {
    config: DatabaseConfig,
    open: Mutex<Option<OpenFuture>>,
    opens: Arc<AtomicUsize>,
}

impl StorageEngine {
    /// Create an engine; nothing is opened until the first operation
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            open: Mutex::new(None),
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Configuration the engine opens with
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// How many times a database open has been started
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// The shared database, opening it on first use
    pub async fn db(&self) -> Result<Arc<Database>> {
        let fut = {
            let mut slot = self.open.lock();
            match slot.as_ref() {
                Some(fut) => fut.clone(),
                None => {
                    let config = self.config.clone();
                    let opens = self.opens.clone();
                    let fut = async move {
                        opens.fetch_add(1, Ordering::SeqCst);
                        Database::open(config).map(Arc::new)
                    }
                    .boxed()
                    .shared();
                    *slot = Some(fut.clone());
                    fut
                }
            }
        };

        match fut.clone().await {
            Ok(db) => Ok(db),
            Err(e) => {
                tracing::error!("Failed to open database: {}", e);
                // Let the next caller retry, unless someone already replaced it.
                let mut slot = self.open.lock();
                if slot.as_ref().is_some_and(|current| current.ptr_eq(&fut)) {
                    *slot = None;
                }
                Err(e)
            }
        }
    }

    fn take_memo(&self) -> Option<OpenFuture> {
        self.open.lock().take()
    }

    // ========================================================================
    // LIFECYCLE HOOKS
    // ========================================================================

    /// Another context wants to upgrade the schema: release our handle
    ///
    /// An open still in flight is closed as soon as it resolves.
    pub fn on_blocking(&self) {
        if let Some(fut) = self.take_memo() {
            match fut.peek().cloned() {
                Some(Ok(db)) => db.close(),
                Some(Err(_)) => {}
                None => match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        handle.spawn(async move {
                            if let Ok(db) = fut.await {
                                db.close();
                            }
                        });
                    }
                    Err(_) => {
                        tracing::warn!("Open in flight outside a runtime, handle stays open");
                    }
                },
            }
        }
        tracing::warn!("Database version change requested elsewhere, closed local handle");
    }

    /// The connection was terminated underneath us
    pub fn on_terminated(&self) {
        self.take_memo();
        tracing::warn!("Database connection terminated, will reopen on next use");
    }

    /// Our upgrade is waiting on another context's open handle
    pub fn on_blocked(&self) {
        tracing::warn!("Database upgrade blocked by another open connection");
    }

    /// Delete the whole persisted database and start over
    pub async fn reset_database(&self) -> Result<()> {
        self.reset_inner().await.map_err(|e| {
            tracing::error!("Failed to reset database: {}", e);
            Error::write_failed("reset database", e)
        })
    }

    async fn reset_inner(&self) -> Result<()> {
        if let Some(fut) = self.take_memo() {
            if let Ok(db) = fut.await {
                db.close();
            }
        }

        if let Some(path) = &self.config.path {
            let mut files = vec![path.clone()];
            for suffix in ["-wal", "-shm"] {
                let mut name = path.clone().into_os_string();
                name.push(suffix);
                files.push(name.into());
            }
            for file in files {
                match std::fs::remove_file(&file) {
                    Ok(()) => tracing::debug!("Removed {}", file.display()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        self.db().await?;
        tracing::info!("Database reset complete");
        Ok(())
    }

    // ========================================================================
    // OPERATION HELPERS
    // ========================================================================

    async fn read<T: Default>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&Database) -> Result<T>,
    ) -> T {
        let result = match self.db().await {
            Ok(db) => f(db.as_ref()),
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            tracing::error!("Failed to {}: {}", operation, e);
            T::default()
        })
    }

    async fn write<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&Database) -> Result<T>,
    ) -> Result<T> {
        let db = self.db().await.map_err(|e| Error::write_failed(operation, e))?;
        f(db.as_ref()).map_err(|e| {
            tracing::error!("Failed to {}: {}", operation, e);
            Error::write_failed(operation, e)
        })
    }

    /// Posts by `author`, newest first; empty on error
    pub async fn get_posts_by_author(&self, author: &str) -> Vec<Post> {
        self.read("get posts by author", |db| db.get_posts_by_author(author))
            .await
    }

    /// Posts tagged with `topic_id`; empty on error
    pub async fn get_posts_by_topic(&self, topic_id: i64) -> Vec<Post> {
        self.read("get posts by topic", |db| db.get_posts_by_topic(topic_id))
            .await
    }

    /// Likes on a post; empty on error
    pub async fn get_likes_for_post(&self, post_id: &str) -> Vec<Like> {
        self.read("get likes for post", |db| db.get_likes_for_post(post_id))
            .await
    }

    /// Likes by a user; empty on error
    pub async fn get_likes_for_user(&self, user_id: &str) -> Vec<Like> {
        self.read("get likes for user", |db| db.get_likes_for_user(user_id))
            .await
    }

    /// Look up a user by email
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.db().await?.get_user_by_email(email)
    }
}

#[async_trait]
impl PostStorage for StorageEngine {
    async fn get_all_posts(&self) -> Vec<Post> {
        self.read("get posts", |db| db.get_all_posts()).await
    }

    async fn get_all_posts_for_viewer(&self, viewer: &str) -> Vec<Post> {
        self.read("get posts", |db| db.get_all_posts_for_viewer(viewer))
            .await
    }

    async fn get_topics(&self) -> Vec<Topic> {
        self.read("get topics", |db| db.get_topics()).await
    }

    async fn get_post(&self, id: &str) -> Option<Post> {
        self.read("get post", |db| db.get_post(id)).await
    }

    async fn add_post(&self, post: &Post) -> Result<()> {
        self.write("add post", |db| db.insert_post(post)).await?;
        tracing::debug!(post_id = %post.id, "Added post");
        Ok(())
    }

    async fn update_post(&self, post: &Post) -> Result<()> {
        self.write("update post", |db| db.put_post(post)).await
    }

    async fn get_comments_by_post_id(&self, post_id: &str) -> Vec<Comment> {
        self.read("get comments", |db| db.get_comments_by_post_id(post_id))
            .await
    }

    async fn add_comment(&self, comment: &Comment) -> Result<()> {
        self.write("add comment", |db| db.add_comment(comment)).await
    }

    async fn toggle_like(&self, user_id: &str, post_id: &str) -> Result<Option<Post>> {
        let timestamp = time::now_rfc3339();
        let post = self
            .write("toggle like", |db| db.toggle_like(user_id, post_id, &timestamp))
            .await?;
        if post.is_none() {
            tracing::debug!(post_id, "Like toggled on missing post, nothing written");
        }
        Ok(post)
    }

    async fn is_liked(&self, user_id: &str, post_id: &str) -> bool {
        self.read("check like", |db| db.is_liked(user_id, post_id))
            .await
    }
}

#[async_trait]
impl UserStorage for StorageEngine {
    async fn get_user(&self, username: &str) -> Result<Option<User>> {
        self.db().await?.get_user(username)
    }

    async fn add_user(&self, user: &User) -> Result<()> {
        self.db().await?.insert_user(user).map_err(|e| {
            tracing::error!("Failed to add user: {}", e);
            e
        })
    }

    async fn put_user(&self, user: &User) -> Result<()> {
        self.db().await?.put_user(user).map_err(|e| {
            tracing::error!("Failed to update user: {}", e);
            e
        })
    }

    async fn rename_user(&self, old_username: &str, user: &User) -> Result<()> {
        self.db().await?.rename_user(old_username, user).map_err(|e| {
            tracing::error!("Failed to rename user {}: {}", old_username, e);
            e
        })
    }
}
