//! # Database
//!
//! SQLite connection wrapper with the record-level operations the storage
//! engine builds on.
//!
//! ## Database Operations
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      DATABASE OPERATIONS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐                                                    │
//! │  │  StorageEngine  │  Memoized open, error policy, lifecycle hooks      │
//! │  └────────┬────────┘                                                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                    │
//! │  │    Database     │  Record operations                                 │
//! │  │   (this file)   │  - Posts, comments, likes                          │
//! │  │                 │  - Users                                           │
//! │  │                 │  - Multi-row writes in one transaction             │
//! │  └────────┬────────┘                                                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                    │
//! │  │   SQLite DB     │  Storage                                           │
//! │  │   (file or      │  - In-memory for tests                             │
//! │  │    memory)      │  - File (WAL) for production                       │
//! │  └─────────────────┘                                                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use super::records::{Comment, Like, Post, Topic, User};
use super::schema;
use crate::error::{Error, Result};

/// Database configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Path to the database file; `None` opens an in-memory database
    pub path: Option<PathBuf>,
}

impl DatabaseConfig {
    /// In-memory database, discarded on close
    pub fn in_memory() -> Self {
        Self { path: None }
    }

    /// File-backed database at `path`
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }
}

/// The main database handle
///
/// The connection sits behind an `Option` so lifecycle hooks can close it
/// while other handles to this `Database` are still alive; they then see
/// [`Error::DatabaseClosed`].
pub struct Database {
    conn: Mutex<Option<Connection>>,
    config: DatabaseConfig,
}

impl Database {
    /// Open or create a database and bring its schema up to date
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        let mut conn = match &config.path {
            Some(p) => Connection::open(p)
                .map_err(|e| Error::DatabaseInitFailed(format!("Failed to open database: {}", e)))?,
            None => Connection::open_in_memory().map_err(|e| {
                Error::DatabaseInitFailed(format!("Failed to create in-memory database: {}", e))
            })?,
        };

        if config.path.is_some() {
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(|e| Error::DatabaseInitFailed(format!("Failed to enable WAL: {}", e)))?;
        }

        Self::init_schema(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(Some(conn)),
            config,
        })
    }

    /// Run the upgrade routine in a single transaction
    fn init_schema(conn: &mut Connection) -> Result<()> {
        let init_failed = |e: Error| Error::DatabaseInitFailed(e.to_string());

        let tx = conn.transaction().map_err(|e| init_failed(e.into()))?;

        match schema::read_version(&tx).map_err(init_failed)? {
            Some(found) if found > schema::SCHEMA_VERSION => {
                tracing::error!(
                    "Database schema version {} is newer than supported {}",
                    found,
                    schema::SCHEMA_VERSION
                );
                return Err(Error::SchemaVersionTooNew {
                    found,
                    supported: schema::SCHEMA_VERSION,
                });
            }
            Some(found) if found == schema::SCHEMA_VERSION => {
                tracing::debug!("Database schema is current (version {})", found);
            }
            found => {
                schema::upgrade(&tx, found.unwrap_or(0), schema::SCHEMA_VERSION)
                    .map_err(init_failed)?;
            }
        }

        tx.commit().map_err(|e| init_failed(e.into()))?;
        Ok(())
    }

    /// Configuration this database was opened with
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Close the connection; later calls fail with [`Error::DatabaseClosed`]
    pub fn close(&self) {
        if self.conn.lock().take().is_some() {
            tracing::debug!("Database connection closed");
        }
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.conn.lock().is_none()
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.conn.lock();
        let conn = guard.as_mut().ok_or(Error::DatabaseClosed)?;
        f(conn)
    }

    /// Version recorded in the database
    pub fn schema_version(&self) -> Result<Option<u32>> {
        self.with_conn(|conn| schema::read_version(conn))
    }

    // ========================================================================
    // POST OPERATIONS
    // ========================================================================

    /// All posts, newest first
    pub fn get_all_posts(&self) -> Result<Vec<Post>> {
        self.query_posts(
            &format!(
                "SELECT {} FROM posts ORDER BY created_at DESC, id DESC",
                Post::COLUMNS
            ),
            params![],
        )
    }

    /// All posts, newest first, with `liked` computed for `viewer`
    pub fn get_all_posts_for_viewer(&self, viewer: &str) -> Result<Vec<Post>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT p.id, p.title, p.content, p.image_url, p.author, p.created_at,
                        p.upvotes, p.comment_count, (l.user_id IS NOT NULL),
                        p.topic_id, p.topic_name, p.topic_description
                 FROM posts p
                 LEFT JOIN likes l ON l.post_id = p.id AND l.user_id = ?
                 ORDER BY p.created_at DESC, p.id DESC",
            )?;
            let posts = stmt
                .query_map(params![viewer], Post::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(posts)
        })
    }

    /// Posts by `author`, newest first
    pub fn get_posts_by_author(&self, author: &str) -> Result<Vec<Post>> {
        self.query_posts(
            &format!(
                "SELECT {} FROM posts WHERE author = ? ORDER BY created_at DESC",
                Post::COLUMNS
            ),
            params![author],
        )
    }

    /// Posts tagged with topic `topic_id`, newest first
    pub fn get_posts_by_topic(&self, topic_id: i64) -> Result<Vec<Post>> {
        self.query_posts(
            &format!(
                "SELECT {} FROM posts WHERE topic_id = ? ORDER BY created_at DESC",
                Post::COLUMNS
            ),
            params![topic_id],
        )
    }

    fn query_posts(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<Post>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let posts = stmt
                .query_map(args, Post::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(posts)
        })
    }

    /// Get a post by id
    pub fn get_post(&self, id: &str) -> Result<Option<Post>> {
        self.with_conn(|conn| get_post(conn, id))
    }

    /// Insert a new post; fails on a duplicate id
    pub fn insert_post(&self, post: &Post) -> Result<()> {
        self.with_conn(|conn| insert_post(conn, post))
    }

    /// Insert a post, or update the editable fields of an existing one
    ///
    /// Counters and the like flag are owned by `add_comment` and
    /// `toggle_like`: an update never touches them, and a new row starts at
    /// zero.
    pub fn put_post(&self, post: &Post) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (id, title, content, image_url, author, created_at,
                                    upvotes, comment_count, liked,
                                    topic_id, topic_name, topic_description)
                 VALUES (?, ?, ?, ?, ?, ?, 0, 0, 0, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    content = excluded.content,
                    image_url = excluded.image_url,
                    topic_id = excluded.topic_id,
                    topic_name = excluded.topic_name,
                    topic_description = excluded.topic_description",
                params![
                    post.id,
                    post.title,
                    post.content,
                    post.image_url,
                    post.author,
                    post.created_at,
                    post.topic.id,
                    post.topic.name,
                    post.topic.description,
                ],
            )?;
            Ok(())
        })
    }

    // ========================================================================
    // COMMENT OPERATIONS
    // ========================================================================

    /// Comments on a post, oldest first
    pub fn get_comments_by_post_id(&self, post_id: &str) -> Result<Vec<Comment>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, post_id, author, content, created_at
                 FROM comments WHERE post_id = ?
                 ORDER BY created_at ASC, id ASC",
            )?;
            let comments = stmt
                .query_map(params![post_id], Comment::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(comments)
        })
    }

    /// Store a comment and bump its post's counter in one transaction
    ///
    /// A missing parent post leaves the comment stored and the counter
    /// untouched.
    pub fn add_comment(&self, comment: &Comment) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO comments (id, post_id, author, content, created_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    comment.id,
                    comment.post_id,
                    comment.author,
                    comment.content,
                    comment.created_at,
                ],
            )?;
            let updated = tx.execute(
                "UPDATE posts SET comment_count = comment_count + 1 WHERE id = ?",
                params![comment.post_id],
            )?;
            if updated == 0 {
                tracing::debug!(post_id = %comment.post_id, "Comment stored for unknown post");
            }
            tx.commit()?;
            Ok(())
        })
    }

    // ========================================================================
    // LIKE OPERATIONS
    // ========================================================================

    /// Flip `user_id`'s like on `post_id`, adjusting the post in the same
    /// transaction
    ///
    /// Returns the updated post, or `None` (and writes nothing) when the post
    /// does not exist.
    pub fn toggle_like(&self, user_id: &str, post_id: &str, timestamp: &str) -> Result<Option<Post>> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;

            let Some(mut post) = get_post(&tx, post_id)? else {
                return Ok(None);
            };

            let existing = get_like(&tx, user_id, post_id)?;
            if existing.is_some() {
                tx.execute(
                    "DELETE FROM likes WHERE user_id = ? AND post_id = ?",
                    params![user_id, post_id],
                )?;
                post.upvotes = (post.upvotes - 1).max(0);
                post.liked = false;
            } else {
                tx.execute(
                    "INSERT INTO likes (user_id, post_id, timestamp) VALUES (?, ?, ?)",
                    params![user_id, post_id, timestamp],
                )?;
                post.upvotes += 1;
                post.liked = true;
            }

            tx.execute(
                "UPDATE posts SET upvotes = ?, liked = ? WHERE id = ?",
                params![post.upvotes, post.liked, post.id],
            )?;
            tx.commit()?;

            Ok(Some(post))
        })
    }

    /// A single like record
    pub fn get_like(&self, user_id: &str, post_id: &str) -> Result<Option<Like>> {
        self.with_conn(|conn| get_like(conn, user_id, post_id))
    }

    /// Whether `user_id` has liked `post_id`
    pub fn is_liked(&self, user_id: &str, post_id: &str) -> Result<bool> {
        Ok(self.get_like(user_id, post_id)?.is_some())
    }

    /// Likes on a post
    pub fn get_likes_for_post(&self, post_id: &str) -> Result<Vec<Like>> {
        self.query_likes("SELECT user_id, post_id, timestamp FROM likes WHERE post_id = ?", post_id)
    }

    /// Likes by a user
    pub fn get_likes_for_user(&self, user_id: &str) -> Result<Vec<Like>> {
        self.query_likes("SELECT user_id, post_id, timestamp FROM likes WHERE user_id = ?", user_id)
    }

    fn query_likes(&self, sql: &str, key: &str) -> Result<Vec<Like>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let likes = stmt
                .query_map(params![key], Like::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(likes)
        })
    }

    // ========================================================================
    // USER OPERATIONS
    // ========================================================================

    /// Get a user by username
    pub fn get_user(&self, username: &str) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let user = conn
                .query_row(
                    "SELECT username, email, password_hash, created_at FROM users WHERE username = ?",
                    params![username],
                    User::from_row,
                )
                .optional()?;
            Ok(user)
        })
    }

    /// Get a user by email
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let user = conn
                .query_row(
                    "SELECT username, email, password_hash, created_at FROM users WHERE email = ?",
                    params![email],
                    User::from_row,
                )
                .optional()?;
            Ok(user)
        })
    }

    /// Insert a new user; a duplicate username or email is a constraint
    /// violation
    pub fn insert_user(&self, user: &User) -> Result<()> {
        self.with_conn(|conn| insert_user(conn, user))
    }

    /// Replace the stored user with the same username
    pub fn put_user(&self, user: &User) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, email, password_hash, created_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(username) DO UPDATE SET
                    email = excluded.email,
                    password_hash = excluded.password_hash,
                    created_at = excluded.created_at",
                params![user.username, user.email, user.password_hash, user.created_at],
            )?;
            Ok(())
        })
    }

    /// Replace `old_username` with `user` in one transaction
    ///
    /// If the insert fails the delete is rolled back with it.
    pub fn rename_user(&self, old_username: &str, user: &User) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM users WHERE username = ?", params![old_username])?;
            insert_user(&tx, user)?;
            tx.commit()?;
            Ok(())
        })
    }

    // ========================================================================
    // TOPIC OPERATIONS
    // ========================================================================

    /// Stored topics, by id
    pub fn get_topics(&self) -> Result<Vec<Topic>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name, description FROM topics ORDER BY id")?;
            let topics = stmt
                .query_map([], |row| {
                    Ok(Topic {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(topics)
        })
    }
}

// ============================================================================
// CONNECTION-LEVEL HELPERS
// ============================================================================

/// Insert a post on a bare connection; shared with schema seeding
pub(crate) fn insert_post(conn: &Connection, post: &Post) -> Result<()> {
    conn.execute(
        "INSERT INTO posts (id, title, content, image_url, author, created_at,
                            upvotes, comment_count, liked,
                            topic_id, topic_name, topic_description)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            post.id,
            post.title,
            post.content,
            post.image_url,
            post.author,
            post.created_at,
            post.upvotes,
            post.comment_count,
            post.liked,
            post.topic.id,
            post.topic.name,
            post.topic.description,
        ],
    )?;
    Ok(())
}

fn get_post(conn: &Connection, id: &str) -> Result<Option<Post>> {
    let post = conn
        .query_row(
            &format!("SELECT {} FROM posts WHERE id = ?", Post::COLUMNS),
            params![id],
            Post::from_row,
        )
        .optional()?;
    Ok(post)
}

fn get_like(conn: &Connection, user_id: &str, post_id: &str) -> Result<Option<Like>> {
    let like = conn
        .query_row(
            "SELECT user_id, post_id, timestamp FROM likes WHERE user_id = ? AND post_id = ?",
            params![user_id, post_id],
            Like::from_row,
        )
        .optional()?;
    Ok(like)
}

fn insert_user(conn: &Connection, user: &User) -> Result<()> {
    conn.execute(
        "INSERT INTO users (username, email, password_hash, created_at) VALUES (?, ?, ?, ?)",
        params![user.username, user.email, user.password_hash, user.created_at],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str, email: &str) -> User {
        User {
            username: name.into(),
            email: email.into(),
            password_hash: "hash".into(),
            created_at: "2024-03-01T00:00:00.000Z".into(),
        }
    }

    fn comment(id: &str, post_id: &str, created_at: &str) -> Comment {
        Comment {
            id: id.into(),
            post_id: post_id.into(),
            author: "bob".into(),
            content: "hello".into(),
            created_at: created_at.into(),
        }
    }

    #[test]
    fn test_database_creation_seeds_posts() {
        let db = Database::open(DatabaseConfig::in_memory()).unwrap();
        let posts = db.get_all_posts().unwrap();
        assert_eq!(posts.len(), 2);
        // Newest first
        assert_eq!(posts[0].id, "1");
        assert_eq!(posts[1].id, "2");
        assert_eq!(db.get_topics().unwrap().len(), 5);
        assert_eq!(db.schema_version().unwrap(), Some(schema::SCHEMA_VERSION));
    }

    #[test]
    fn test_reopen_does_not_reseed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blueddit.db");

        let db = Database::open(DatabaseConfig::at(&path)).unwrap();
        db.with_conn(|conn| {
            conn.execute("DELETE FROM posts WHERE id = '2'", [])?;
            Ok(())
        })
        .unwrap();
        db.close();

        let db = Database::open(DatabaseConfig::at(&path)).unwrap();
        assert_eq!(db.get_all_posts().unwrap().len(), 1);
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blueddit.db");

        let db = Database::open(DatabaseConfig::at(&path)).unwrap();
        db.with_conn(|conn| schema::write_version(conn, schema::SCHEMA_VERSION + 1))
            .unwrap();
        db.close();

        let err = Database::open(DatabaseConfig::at(&path)).err().unwrap();
        assert!(matches!(err, Error::SchemaVersionTooNew { found: 6, supported: 5 }));
    }

    #[test]
    fn test_failed_upgrade_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blueddit.db");
        {
            // A view squatting on a store name makes table creation fail.
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch("CREATE VIEW posts AS SELECT 1 AS id;").unwrap();
        }

        let err = Database::open(DatabaseConfig::at(&path)).err().unwrap();
        assert!(matches!(err, Error::DatabaseInitFailed(_)));

        let conn = Connection::open(&path).unwrap();
        assert!(!schema::object_exists(&conn, "table", "users").unwrap());
        assert_eq!(schema::read_version(&conn).unwrap(), None);
    }

    #[test]
    fn test_comment_bumps_counter() {
        let db = Database::open(DatabaseConfig::in_memory()).unwrap();
        db.add_comment(&comment("c2", "1", "2024-03-16T00:00:02.000Z")).unwrap();
        db.add_comment(&comment("c1", "1", "2024-03-16T00:00:01.000Z")).unwrap();

        let comments = db.get_comments_by_post_id("1").unwrap();
        assert_eq!(
            comments.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            vec!["c1", "c2"]
        );
        assert_eq!(db.get_post("1").unwrap().unwrap().comment_count, 2);
    }

    #[test]
    fn test_comment_on_missing_post_is_kept() {
        let db = Database::open(DatabaseConfig::in_memory()).unwrap();
        db.add_comment(&comment("c1", "nope", "2024-03-16T00:00:00.000Z")).unwrap();
        assert_eq!(db.get_comments_by_post_id("nope").unwrap().len(), 1);
        assert!(db.get_post("nope").unwrap().is_none());
    }

    #[test]
    fn test_toggle_like_round_trip() {
        let db = Database::open(DatabaseConfig::in_memory()).unwrap();

        let post = db.toggle_like("alice", "1", "t").unwrap().unwrap();
        assert_eq!(post.upvotes, 1);
        assert!(post.liked);
        assert!(db.is_liked("alice", "1").unwrap());

        let post = db.toggle_like("alice", "1", "t").unwrap().unwrap();
        assert_eq!(post.upvotes, 0);
        assert!(!post.liked);
        assert!(db.get_likes_for_post("1").unwrap().is_empty());
    }

    #[test]
    fn test_stale_edit_keeps_counters() {
        let db = Database::open(DatabaseConfig::in_memory()).unwrap();
        let mut stale = db.get_post("1").unwrap().unwrap();

        db.toggle_like("alice", "1", "t").unwrap();
        db.add_comment(&comment("c1", "1", "2024-03-16T00:00:00.000Z")).unwrap();

        stale.title = "Edited".into();
        db.put_post(&stale).unwrap();

        let stored = db.get_post("1").unwrap().unwrap();
        assert_eq!(stored.title, "Edited");
        assert_eq!(stored.upvotes as usize, db.get_likes_for_post("1").unwrap().len());
        assert!(stored.liked);
        assert_eq!(stored.comment_count as usize, db.get_comments_by_post_id("1").unwrap().len());
    }

    #[test]
    fn test_put_new_post_starts_at_zero() {
        let db = Database::open(DatabaseConfig::in_memory()).unwrap();
        let mut post = db.get_post("1").unwrap().unwrap();
        post.id = "3".into();
        post.upvotes = 42;
        post.comment_count = 7;
        post.liked = true;
        db.put_post(&post).unwrap();

        let stored = db.get_post("3").unwrap().unwrap();
        assert_eq!((stored.upvotes, stored.comment_count, stored.liked), (0, 0, false));
    }

    #[test]
    fn test_toggle_like_floors_at_zero() {
        let db = Database::open(DatabaseConfig::in_memory()).unwrap();
        // A like row with no matching upvote
        db.with_conn(|conn| {
            conn.execute("INSERT INTO likes VALUES ('alice', '1', 't')", [])?;
            Ok(())
        })
        .unwrap();

        let post = db.toggle_like("alice", "1", "t").unwrap().unwrap();
        assert_eq!(post.upvotes, 0);
    }

    #[test]
    fn test_toggle_like_missing_post() {
        let db = Database::open(DatabaseConfig::in_memory()).unwrap();
        assert!(db.toggle_like("alice", "404", "t").unwrap().is_none());
        assert!(db.get_likes_for_user("alice").unwrap().is_empty());
    }

    #[test]
    fn test_viewer_liked_flag() {
        let db = Database::open(DatabaseConfig::in_memory()).unwrap();
        db.toggle_like("alice", "2", "t").unwrap();

        let for_alice = db.get_all_posts_for_viewer("alice").unwrap();
        let for_bob = db.get_all_posts_for_viewer("bob").unwrap();
        assert!(for_alice.iter().find(|p| p.id == "2").unwrap().liked);
        assert!(!for_bob.iter().any(|p| p.liked));
        assert_eq!(for_bob.iter().find(|p| p.id == "2").unwrap().upvotes, 1);
    }

    #[test]
    fn test_posts_by_author_and_topic() {
        let db = Database::open(DatabaseConfig::in_memory()).unwrap();
        assert_eq!(db.get_posts_by_author("JSMaster").unwrap().len(), 1);
        assert_eq!(db.get_posts_by_topic(1).unwrap()[0].id, "1");
        assert!(db.get_posts_by_topic(5).unwrap().is_empty());
    }

    #[test]
    fn test_user_uniqueness() {
        let db = Database::open(DatabaseConfig::in_memory()).unwrap();
        db.insert_user(&user("alice", "a@x.com")).unwrap();

        assert!(db.insert_user(&user("alice", "b@x.com")).unwrap_err().is_constraint_violation());
        assert!(db.insert_user(&user("bob", "a@x.com")).unwrap_err().is_constraint_violation());
        assert_eq!(db.get_user_by_email("a@x.com").unwrap().unwrap().username, "alice");
    }

    #[test]
    fn test_rename_user_is_atomic() {
        let db = Database::open(DatabaseConfig::in_memory()).unwrap();
        db.insert_user(&user("alice", "a@x.com")).unwrap();
        db.insert_user(&user("bob", "b@x.com")).unwrap();

        // Collides with bob's email: the delete of alice must roll back.
        let err = db.rename_user("alice", &user("alicia", "b@x.com")).unwrap_err();
        assert!(err.is_constraint_violation());
        assert!(db.get_user("alice").unwrap().is_some());

        db.rename_user("alice", &user("alicia", "a@x.com")).unwrap();
        assert!(db.get_user("alice").unwrap().is_none());
        assert!(db.get_user("alicia").unwrap().is_some());
    }

    #[test]
    fn test_closed_database() {
        let db = Database::open(DatabaseConfig::in_memory()).unwrap();
        db.close();
        assert!(db.is_closed());
        assert!(matches!(db.get_all_posts(), Err(Error::DatabaseClosed)));
    }
}
