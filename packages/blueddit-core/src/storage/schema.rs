//! # Database Schema
//!
//! Store and index definitions for the Blueddit database, the seed data, and
//! the upgrade routine that brings an older database up to date.
//!
//! ## Schema Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DATABASE SCHEMA                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐    ┌─────────────────┐      ┌─────────────────┐    │
//! │  │     users       │    │     posts       │      │    comments     │    │
//! │  ├─────────────────┤    ├─────────────────┤      ├─────────────────┤    │
//! │  │ username (PK)   │◄ ─ │ author          │      │ id (PK)         │    │
//! │  │ email (UNIQUE)  │    │ id (PK)         │◄ ─ ─ │ post_id         │    │
//! │  │ password_hash   │    │ title, content  │      │ author          │    │
//! │  │ created_at      │    │ image_url       │      │ content         │    │
//! │  └─────────────────┘    │ created_at      │      │ created_at      │    │
//! │                         │ upvotes         │      └─────────────────┘    │
//! │  ┌─────────────────┐    │ comment_count   │                             │
//! │  │     topics      │    │ liked           │      ┌─────────────────┐    │
//! │  ├─────────────────┤    │ topic_id        │      │     likes       │    │
//! │  │ id (PK)         │    │ topic_name      │      ├─────────────────┤    │
//! │  │ name            │    │ topic_desc...   │◄ ─ ─ │ user_id  ┐ PK   │    │
//! │  │ description     │    └─────────────────┘      │ post_id  ┘      │    │
//! │  └─────────────────┘                             │ timestamp       │    │
//! │                                                  └─────────────────┘    │
//! │   ─ ─ ►  logical reference, not enforced by a foreign key              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Upgrades
//!
//! Upgrades are additive only. [`upgrade`] walks every store and index
//! introduced at or before the target version and creates the ones that are
//! missing, so it can run against any `(old, new)` pair and can run twice.
//! Seed rows are written only when their store is created by that call.

use rusqlite::{params, Connection, OptionalExtension};

use super::records::{Post, Topic};
use crate::error::Result;

/// Current schema version
pub const SCHEMA_VERSION: u32 = 5;

/// Version bookkeeping table
pub const CREATE_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);
"#;

/// A record collection
struct StoreDef {
    name: &'static str,
    since: u32,
    create: &'static str,
}

/// A secondary index on a store
struct IndexDef {
    name: &'static str,
    since: u32,
    create: &'static str,
}

const STORES: &[StoreDef] = &[
    StoreDef {
        name: "users",
        since: 1,
        create: r#"
CREATE TABLE users (
    username TEXT PRIMARY KEY,
    email TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#,
    },
    StoreDef {
        name: "posts",
        since: 2,
        create: r#"
CREATE TABLE posts (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    -- URL or data URI
    image_url TEXT NOT NULL DEFAULT '',
    author TEXT NOT NULL,
    created_at TEXT NOT NULL,
    upvotes INTEGER NOT NULL DEFAULT 0 CHECK (upvotes >= 0),
    comment_count INTEGER NOT NULL DEFAULT 0 CHECK (comment_count >= 0),
    liked INTEGER NOT NULL DEFAULT 0,
    -- Topic snapshot at write time
    topic_id INTEGER NOT NULL,
    topic_name TEXT NOT NULL,
    topic_description TEXT NOT NULL
);
"#,
    },
    StoreDef {
        name: "comments",
        since: 2,
        create: r#"
CREATE TABLE comments (
    id TEXT PRIMARY KEY,
    post_id TEXT NOT NULL,
    author TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#,
    },
    StoreDef {
        name: "likes",
        since: 2,
        create: r#"
CREATE TABLE likes (
    user_id TEXT NOT NULL,
    post_id TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    PRIMARY KEY (user_id, post_id)
);
"#,
    },
    StoreDef {
        name: "topics",
        since: 4,
        create: r#"
CREATE TABLE topics (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL
);
"#,
    },
];

const INDEXES: &[IndexDef] = &[
    IndexDef {
        name: "idx_users_email",
        since: 1,
        create: "CREATE UNIQUE INDEX idx_users_email ON users(email);",
    },
    IndexDef {
        name: "idx_posts_by_date",
        since: 2,
        create: "CREATE INDEX idx_posts_by_date ON posts(created_at);",
    },
    IndexDef {
        name: "idx_comments_by_post_id",
        since: 2,
        create: "CREATE INDEX idx_comments_by_post_id ON comments(post_id);",
    },
    IndexDef {
        name: "idx_posts_by_author",
        since: 3,
        create: "CREATE INDEX idx_posts_by_author ON posts(author);",
    },
    IndexDef {
        name: "idx_comments_by_author",
        since: 3,
        create: "CREATE INDEX idx_comments_by_author ON comments(author);",
    },
    IndexDef {
        name: "idx_likes_by_post_id",
        since: 3,
        create: "CREATE INDEX idx_likes_by_post_id ON likes(post_id);",
    },
    IndexDef {
        name: "idx_likes_by_user_id",
        since: 3,
        create: "CREATE INDEX idx_likes_by_user_id ON likes(user_id);",
    },
    IndexDef {
        name: "idx_posts_by_topic",
        since: 5,
        create: "CREATE INDEX idx_posts_by_topic ON posts(topic_id);",
    },
];

/// Store names, in creation order
pub fn store_names() -> impl Iterator<Item = &'static str> {
    STORES.iter().map(|s| s.name)
}

/// What an [`upgrade`] call changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeReport {
    /// Stores created by this call
    pub created_stores: Vec<&'static str>,
    /// Indexes created by this call
    pub created_indexes: Vec<&'static str>,
    /// Seed posts written
    pub seeded_posts: usize,
    /// Seed topics written
    pub seeded_topics: usize,
}

impl UpgradeReport {
    /// Nothing was created
    pub fn is_noop(&self) -> bool {
        self.created_stores.is_empty() && self.created_indexes.is_empty()
    }
}

/// Bring the schema from `old_version` up to `new_version`.
///
/// Run this inside a transaction: any error leaves the caller to roll back,
/// so a failed upgrade never leaves a half-built schema behind.
pub fn upgrade(conn: &Connection, old_version: u32, new_version: u32) -> Result<UpgradeReport> {
    tracing::info!(
        "Upgrading database from version {} to {}",
        old_version,
        new_version
    );

    let mut report = UpgradeReport::default();

    for store in STORES.iter().filter(|s| s.since <= new_version) {
        if object_exists(conn, "table", store.name)? {
            continue;
        }
        conn.execute_batch(store.create)?;
        report.created_stores.push(store.name);
        tracing::debug!(store = store.name, "Created store");

        match store.name {
            "posts" => {
                for post in initial_posts() {
                    super::database::insert_post(conn, &post)?;
                    report.seeded_posts += 1;
                }
            }
            "topics" => {
                for topic in starter_topics() {
                    conn.execute(
                        "INSERT INTO topics (id, name, description) VALUES (?, ?, ?)",
                        params![topic.id, topic.name, topic.description],
                    )?;
                    report.seeded_topics += 1;
                }
            }
            _ => {}
        }
    }

    for index in INDEXES.iter().filter(|i| i.since <= new_version) {
        if object_exists(conn, "index", index.name)? {
            continue;
        }
        conn.execute_batch(index.create)?;
        report.created_indexes.push(index.name);
    }

    write_version(conn, new_version)?;

    tracing::info!(
        stores = report.created_stores.len(),
        indexes = report.created_indexes.len(),
        seeded_posts = report.seeded_posts,
        "Schema upgrade complete (now at version {})",
        new_version
    );

    Ok(report)
}

/// Version recorded in the database, `None` for a fresh database
pub fn read_version(conn: &Connection) -> Result<Option<u32>> {
    if !object_exists(conn, "table", "schema_version")? {
        return Ok(None);
    }
    let version: Option<u32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .optional()?;
    Ok(version)
}

/// Record `version` as the current schema version
pub fn write_version(conn: &Connection, version: u32) -> Result<()> {
    conn.execute_batch(CREATE_VERSION_TABLE)?;
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?)",
        params![version],
    )?;
    Ok(())
}

/// Whether a table or index with this name exists
pub fn object_exists(conn: &Connection, kind: &str, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = ? AND name = ?",
        params![kind, name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

// ============================================================================
// SEED DATA
// ============================================================================

/// The fixed starter topics
pub fn starter_topics() -> Vec<Topic> {
    vec![
        Topic::new(1, "Topic-1", "Technology and Programming"),
        Topic::new(2, "Topic-2", "Science and Research"),
        Topic::new(3, "Topic-3", "Art and Design"),
        Topic::new(4, "Topic-4", "Music and Entertainment"),
        Topic::new(5, "Topic-5", "Health and Fitness"),
    ]
}

/// The two posts every new database starts with
pub fn initial_posts() -> Vec<Post> {
    let topics = starter_topics();
    vec![
        Post {
            id: "1".into(),
            title: "Getting Started with Web Development".into(),
            content: "Learn the fundamentals of web development with this comprehensive guide."
                .into(),
            image_url: "https://images.unsplash.com/photo-1461749280684-dccba630e2f6?auto=format&fit=crop&q=80&w=1000".into(),
            author: "WebDevPro".into(),
            created_at: "2024-03-15T00:00:00.000Z".into(),
            upvotes: 0,
            comment_count: 0,
            liked: false,
            topic: topics[0].clone(),
        },
        Post {
            id: "2".into(),
            title: "Modern JavaScript Techniques".into(),
            content: "Discover the latest JavaScript features and best practices.".into(),
            image_url: "https://images.unsplash.com/photo-1555066931-4365d14bab8c?auto=format&fit=crop&q=80&w=1000".into(),
            author: "JSMaster".into(),
            created_at: "2024-03-14T00:00:00.000Z".into(),
            upvotes: 0,
            comment_count: 0,
            liked: false,
            topic: topics[1].clone(),
        },
    ]
}
