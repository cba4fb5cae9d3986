//! # Forum Store
//!
//! In-memory mirror of posts, comments and topics with change notification.
//!
//! ## Write Path
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORE WRITE PATH                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   add_post / update_post / add_comment / toggle_like                    │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   PostStorage ──── Err ───► record last_error, emit Failed, return Err  │
//! │        │                    (mirror untouched)                          │
//! │        Ok                                                               │
//! │        ▼                                                                │
//! │   update mirror ──► emit event to subscribers                           │
//! │                                                                         │
//! │   add_topic: mirror only, never persisted                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Listeners run synchronously on the calling task after the store's locks
//! are released, so a listener may read the store.

mod views;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

pub use views::TopicGroup;

use crate::error::{Error, Result};
use crate::storage::{schema, Comment, Post, PostStorage, Topic};
use crate::time;

/// A change the store has applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// `initialize` started
    Loading,
    /// `initialize` finished
    Loaded {
        /// Number of posts loaded
        posts: usize,
    },
    /// A post was stored and mirrored
    PostAdded(Post),
    /// A post was replaced
    PostUpdated(Post),
    /// A comment was stored and mirrored
    CommentAdded(Comment),
    /// An in-memory topic was added
    TopicAdded(Topic),
    /// A like was flipped; carries the refreshed post
    LikeToggled {
        /// Who liked or unliked
        user_id: String,
        /// The post as storage returned it
        post: Post,
    },
    /// A write was rejected by storage
    Failed(String),
}

/// Handle returned by [`ForumStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Store change callback
pub type Listener = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

/// Input for a new post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    /// Title
    pub title: String,
    /// Body text
    pub content: String,
    /// URL or data URI; may be empty
    #[serde(default)]
    pub image_url: String,
    /// Topic snapshot to embed
    pub topic: Topic,
}

#[derive(Debug, Default)]
struct StoreState {
    posts: Vec<Post>,
    comments: HashMap<String, Vec<Comment>>,
    topics: Vec<Topic>,
    /// Topics created through `add_topic`, kept across reloads
    added_topics: Vec<Topic>,
    is_loading: bool,
    error: Option<String>,
}

/// Shared, observable forum state
pub struct ForumStore {
    storage: Arc<dyn PostStorage>,
    state: RwLock<StoreState>,
    viewer: RwLock<Option<String>>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_subscription: AtomicU64,
}

impl ForumStore {
    /// Create an empty store over `storage`; call [`initialize`](Self::initialize)
    /// to load it
    pub fn new(storage: Arc<dyn PostStorage>) -> Self {
        Self {
            storage,
            state: RwLock::new(StoreState::default()),
            viewer: RwLock::new(None),
            listeners: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    // ========================================================================
    // SUBSCRIPTIONS
    // ========================================================================

    /// Register a callback for every future [`StoreEvent`]
    pub fn subscribe(&self, listener: impl Fn(&StoreEvent) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Remove a callback; returns whether it was registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    fn emit(&self, event: StoreEvent) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(&event);
        }
    }

    fn fail(&self, err: Error) -> Error {
        let message = err.to_string();
        self.state.write().error = Some(message.clone());
        self.emit(StoreEvent::Failed(message));
        err
    }

    // ========================================================================
    // LOADING
    // ========================================================================

    /// Set whose likes decide each post's `liked` flag on the next load
    pub fn set_viewer(&self, viewer: Option<String>) {
        *self.viewer.write() = viewer;
    }

    /// Current viewer
    pub fn viewer(&self) -> Option<String> {
        self.viewer.read().clone()
    }

    /// Switch the viewer and reload so every `liked` flag is theirs
    ///
    /// Does nothing when the viewer is unchanged.
    pub async fn change_viewer(&self, viewer: Option<String>) {
        if self.viewer() == viewer {
            return;
        }
        self.set_viewer(viewer);
        self.initialize().await;
    }

    async fn liked_by_viewer(&self, post_id: &str) -> bool {
        match self.viewer() {
            Some(viewer) => self.storage.is_liked(&viewer, post_id).await,
            None => false,
        }
    }

    /// Load posts, then the comments of every post, then topics
    pub async fn initialize(&self) {
        self.state.write().is_loading = true;
        self.emit(StoreEvent::Loading);

        let viewer = self.viewer();
        let posts = match &viewer {
            Some(v) => self.storage.get_all_posts_for_viewer(v).await,
            // Nobody to have liked anything
            None => {
                let mut posts = self.storage.get_all_posts().await;
                for post in &mut posts {
                    post.liked = false;
                }
                posts
            }
        };

        let mut comments = HashMap::with_capacity(posts.len());
        for post in &posts {
            let list = self.storage.get_comments_by_post_id(&post.id).await;
            comments.insert(post.id.clone(), list);
        }

        let mut topics = self.storage.get_topics().await;
        if topics.is_empty() {
            topics = schema::starter_topics();
        }

        let count = posts.len();
        {
            let mut state = self.state.write();
            for added in &state.added_topics {
                if !topics.iter().any(|t| t.id == added.id) {
                    topics.push(added.clone());
                }
            }
            state.posts = posts;
            state.comments = comments;
            state.topics = topics;
            state.is_loading = false;
            state.error = None;
        }

        tracing::debug!(posts = count, "Store initialized");
        self.emit(StoreEvent::Loaded { posts: count });
    }

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    /// Persist a new post by `author`, then prepend it to the mirror
    pub async fn add_post(&self, input: NewPost, author: &str) -> Result<Post> {
        let post = Post {
            id: time::time_token(),
            title: input.title,
            content: input.content,
            image_url: input.image_url,
            author: author.to_string(),
            created_at: time::now_rfc3339(),
            upvotes: 0,
            comment_count: 0,
            liked: false,
            topic: input.topic,
        };

        self.storage.add_post(&post).await.map_err(|e| self.fail(e))?;

        self.state.write().posts.insert(0, post.clone());
        self.emit(StoreEvent::PostAdded(post.clone()));
        Ok(post)
    }

    /// Persist an edited post, then mirror the stored record
    ///
    /// Upvotes and comment count always come from storage, never from
    /// `post`.
    pub async fn update_post(&self, post: Post) -> Result<Post> {
        self.storage.update_post(&post).await.map_err(|e| self.fail(e))?;

        let mut stored = match self.storage.get_post(&post.id).await {
            Some(stored) => stored,
            None => {
                let err = Error::write_failed("update post", "post missing after write");
                return Err(self.fail(err));
            }
        };
        stored.liked = self.liked_by_viewer(&stored.id).await;

        {
            let mut state = self.state.write();
            match state.posts.iter_mut().find(|p| p.id == stored.id) {
                Some(existing) => *existing = stored.clone(),
                None => state.posts.insert(0, stored.clone()),
            }
        }
        self.emit(StoreEvent::PostUpdated(stored.clone()));
        Ok(stored)
    }

    /// Flip `user_id`'s like on `post_id`
    ///
    /// The mirrored post is replaced by the record storage returns. `None`
    /// when the post does not exist.
    pub async fn toggle_like(&self, user_id: &str, post_id: &str) -> Result<Option<Post>> {
        let updated = self
            .storage
            .toggle_like(user_id, post_id)
            .await
            .map_err(|e| self.fail(e))?;

        let Some(post) = updated else {
            return Ok(None);
        };

        if let Some(existing) = self.state.write().posts.iter_mut().find(|p| p.id == post.id) {
            *existing = post.clone();
        }
        self.emit(StoreEvent::LikeToggled {
            user_id: user_id.to_string(),
            post: post.clone(),
        });
        Ok(Some(post))
    }

    /// Persist a comment, then append it and bump the mirrored counter
    pub async fn add_comment(&self, post_id: &str, author: &str, content: &str) -> Result<Comment> {
        let comment = Comment {
            id: time::time_token(),
            post_id: post_id.to_string(),
            author: author.to_string(),
            content: content.to_string(),
            created_at: time::now_rfc3339(),
        };

        self.storage
            .add_comment(&comment)
            .await
            .map_err(|e| self.fail(e))?;

        {
            let mut state = self.state.write();
            state
                .comments
                .entry(post_id.to_string())
                .or_default()
                .push(comment.clone());
            if let Some(post) = state.posts.iter_mut().find(|p| p.id == post_id) {
                post.comment_count += 1;
            }
        }
        self.emit(StoreEvent::CommentAdded(comment.clone()));
        Ok(comment)
    }

    /// Add a topic to the in-memory list only
    ///
    /// The id is one past the current topic count.
    pub fn add_topic(&self, name: &str, description: &str) -> Topic {
        let topic = {
            let mut state = self.state.write();
            let topic = Topic::new(state.topics.len() as i64 + 1, name, description);
            state.topics.push(topic.clone());
            state.added_topics.push(topic.clone());
            topic
        };
        self.emit(StoreEvent::TopicAdded(topic.clone()));
        topic
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// All mirrored posts, newest first
    pub fn posts(&self) -> Vec<Post> {
        self.state.read().posts.clone()
    }

    /// A mirrored post
    pub fn post(&self, id: &str) -> Option<Post> {
        self.state.read().posts.iter().find(|p| p.id == id).cloned()
    }

    /// Comments on a post, oldest first
    pub fn comments_for(&self, post_id: &str) -> Vec<Comment> {
        self.state
            .read()
            .comments
            .get(post_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Known topics
    pub fn topics(&self) -> Vec<Topic> {
        self.state.read().topics.clone()
    }

    /// Whether `initialize` is running
    pub fn is_loading(&self) -> bool {
        self.state.read().is_loading
    }

    /// Message of the last failed write, cleared by `initialize`
    pub fn last_error(&self) -> Option<String> {
        self.state.read().error.clone()
    }

    /// Posts written by `author`
    pub fn posts_by_author(&self, author: &str) -> Vec<Post> {
        views::posts_by_author(&self.state.read().posts, author)
    }

    /// Posts tagged with `topic_id`, most upvoted first
    pub fn posts_by_topic(&self, topic_id: i64) -> Vec<Post> {
        views::posts_by_topic(&self.state.read().posts, topic_id)
    }

    /// Non-empty topic groups, optionally restricted to one topic
    pub fn grouped_by_topic(&self, topic_id: Option<i64>) -> Vec<TopicGroup> {
        let state = self.state.read();
        views::grouped_by_topic(&state.posts, &state.topics, topic_id)
    }

    /// Posts matching `query`
    pub fn search(&self, query: &str) -> Vec<Post> {
        views::search(&self.state.read().posts, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DatabaseConfig, StorageEngine};
    use async_trait::async_trait;

    /// Storage whose writes always fail
    struct BrokenStorage;

    #[async_trait]
    impl PostStorage for BrokenStorage {
        async fn get_all_posts(&self) -> Vec<Post> {
            schema::initial_posts()
        }
        async fn get_all_posts_for_viewer(&self, _viewer: &str) -> Vec<Post> {
            schema::initial_posts()
        }
        async fn get_topics(&self) -> Vec<Topic> {
            Vec::new()
        }
        async fn get_post(&self, _id: &str) -> Option<Post> {
            None
        }
        async fn add_post(&self, _post: &Post) -> Result<()> {
            Err(Error::write_failed("add post", "disk full"))
        }
        async fn update_post(&self, _post: &Post) -> Result<()> {
            Err(Error::write_failed("update post", "disk full"))
        }
        async fn get_comments_by_post_id(&self, _post_id: &str) -> Vec<Comment> {
            Vec::new()
        }
        async fn add_comment(&self, _comment: &Comment) -> Result<()> {
            Err(Error::write_failed("add comment", "disk full"))
        }
        async fn toggle_like(&self, _user_id: &str, _post_id: &str) -> Result<Option<Post>> {
            Err(Error::write_failed("toggle like", "disk full"))
        }
        async fn is_liked(&self, _user_id: &str, _post_id: &str) -> bool {
            false
        }
    }

    fn new_post() -> NewPost {
        NewPost {
            title: "Hello".into(),
            content: "World".into(),
            image_url: String::new(),
            topic: schema::starter_topics()[2].clone(),
        }
    }

    async fn loaded_store() -> ForumStore {
        let engine = Arc::new(StorageEngine::new(DatabaseConfig::in_memory()));
        let store = ForumStore::new(engine);
        store.initialize().await;
        store
    }

    #[tokio::test]
    async fn test_initialize_loads_everything() {
        let store = loaded_store().await;
        assert!(!store.is_loading());
        assert_eq!(store.posts().len(), 2);
        assert_eq!(store.topics().len(), 5);
        assert!(store.comments_for("1").is_empty());
    }

    #[tokio::test]
    async fn test_add_post_and_comment() {
        let store = loaded_store().await;

        let post = store.add_post(new_post(), "alice").await.unwrap();
        assert_eq!(store.posts()[0].id, post.id);
        assert_eq!(store.posts_by_author("alice").len(), 1);

        let comment = store.add_comment(&post.id, "bob", "nice").await.unwrap();
        assert_eq!(store.comments_for(&post.id), vec![comment]);
        assert_eq!(store.post(&post.id).unwrap().comment_count, 1);

        // Survives a reload from storage
        store.initialize().await;
        assert_eq!(store.post(&post.id).unwrap().comment_count, 1);
        assert_eq!(store.comments_for(&post.id).len(), 1);
    }

    #[tokio::test]
    async fn test_toggle_like_refreshes_mirror() {
        let store = loaded_store().await;

        let post = store.toggle_like("alice", "1").await.unwrap().unwrap();
        assert_eq!(post.upvotes, 1);
        assert_eq!(store.post("1").unwrap().upvotes, 1);
        assert!(store.post("1").unwrap().liked);

        store.toggle_like("alice", "1").await.unwrap();
        assert_eq!(store.post("1").unwrap().upvotes, 0);

        assert!(store.toggle_like("alice", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_writes_leave_mirror_untouched() {
        let store = ForumStore::new(Arc::new(BrokenStorage));
        store.initialize().await;
        let before = store.posts();

        let err = store.add_post(new_post(), "alice").await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to add post");
        assert_eq!(store.last_error().as_deref(), Some("Failed to add post"));

        assert!(store.add_comment("1", "bob", "hi").await.is_err());
        assert!(store.toggle_like("bob", "1").await.is_err());
        assert!(store.update_post(before[0].clone()).await.is_err());

        assert_eq!(store.posts(), before);
        assert!(store.comments_for("1").is_empty());
        // Topics fall back to the starter set
        assert_eq!(store.topics().len(), 5);
    }

    #[tokio::test]
    async fn test_add_topic_survives_reload() {
        let store = loaded_store().await;
        let topic = store.add_topic("Topic-6", "Travel");
        assert_eq!(topic.id, 6);

        store.initialize().await;
        assert!(store.topics().iter().any(|t| t.description == "Travel"));
        assert_eq!(store.topics().len(), 6);
    }

    #[tokio::test]
    async fn test_subscribe_and_unsubscribe() {
        let store = loaded_store().await;
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let id = store.subscribe(move |event| sink.lock().push(event.clone()));

        store.add_topic("Topic-6", "Travel");
        store.toggle_like("alice", "2").await.unwrap();
        assert_eq!(seen.lock().len(), 2);
        assert!(matches!(seen.lock()[1], StoreEvent::LikeToggled { .. }));

        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.add_topic("Topic-7", "Food");
        assert_eq!(seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_viewer_liked_flag_on_load() {
        let store = loaded_store().await;
        store.toggle_like("alice", "2").await.unwrap();

        store.set_viewer(Some("bob".into()));
        store.initialize().await;
        assert!(!store.post("2").unwrap().liked);
        assert_eq!(store.post("2").unwrap().upvotes, 1);

        store.set_viewer(Some("alice".into()));
        store.initialize().await;
        assert!(store.post("2").unwrap().liked);
    }

    #[tokio::test]
    async fn test_update_post_mirrors_stored_counters() {
        let store = loaded_store().await;
        let stale = store.post("1").unwrap();

        store.toggle_like("alice", "1").await.unwrap();
        store.add_comment("1", "bob", "first").await.unwrap();

        let mut edited = stale;
        edited.title = "Edited".into();
        let stored = store.update_post(edited).await.unwrap();

        assert_eq!(stored.upvotes, 1);
        assert_eq!(stored.comment_count, 1);
        assert_eq!(store.post("1").unwrap(), stored);
        assert_eq!(store.post("1").unwrap().title, "Edited");
    }

    #[tokio::test]
    async fn test_anonymous_load_has_no_likes() {
        let store = loaded_store().await;
        store.set_viewer(Some("alice".into()));
        store.toggle_like("alice", "1").await.unwrap();
        assert!(store.post("1").unwrap().liked);

        store.change_viewer(None).await;
        assert!(!store.post("1").unwrap().liked);
        assert_eq!(store.post("1").unwrap().upvotes, 1);

        store.change_viewer(Some("alice".into())).await;
        assert!(store.post("1").unwrap().liked);
    }

    #[tokio::test]
    async fn test_derived_reads() {
        let store = loaded_store().await;
        store.toggle_like("alice", "2").await.unwrap();

        assert_eq!(store.grouped_by_topic(None).len(), 2);
        assert_eq!(store.posts_by_topic(2)[0].id, "2");
        assert_eq!(store.search("javascript").len(), 1);
    }
}
