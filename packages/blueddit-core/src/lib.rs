//! # Blueddit Core
//!
//! Local-first persistence, identity and state for the Blueddit forum client.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         BLUEDDIT CORE                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │                      Presentation layer                                 │
//! │                              │                                          │
//! │                              ▼                                          │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                        Blueddit (facade)                        │    │
//! │  └───────┬───────────────────────┬───────────────────────┬─────────┘    │
//! │          │                       │                       │              │
//! │          ▼                       ▼                       ▼              │
//! │  ┌───────────────┐      ┌────────────────┐      ┌────────────────┐      │
//! │  │  ForumStore   │      │ SessionContext │      │IdentityService │      │
//! │  │  (mirror +    │      │ (current user, │─────►│ (register,     │      │
//! │  │   events)     │      │  token slot)   │      │  login, ...)   │      │
//! │  └───────┬───────┘      └────────────────┘      └───────┬────────┘      │
//! │          │ PostStorage                                  │ UserStorage   │
//! │          ▼                                              ▼               │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                 StorageEngine ──► SQLite (schema v5)            │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`storage`] - Embedded database, schema upgrades, storage engine
//! - [`crypto`] - Password hashing and session tokens
//! - [`identity`] - Registration, login, profile updates
//! - [`store`] - In-memory forum state with change notification
//! - [`session`] - Signed-in user and token persistence
//! - [`config`] - Runtime configuration

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod session;
pub mod storage;
pub mod store;
/// Clock helpers and time-derived ids.
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use config::BluedditConfig;
pub use error::{Error, ErrorKind, Result};
pub use identity::{
    AuthenticatedUser, IdentityService, LoginCredentials, PublicUser, RegisterData,
    UpdateProfileData,
};
pub use session::{FileTokenSlot, MemoryTokenSlot, SessionContext, TokenSlot};
pub use storage::{Comment, DatabaseConfig, Post, StorageEngine, Topic};
pub use store::{ForumStore, NewPost, StoreEvent, SubscriptionId};

// ============================================================================
// CORE INSTANCE
// ============================================================================

use std::sync::Arc;

use crypto::TokenSigner;

/// Everything the presentation layer talks to, wired together
///
/// ## Lifecycle
///
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                       BLUEDDIT LIFECYCLE                                │
/// ├─────────────────────────────────────────────────────────────────────────┤
/// │                                                                         │
/// │  1. Blueddit::new(config)     ──► nothing opened yet                    │
/// │  2. restore_session()         ──► stored token ──► signed-in user       │
/// │  3. initialize_store()        ──► database opened, schema upgraded,     │
/// │                                   posts / comments / topics mirrored    │
/// │  4. add_post, toggle_like, add_comment, login, update_profile, ...      │
/// │                                                                         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub struct Blueddit {
    engine: Arc<StorageEngine>,
    identity: Arc<IdentityService>,
    store: Arc<ForumStore>,
    session: Arc<SessionContext>,
}

impl Blueddit {
    /// Wire up all services from `config`
    pub fn new(config: BluedditConfig) -> Self {
        let engine = Arc::new(StorageEngine::new(config.database.clone()));

        let signer = match &config.token_secret {
            Some(secret) => TokenSigner::new(secret),
            None => TokenSigner::default(),
        };
        let identity = Arc::new(IdentityService::new(engine.clone(), signer));

        let slot: Arc<dyn TokenSlot> = match &config.session_token_path {
            Some(path) => Arc::new(FileTokenSlot::new(path)),
            None => Arc::new(MemoryTokenSlot::new()),
        };
        let session = Arc::new(SessionContext::new(identity.clone(), slot));
        let store = Arc::new(ForumStore::new(engine.clone()));

        tracing::debug!(
            database = ?config.database.path,
            session = ?config.session_token_path,
            "Blueddit core created"
        );

        Self {
            engine,
            identity,
            store,
            session,
        }
    }

    /// The storage engine
    pub fn engine(&self) -> &Arc<StorageEngine> {
        &self.engine
    }

    /// The identity service
    pub fn identity(&self) -> &Arc<IdentityService> {
        &self.identity
    }

    /// The forum store
    pub fn store(&self) -> &Arc<ForumStore> {
        &self.store
    }

    /// The session context
    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    fn require_user(&self) -> Result<String> {
        self.session
            .user()
            .map(|auth| auth.user.username)
            .ok_or(Error::NotAuthenticated)
    }

    // ========================================================================
    // SESSION
    // ========================================================================

    /// Restore the stored session, if its token still verifies
    pub async fn restore_session(&self) -> Option<AuthenticatedUser> {
        let auth = self.session.init().await;
        self.store
            .change_viewer(auth.as_ref().map(|a| a.user.username.clone()))
            .await;
        auth
    }

    /// Sign in; `None` for unknown user or wrong password
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<Option<AuthenticatedUser>> {
        let Some(auth) = self.identity.login(credentials).await else {
            return Ok(None);
        };
        self.session.set_user(auth.clone())?;
        self.store
            .change_viewer(Some(auth.user.username.clone()))
            .await;
        Ok(Some(auth))
    }

    /// Create an account (does not sign in)
    pub async fn register(&self, data: &RegisterData) -> Result<()> {
        self.identity.register(data).await
    }

    /// Update the signed-in user's profile and switch the session to the
    /// returned identity
    pub async fn update_profile(&self, data: &UpdateProfileData) -> Result<AuthenticatedUser> {
        let auth = self.identity.update_profile(data).await?;
        self.session.set_user(auth.clone())?;
        self.store
            .change_viewer(Some(auth.user.username.clone()))
            .await;
        Ok(auth)
    }

    /// Resolve a token to its user
    pub async fn verify_session(&self, token: &str) -> Option<PublicUser> {
        self.identity.verify_session(token).await
    }

    /// Sign out; the mirror reloads without anyone's likes
    pub async fn logout(&self) -> Result<()> {
        self.session.logout()?;
        self.store.change_viewer(None).await;
        Ok(())
    }

    /// Signed-in username, or `"Unknown"`
    pub fn current_username(&self) -> String {
        self.session.current_username()
    }

    // ========================================================================
    // FORUM
    // ========================================================================

    /// Load the mirror from storage
    pub async fn initialize_store(&self) {
        self.store.initialize().await;
    }

    /// Mirrored posts, newest first
    pub fn posts(&self) -> Vec<Post> {
        self.store.posts()
    }

    /// Mirrored comments on a post
    pub fn comments(&self, post_id: &str) -> Vec<Comment> {
        self.store.comments_for(post_id)
    }

    /// Create a post as the signed-in user
    pub async fn add_post(&self, post: NewPost) -> Result<Post> {
        let author = self.require_user()?;
        self.store.add_post(post, &author).await
    }

    /// Save an edited post; returns the stored record
    pub async fn update_post(&self, post: Post) -> Result<Post> {
        self.store.update_post(post).await
    }

    /// Comment as the current user (`"Unknown"` when signed out)
    pub async fn add_comment(&self, post_id: &str, content: &str) -> Result<Comment> {
        let author = self.current_username();
        self.store.add_comment(post_id, &author, content).await
    }

    /// Flip the signed-in user's like on a post
    pub async fn toggle_like(&self, post_id: &str) -> Result<Post> {
        let user = self.require_user()?;
        self.store
            .toggle_like(&user, post_id)
            .await?
            .ok_or_else(|| Error::PostNotFound(post_id.to_string()))
    }

    /// Add an in-memory topic
    pub fn add_topic(&self, name: &str, description: &str) -> Topic {
        self.store.add_topic(name, description)
    }

    /// Wipe the database and reload the mirror
    pub async fn reset_database(&self) -> Result<()> {
        self.engine.reset_database().await?;
        self.store.initialize().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> RegisterData {
        RegisterData {
            username: "alice".into(),
            email: "alice@x.com".into(),
            password: "secret1".into(),
        }
    }

    fn credentials() -> LoginCredentials {
        LoginCredentials {
            username: "alice".into(),
            password: "secret1".into(),
        }
    }

    fn new_post() -> NewPost {
        NewPost {
            title: "Hi".into(),
            content: "First".into(),
            image_url: String::new(),
            topic: storage::schema::starter_topics()[0].clone(),
        }
    }

    #[tokio::test]
    async fn test_writes_need_a_session() {
        let app = Blueddit::new(BluedditConfig::default());
        app.initialize_store().await;

        assert!(matches!(app.add_post(new_post()).await, Err(Error::NotAuthenticated)));
        assert!(matches!(app.toggle_like("1").await, Err(Error::NotAuthenticated)));

        let comment = app.add_comment("1", "anon").await.unwrap();
        assert_eq!(comment.author, "Unknown");
    }

    #[tokio::test]
    async fn test_login_then_post() {
        let app = Blueddit::new(BluedditConfig::default());
        app.initialize_store().await;
        app.register(&alice()).await.unwrap();

        assert!(app.login(&credentials()).await.unwrap().is_some());
        assert_eq!(app.current_username(), "alice");

        let post = app.add_post(new_post()).await.unwrap();
        assert_eq!(post.author, "alice");
        assert_eq!(app.posts().len(), 3);

        app.logout().await.unwrap();
        assert_eq!(app.current_username(), "Unknown");
    }

    #[tokio::test]
    async fn test_logout_clears_liked_flags() {
        let app = Blueddit::new(BluedditConfig::default());
        app.initialize_store().await;
        app.register(&alice()).await.unwrap();
        app.login(&credentials()).await.unwrap();

        assert!(app.toggle_like("1").await.unwrap().liked);
        assert!(app.posts().iter().find(|p| p.id == "1").unwrap().liked);

        app.logout().await.unwrap();
        let post = app.posts().into_iter().find(|p| p.id == "1").unwrap();
        assert!(!post.liked);
        assert_eq!(post.upvotes, 1);

        // Signing back in brings the like back.
        app.login(&credentials()).await.unwrap();
        assert!(app.posts().iter().find(|p| p.id == "1").unwrap().liked);
    }

    #[tokio::test]
    async fn test_like_missing_post() {
        let app = Blueddit::new(BluedditConfig::default());
        app.register(&alice()).await.unwrap();
        app.login(&credentials()).await.unwrap();

        let err = app.toggle_like("404").await.unwrap_err();
        assert!(matches!(err, Error::PostNotFound(ref id) if id == "404"));
    }

    #[tokio::test]
    async fn test_custom_secret() {
        let app = Blueddit::new(BluedditConfig {
            token_secret: Some("another-secret".into()),
            ..BluedditConfig::default()
        });
        app.register(&alice()).await.unwrap();
        let auth = app.login(&credentials()).await.unwrap().unwrap();

        assert!(app.verify_session(&auth.token).await.is_some());
        assert!(TokenSigner::default().verify_token(&auth.token).is_none());
    }

    #[tokio::test]
    async fn test_reset_database_reloads_store() {
        let app = Blueddit::new(BluedditConfig::default());
        app.initialize_store().await;
        app.register(&alice()).await.unwrap();
        app.login(&credentials()).await.unwrap();
        app.add_post(new_post()).await.unwrap();

        app.reset_database().await.unwrap();
        assert_eq!(app.posts().len(), 2);
    }
}
