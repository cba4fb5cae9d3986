//! # Session Context
//!
//! Holds the signed-in user for the running process and persists the session
//! token in a single named slot so a later start can restore it.
//!
//! ```text
//! startup ──► slot.load() ──► verify_session(token)
//!                                ├─ Some(user) ──► authenticated
//!                                └─ None       ──► slot.clear(), anonymous
//!
//! set_user(auth) ──► slot.store(token) ──► publish
//! logout()       ──► slot.clear()      ──► publish None
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::Result;
use crate::identity::{AuthenticatedUser, IdentityService};

/// Username reported when nobody is signed in
pub const ANONYMOUS_USERNAME: &str = "Unknown";

/// Persistent home for the last issued session token
pub trait TokenSlot: Send + Sync {
    /// The stored token, if any
    fn load(&self) -> Option<String>;

    /// Replace the stored token
    fn store(&self, token: &str) -> Result<()>;

    /// Forget the stored token
    fn clear(&self) -> Result<()>;
}

/// Token slot kept in memory only
#[derive(Debug, Default)]
pub struct MemoryTokenSlot {
    token: Mutex<Option<String>>,
}

impl MemoryTokenSlot {
    /// Empty slot
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenSlot for MemoryTokenSlot {
    fn load(&self) -> Option<String> {
        self.token.lock().clone()
    }

    fn store(&self, token: &str) -> Result<()> {
        *self.token.lock() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.token.lock().take();
        Ok(())
    }
}

/// Token slot backed by one file
///
/// Writes go to a `.tmp` sibling first and are renamed into place.
#[derive(Debug, Clone)]
pub struct FileTokenSlot {
    path: PathBuf,
}

impl FileTokenSlot {
    /// Slot stored at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File location
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenSlot for FileTokenSlot {
    fn load(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(token) => {
                let token = token.trim();
                (!token.is_empty()).then(|| token.to_string())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read session token");
                None
            }
        }
    }

    fn store(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, token)?;
        if let Err(e) = std::fs::rename(&tmp_path, &self.path) {
            tracing::error!(error = %e, "Failed to move session token into place");
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-wide authentication state
pub struct SessionContext {
    identity: Arc<IdentityService>,
    slot: Arc<dyn TokenSlot>,
    state: watch::Sender<Option<AuthenticatedUser>>,
}

impl SessionContext {
    /// Create an anonymous session; call [`init`](Self::init) to restore
    pub fn new(identity: Arc<IdentityService>, slot: Arc<dyn TokenSlot>) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            identity,
            slot,
            state,
        }
    }

    /// Restore the session from the token slot
    ///
    /// A stored token that no longer verifies is removed.
    pub async fn init(&self) -> Option<AuthenticatedUser> {
        let token = self.slot.load()?;

        match self.identity.verify_session(&token).await {
            Some(user) => {
                tracing::info!(username = %user.username, "Session restored");
                let auth = AuthenticatedUser { user, token };
                self.state.send_replace(Some(auth.clone()));
                Some(auth)
            }
            None => {
                tracing::warn!("Stored session token rejected, clearing");
                if let Err(e) = self.slot.clear() {
                    tracing::error!("Failed to clear session token: {}", e);
                }
                self.state.send_replace(None);
                None
            }
        }
    }

    /// Make `auth` the signed-in user and persist its token
    pub fn set_user(&self, auth: AuthenticatedUser) -> Result<()> {
        self.slot.store(&auth.token)?;
        self.state.send_replace(Some(auth));
        Ok(())
    }

    /// Sign out and forget the stored token
    pub fn logout(&self) -> Result<()> {
        self.state.send_replace(None);
        self.slot.clear()?;
        tracing::info!("Logged out");
        Ok(())
    }

    /// The signed-in user
    pub fn user(&self) -> Option<AuthenticatedUser> {
        self.state.borrow().clone()
    }

    /// Whether someone is signed in
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_some()
    }

    /// Signed-in username, or `"Unknown"`
    pub fn current_username(&self) -> String {
        self.state
            .borrow()
            .as_ref()
            .map(|a| a.user.username.clone())
            .unwrap_or_else(|| ANONYMOUS_USERNAME.to_string())
    }

    /// Watch for sign-in and sign-out
    pub fn subscribe(&self) -> watch::Receiver<Option<AuthenticatedUser>> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::TokenSigner;
    use crate::identity::{LoginCredentials, RegisterData};
    use crate::storage::{DatabaseConfig, StorageEngine};

    async fn identity_with_alice() -> Arc<IdentityService> {
        let engine = Arc::new(StorageEngine::new(DatabaseConfig::in_memory()));
        let identity = Arc::new(IdentityService::new(engine, TokenSigner::default()));
        identity
            .register(&RegisterData {
                username: "alice".into(),
                email: "alice@x.com".into(),
                password: "secret1".into(),
            })
            .await
            .unwrap();
        identity
    }

    async fn login_alice(identity: &IdentityService) -> AuthenticatedUser {
        identity
            .login(&LoginCredentials {
                username: "alice".into(),
                password: "secret1".into(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_anonymous_by_default() {
        let identity = identity_with_alice().await;
        let session = SessionContext::new(identity, Arc::new(MemoryTokenSlot::new()));
        assert!(session.init().await.is_none());
        assert!(!session.is_authenticated());
        assert_eq!(session.current_username(), "Unknown");
    }

    #[tokio::test]
    async fn test_restore_from_file_slot() {
        let dir = tempfile::tempdir().unwrap();
        let slot_path = dir.path().join("session").join("auth_token");
        let identity = identity_with_alice().await;

        let session = SessionContext::new(identity.clone(), Arc::new(FileTokenSlot::new(&slot_path)));
        let auth = login_alice(&identity).await;
        session.set_user(auth.clone()).unwrap();
        assert_eq!(session.current_username(), "alice");
        assert!(slot_path.exists());

        // A fresh context over the same slot picks the session back up.
        let restored = SessionContext::new(identity, Arc::new(FileTokenSlot::new(&slot_path)));
        assert_eq!(restored.init().await, Some(auth));
        assert!(restored.is_authenticated());
    }

    #[tokio::test]
    async fn test_invalid_token_is_cleared() {
        let identity = identity_with_alice().await;
        let slot = Arc::new(MemoryTokenSlot::new());
        slot.store("not.a.token").unwrap();

        let session = SessionContext::new(identity, slot.clone());
        assert!(session.init().await.is_none());
        assert!(slot.load().is_none());
    }

    #[tokio::test]
    async fn test_logout_publishes() {
        let identity = identity_with_alice().await;
        let slot = Arc::new(MemoryTokenSlot::new());
        let session = SessionContext::new(identity.clone(), slot.clone());
        let mut rx = session.subscribe();

        session.set_user(login_alice(&identity).await).unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_some());

        session.logout().unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
        assert!(slot.load().is_none());
    }

    #[test]
    fn test_file_slot_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let slot = FileTokenSlot::new(dir.path().join("none"));
        assert!(slot.load().is_none());
        slot.clear().unwrap();
    }
}
