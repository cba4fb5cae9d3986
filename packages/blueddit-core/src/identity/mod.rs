//! # Identity Module
//!
//! Account registration, login, profile updates and session verification.
//!
//! ## Flows
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          IDENTITY FLOWS                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  register(data)                                                         │
//! │    validate ──► hash password ──► insert user                           │
//! │                                    ├─ unique violation ─► UserExists    │
//! │                                    └─ other failure ────► Registration  │
//! │                                                           Failed        │
//! │                                                                         │
//! │  login(username, password)                                              │
//! │    load user ──► verify hash ──► PublicUser + fresh token               │
//! │    (missing user, wrong password and storage errors all give None)      │
//! │                                                                         │
//! │  update_profile(data)                                                   │
//! │    validate ──► load current ──► verify current password               │
//! │       ──► renaming? check target free ──► build record                  │
//! │       ──► rename: delete old + insert new (one transaction)             │
//! │           else:   replace in place                                      │
//! │       ──► PublicUser + fresh token                                      │
//! │                                                                         │
//! │  verify_session(token) ──► claims ──► stored user ──► PublicUser        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod validation;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::crypto::{hash_password, verify_password, TokenSigner};
use crate::error::{Error, Result};
use crate::storage::{User, UserStorage};
use crate::time;

/// Login form input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCredentials {
    /// Account name
    pub username: String,
    /// Plain-text password
    pub password: String,
}

/// Registration form input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterData {
    /// 3 to 20 characters
    pub username: String,
    /// Must be well-formed and unused
    pub email: String,
    /// At least 6 characters
    pub password: String,
}

/// Profile form input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileData {
    /// Username the caller is signed in as
    pub current_username: String,
    /// Desired username; differs from `current_username` for a rename
    pub username: String,
    /// Desired email
    pub email: String,
    /// Must match the stored password
    pub current_password: String,
    /// Replacement password; `None` or empty keeps the current one
    #[serde(default)]
    pub new_password: Option<String>,
}

/// A user as the presentation layer sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    /// Account name
    pub username: String,
    /// Account email
    pub email: String,
    /// RFC 3339 registration time
    pub created_at: String,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            email: user.email.clone(),
            created_at: user.created_at.clone(),
        }
    }
}

/// A signed-in user with their session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    /// The user, flattened into the same JSON object
    #[serde(flatten)]
    pub user: PublicUser,
    /// Signed session token
    pub token: String,
}

/// Account operations over a [`UserStorage`]
pub struct IdentityService {
    storage: Arc<dyn UserStorage>,
    signer: TokenSigner,
}

impl IdentityService {
    /// Create a service over `storage`, signing tokens with `signer`
    pub fn new(storage: Arc<dyn UserStorage>, signer: TokenSigner) -> Self {
        Self { storage, signer }
    }

    /// The token signer in use
    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    fn authenticate(&self, user: &User) -> Result<AuthenticatedUser> {
        let token = self.signer.generate_token(&user.username, &user.email)?;
        Ok(AuthenticatedUser {
            user: PublicUser::from(user),
            token,
        })
    }

    /// Check credentials and issue a token
    ///
    /// Unknown user and wrong password both return `None`.
    pub async fn login(&self, credentials: &LoginCredentials) -> Option<AuthenticatedUser> {
        let user = match self.storage.get_user(&credentials.username).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::debug!("Login for unknown user");
                return None;
            }
            Err(e) => {
                tracing::error!("Login failed: {}", e);
                return None;
            }
        };

        if !verify_password(&credentials.password, &user.password_hash) {
            tracing::debug!(username = %user.username, "Login with wrong password");
            return None;
        }

        match self.authenticate(&user) {
            Ok(authenticated) => {
                tracing::info!(username = %user.username, "User logged in");
                Some(authenticated)
            }
            Err(e) => {
                tracing::error!("Login failed: {}", e);
                None
            }
        }
    }

    /// Create an account
    pub async fn register(&self, data: &RegisterData) -> Result<()> {
        let valid = validation::validate_registration(data)?;

        let password_hash = hash_password(&valid.password).map_err(|e| {
            tracing::error!("Registration failed: {}", e);
            Error::RegistrationFailed(e.to_string())
        })?;

        let user = User {
            username: valid.username,
            email: valid.email,
            password_hash,
            created_at: time::now_rfc3339(),
        };

        match self.storage.add_user(&user).await {
            Ok(()) => {
                tracing::info!(username = %user.username, "User registered");
                Ok(())
            }
            Err(e) if e.is_constraint_violation() => Err(Error::UserExists),
            Err(e) => Err(Error::RegistrationFailed(e.to_string())),
        }
    }

    /// Change username, email and/or password
    ///
    /// Returns the updated user with a token issued for the new identity.
    pub async fn update_profile(&self, data: &UpdateProfileData) -> Result<AuthenticatedUser> {
        let valid = validation::validate_profile_update(data)?;

        let current = self
            .storage
            .get_user(&valid.current_username)
            .await
            .map_err(|e| Error::ProfileUpdateFailed(e.to_string()))?
            .ok_or(Error::UserNotFound)?;

        if !verify_password(&valid.current_password, &current.password_hash) {
            return Err(Error::IncorrectPassword);
        }

        if valid.is_rename() {
            let taken = self
                .storage
                .get_user(&valid.username)
                .await
                .map_err(|e| Error::ProfileUpdateFailed(e.to_string()))?;
            if taken.is_some() {
                return Err(Error::UsernameTaken);
            }
        }

        let password_hash = match &valid.new_password {
            Some(p) => hash_password(p).map_err(|e| Error::ProfileUpdateFailed(e.to_string()))?,
            None => current.password_hash.clone(),
        };

        let updated = User {
            username: valid.username.clone(),
            email: valid.email.clone(),
            password_hash,
            created_at: current.created_at.clone(),
        };

        let write = if valid.is_rename() {
            self.storage.rename_user(&current.username, &updated).await
        } else {
            self.storage.put_user(&updated).await
        };

        match write {
            Ok(()) => {}
            // Email collides with another account, or the rename target was
            // taken between the check and the write.
            Err(e) if e.is_constraint_violation() => {
                return Err(if valid.is_rename() && self.username_exists(&updated.username).await {
                    Error::UsernameTaken
                } else {
                    Error::UserExists
                });
            }
            Err(e) => return Err(Error::ProfileUpdateFailed(e.to_string())),
        }

        tracing::info!(
            from = %current.username,
            to = %updated.username,
            "Profile updated"
        );

        self.authenticate(&updated)
            .map_err(|e| Error::ProfileUpdateFailed(e.to_string()))
    }

    async fn username_exists(&self, username: &str) -> bool {
        matches!(self.storage.get_user(username).await, Ok(Some(_)))
    }

    /// Resolve a token to its stored user
    ///
    /// `None` for an invalid or expired token, or when the account no longer
    /// exists.
    pub async fn verify_session(&self, token: &str) -> Option<PublicUser> {
        let claims = self.signer.verify_token(token)?;
        match self.storage.get_user(&claims.username).await {
            Ok(Some(user)) => Some(PublicUser::from(&user)),
            Ok(None) => {
                tracing::warn!(username = %claims.username, "Session for missing user");
                None
            }
            Err(e) => {
                tracing::error!("Session verification failed: {}", e);
                None
            }
        }
    }
}
