//! # Error Handling
//!
//! Error types for Blueddit Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Initialization (100-199)                                          │
//! │  │   ├── DatabaseInitFailed    - Open or schema upgrade failed         │
//! │  │   ├── SchemaVersionTooNew   - Stored schema is newer than code      │
//! │  │   └── DatabaseClosed        - Handle was closed underneath caller   │
//! │  │                                                                      │
//! │  ├── Validation (200-299)                                              │
//! │  │   └── Validation            - Malformed input, list of reasons      │
//! │  │                                                                      │
//! │  ├── Conflict (300-399)                                                │
//! │  │   ├── UserExists            - Duplicate username or email           │
//! │  │   └── UsernameTaken         - Rename target already exists          │
//! │  │                                                                      │
//! │  ├── Not Found (400-499)                                               │
//! │  │   ├── UserNotFound                                                  │
//! │  │   └── PostNotFound                                                  │
//! │  │                                                                      │
//! │  ├── Auth (500-599)                                                    │
//! │  │   ├── IncorrectPassword     - Current password mismatch             │
//! │  │   └── NotAuthenticated      - No session for a user-scoped action   │
//! │  │                                                                      │
//! │  └── Storage (600-699)                                                 │
//! │      ├── WriteFailed           - "Failed to add post", ...             │
//! │      ├── RegistrationFailed                                            │
//! │      ├── ProfileUpdateFailed                                           │
//! │      ├── ConstraintViolation   - Unique/primary key violated           │
//! │      ├── DatabaseError         - Anything else from SQLite             │
//! │      └── CredentialError       - Hashing or signing failed             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Propagation
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      ERROR HANDLING FLOW                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Read path   : StorageError ──► logged ──► empty Vec / None / false    │
//! │  Write path  : StorageError ──► logged ──► WriteFailed { operation }   │
//! │  Validation  : surfaced as-is, reasons are user-displayable            │
//! │  Conflict    : surfaced as-is, message is user-displayable             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use thiserror::Error;

/// Result type alias for Blueddit Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// One rejected input field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Name of the offending field (`username`, `email`, ...)
    pub field: &'static str,
    /// Human-readable reason
    pub reason: String,
}

/// The full list of reasons an input was rejected
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    /// Record a failure for `field`
    pub fn push(&mut self, field: &'static str, reason: impl Into<String>) {
        self.0.push(FieldError {
            field,
            reason: reason.into(),
        });
    }

    /// No failures recorded
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `field` was rejected
    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    /// Iterate over the recorded failures
    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| format!("{}: {}", e.field, e.reason))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Coarse category of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, caught before touching storage
    Validation,
    /// Uniqueness violation
    Conflict,
    /// A required record is missing
    NotFound,
    /// Bad credentials or session token
    Auth,
    /// The embedded database failed
    Storage,
}

/// Main error type for Blueddit Core
#[derive(Error, Debug, Clone)]
pub enum Error {
    // ========================================================================
    // Initialization Errors (100-199)
    // ========================================================================

    /// The database could not be opened or its schema could not be upgraded
    #[error("Database initialization failed: {0}")]
    DatabaseInitFailed(String),

    /// The stored schema is newer than this build understands
    #[error("Database schema version {found} is newer than supported version {supported}")]
    SchemaVersionTooNew {
        /// Version recorded in the database
        found: u32,
        /// Highest version this build knows
        supported: u32,
    },

    /// The connection was closed (blocking upgrade, reset, termination)
    #[error("Database connection is closed")]
    DatabaseClosed,

    // ========================================================================
    // Validation Errors (200-299)
    // ========================================================================

    /// Input failed shape validation
    #[error("Invalid input: {0}")]
    Validation(ValidationErrors),

    // ========================================================================
    // Conflict Errors (300-399)
    // ========================================================================

    /// Registration hit a unique username or email
    #[error("Username or email already exists")]
    UserExists,

    /// Rename target is already in use
    #[error("Username already taken")]
    UsernameTaken,

    // ========================================================================
    // Not Found Errors (400-499)
    // ========================================================================

    /// No user with this username
    #[error("User not found")]
    UserNotFound,

    /// No post with this id
    #[error("Post not found: {0}")]
    PostNotFound(String),

    // ========================================================================
    // Auth Errors (500-599)
    // ========================================================================

    /// The current password supplied with a profile update did not match
    #[error("Current password is incorrect")]
    IncorrectPassword,

    /// The operation needs a signed-in user
    #[error("You must be logged in")]
    NotAuthenticated,

    // ========================================================================
    // Storage Errors (600-699)
    // ========================================================================

    /// A write was rejected by storage
    #[error("Failed to {operation}")]
    WriteFailed {
        /// What was attempted, e.g. `add post`
        operation: &'static str,
        /// Underlying cause, kept for logs
        reason: String,
    },

    /// Registration failed for a reason other than a conflict
    #[error("Registration failed")]
    RegistrationFailed(String),

    /// Profile update failed for a reason other than the typed ones
    #[error("Failed to update profile")]
    ProfileUpdateFailed(String),

    /// A unique or primary key constraint was violated
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Any other database failure
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Filesystem failure (database file, token slot)
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Hashing or signing failed
    #[error("Credential operation failed: {0}")]
    CredentialError(String),
}

impl Error {
    /// Shorthand for a write failure carrying its cause
    pub fn write_failed(operation: &'static str, cause: impl fmt::Display) -> Self {
        Error::WriteFailed {
            operation,
            reason: cause.to_string(),
        }
    }

    /// Get the numeric error code
    ///
    /// - 100-199: Initialization
    /// - 200-299: Validation
    /// - 300-399: Conflict
    /// - 400-499: Not found
    /// - 500-599: Auth
    /// - 600-699: Storage
    pub fn code(&self) -> i32 {
        match self {
            Error::DatabaseInitFailed(_) => 100,
            Error::SchemaVersionTooNew { .. } => 101,
            Error::DatabaseClosed => 102,

            Error::Validation(_) => 200,

            Error::UserExists => 300,
            Error::UsernameTaken => 301,

            Error::UserNotFound => 400,
            Error::PostNotFound(_) => 401,

            Error::IncorrectPassword => 501,
            Error::NotAuthenticated => 503,

            Error::WriteFailed { .. } => 600,
            Error::RegistrationFailed(_) => 601,
            Error::ProfileUpdateFailed(_) => 602,
            Error::ConstraintViolation(_) => 603,
            Error::DatabaseError(_) => 604,
            Error::Io(_) => 605,
            Error::SerializationError(_) => 606,
            Error::CredentialError(_) => 607,
        }
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self.code() {
            200..=299 => ErrorKind::Validation,
            300..=399 => ErrorKind::Conflict,
            400..=499 => ErrorKind::NotFound,
            500..=599 => ErrorKind::Auth,
            // Initialization failures surface as storage errors
            _ => ErrorKind::Storage,
        }
    }

    /// Whether the message can be shown to the user verbatim
    pub fn is_user_facing(&self) -> bool {
        match self.kind() {
            ErrorKind::Storage => matches!(
                self,
                Error::WriteFailed { .. }
                    | Error::RegistrationFailed(_)
                    | Error::ProfileUpdateFailed(_)
            ),
            _ => true,
        }
    }

    /// Whether this is a unique/primary key violation
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Error::ConstraintViolation(_))
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Error::ConstraintViolation(err.to_string())
            }
            other => Error::DatabaseError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<ValidationErrors> for Error {
    fn from(errors: ValidationErrors) -> Self {
        Error::Validation(errors)
    }
}

// ============================================================================
// TESTS
// ============================================================================
