//! Runtime configuration.

use std::path::PathBuf;

use crate::storage::DatabaseConfig;

/// Environment variable for the database file
pub const ENV_DB_PATH: &str = "BLUEDDIT_DB_PATH";
/// Environment variable for the token signing secret
pub const ENV_TOKEN_SECRET: &str = "BLUEDDIT_TOKEN_SECRET";
/// Environment variable for the session token file
pub const ENV_SESSION_PATH: &str = "BLUEDDIT_SESSION_PATH";

/// Configuration for a [`Blueddit`](crate::Blueddit) instance
///
/// The default is fully in-memory: nothing touches the filesystem and the
/// built-in token secret is used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BluedditConfig {
    /// Embedded database location
    pub database: DatabaseConfig,
    /// Token signing secret; `None` uses the built-in one
    pub token_secret: Option<String>,
    /// File holding the session token; `None` keeps it in memory
    pub session_token_path: Option<PathBuf>,
}

impl BluedditConfig {
    /// Read configuration from `BLUEDDIT_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            database: DatabaseConfig {
                path: get(ENV_DB_PATH).map(PathBuf::from),
            },
            token_secret: get(ENV_TOKEN_SECRET),
            session_token_path: get(ENV_SESSION_PATH).map(PathBuf::from),
        }
    }
}
