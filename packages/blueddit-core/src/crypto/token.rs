//! Compact HS256 session tokens.
//!
//! The wire form is the usual three base64url segments without padding:
//! `header.claims.signature`, where the signature is HMAC-SHA256 over
//! `header.claims`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{Error, Result};
use crate::time;

/// Built-in signing secret, used unless the configuration overrides it
pub const DEFAULT_TOKEN_SECRET: &str = "your-secret-key";

/// Token lifetime (24 hours)
pub const TOKEN_LIFETIME_SECS: i64 = 24 * 60 * 60;

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

type HmacSha256 = Hmac<Sha256>;

/// Claims carried by a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Signed-in username
    pub username: String,
    /// Email at issue time
    pub email: String,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expires at (Unix seconds)
    pub exp: i64,
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

/// Issues and checks session tokens with one shared secret
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").finish_non_exhaustive()
    }
}

impl Default for TokenSigner {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_SECRET)
    }
}

impl TokenSigner {
    /// Signer for `secret`
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| Error::CredentialError(format!("Invalid signing key: {}", e)))
    }

    /// Issue a token for `username` valid for 24 hours from now
    pub fn generate_token(&self, username: &str, email: &str) -> Result<String> {
        self.generate_token_at(username, email, time::now_timestamp())
    }

    /// Issue a token as if the current time were `now`
    pub fn generate_token_at(&self, username: &str, email: &str, now: i64) -> Result<String> {
        let claims = SessionClaims {
            username: username.to_string(),
            email: email.to_string(),
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };
        let payload = serde_json::to_vec(&claims)?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(HEADER),
            URL_SAFE_NO_PAD.encode(payload)
        );

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();

        Ok(format!(
            "{}.{}",
            signing_input,
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// Claims of a valid, unexpired token
    pub fn verify_token(&self, token: &str) -> Option<SessionClaims> {
        self.verify_token_at(token, time::now_timestamp())
    }

    /// Verify as if the current time were `now`
    pub fn verify_token_at(&self, token: &str, now: i64) -> Option<SessionClaims> {
        let (signing_input, signature) = token.rsplit_once('.')?;
        let (header, claims) = signing_input.split_once('.')?;
        if claims.contains('.') {
            return None;
        }

        let header: Header = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(header).ok()?).ok()?;
        if header.alg != "HS256" {
            return None;
        }

        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        let mut mac = self.mac().ok()?;
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&signature).ok()?;

        let claims: SessionClaims =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(claims).ok()?).ok()?;
        if claims.exp <= now {
            tracing::debug!(username = %claims.username, "Session token expired");
            return None;
        }
        Some(claims)
    }
}
