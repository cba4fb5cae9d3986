//! # Credentials Module
//!
//! Password hashing and session tokens.
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        CREDENTIAL SERVICE                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Passwords (password.rs)                                                │
//! │  ───────────────────────                                                │
//! │  plain ──► Argon2id(19 MiB, 2 passes, 1 lane, random salt) ──► PHC str  │
//! │  verify(plain, PHC) ──► bool      (malformed hash ──► false)            │
//! │                                                                         │
//! │  Session tokens (token.rs)                                              │
//! │  ─────────────────────────                                              │
//! │  { username, email, iat, exp = iat + 24h }                              │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  base64url(header) . base64url(claims) . base64url(HMAC-SHA256)         │
//! │                                                                         │
//! │  verify ──► Some(claims) only if signature matches and not expired      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod password;
mod token;

pub use password::{hash_password, verify_password};
pub use token::{SessionClaims, TokenSigner, DEFAULT_TOKEN_SECRET, TOKEN_LIFETIME_SECS};
