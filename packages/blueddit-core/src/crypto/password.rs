//! Password hashing with Argon2id.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;

use crate::error::{Error, Result};

/// Fixed Argon2id cost parameters
const ARGON2_PARAMS: argon2::Params = match argon2::Params::new(
    19 * 1024, // 19 MiB memory cost
    2,         // 2 iterations
    1,         // 1 lane
    Some(32),  // 32-byte output length
) {
    Ok(params) => params,
    Err(_) => panic!("Invalid Argon2 parameters"),
};

fn argon2() -> Argon2<'static> {
    Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        ARGON2_PARAMS,
    )
}

/// Hash a password into a PHC string with a fresh random salt
pub fn hash_password(plain: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| Error::CredentialError(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

/// Check a password against a stored PHC string
///
/// A hash that does not parse verifies as `false`.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        tracing::warn!("Stored password hash is malformed");
        return false;
    };
    argon2().verify_password(plain.as_bytes(), &parsed).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("secret1").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("secret1", &hash));
        assert!(!verify_password("secret2", &hash));
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_hash_is_false() {
        assert!(!verify_password("secret1", "not-a-hash"));
        assert!(!verify_password("secret1", ""));
    }
}
