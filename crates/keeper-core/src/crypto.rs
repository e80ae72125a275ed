//! Password hashing and bearer token primitives.
//!
//! # Security model
//!
//! - Passwords are hashed with Argon2id and a fresh 16-byte random salt.
//!   The PHC string records its own parameters, so verification keeps
//!   working after the configured cost changes.
//! - Bearer tokens are `kpr_` followed by 128 bits of UUID v4 randomness.
//! - Only `SHA-256(token)` is persisted. A storage dump yields no usable
//!   bearer values.

use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use sha2::{Digest, Sha256};

use crate::error::KeeperError;

/// Prefix for every issued bearer token.
pub const TOKEN_PREFIX: &str = "kpr_";

const SALT_LEN: usize = 16;

/// One-way, salted password hashing.
pub trait PasswordHasher: Send + Sync + 'static {
    /// Hash `password` into a self-describing string.
    ///
    /// # Errors
    ///
    /// Returns [`KeeperError::Internal`] if hashing fails.
    fn hash(&self, password: &str) -> Result<String, KeeperError>;

    /// Whether `password` matches `hash`. A malformed hash never matches.
    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
}

impl Default for HashCost {
    /// OWASP's baseline Argon2id recommendation.
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
        }
    }
}

/// [`PasswordHasher`] backed by Argon2id.
#[derive(Debug, Clone)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    /// Build a hasher with the given cost.
    ///
    /// # Errors
    ///
    /// Returns [`KeeperError::Internal`] if Argon2 rejects the parameters.
    pub fn new(cost: HashCost) -> Result<Self, KeeperError> {
        let params = Params::new(cost.memory_kib, cost.iterations, 1, None).map_err(|e| {
            KeeperError::Internal {
                reason: format!("invalid argon2 parameters: {e}"),
            }
        })?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> Result<String, KeeperError> {
        let salt_bytes: [u8; SALT_LEN] = rand::random();
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| KeeperError::Internal {
            reason: format!("salt encoding failed: {e}"),
        })?;
        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| KeeperError::Internal {
                reason: format!("password hashing failed: {e}"),
            })?;
        Ok(hash.to_string())
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        self.argon2()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

/// Generate a fresh bearer token.
pub fn generate_token() -> String {
    format!("{TOKEN_PREFIX}{}", uuid::Uuid::new_v4().simple())
}

/// Hash a bearer token with SHA-256 (hex-encoded). The digest is the token
/// record's identifier.
pub fn hash_token(plaintext: &str) -> String {
    let digest = Sha256::digest(plaintext.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cheap() -> Argon2Hasher {
        Argon2Hasher::new(HashCost {
            memory_kib: 8,
            iterations: 1,
        })
        .unwrap()
    }

    #[test]
    fn hash_verifies_original_password_only() {
        let hasher = cheap();
        let hash = hasher.hash("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("correct horse", &hash));
        assert!(!hasher.verify("battery staple", &hash));
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let hasher = cheap();
        assert_ne!(hasher.hash("pw").unwrap(), hasher.hash("pw").unwrap());
    }

    #[test]
    fn verification_reads_cost_from_hash() {
        let hash = cheap().hash("pw").unwrap();
        let stronger = Argon2Hasher::new(HashCost {
            memory_kib: 16,
            iterations: 2,
        })
        .unwrap();
        assert!(stronger.verify("pw", &hash));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!cheap().verify("pw", "not-a-phc-string"));
    }

    #[test]
    fn zero_memory_cost_is_rejected() {
        let result = Argon2Hasher::new(HashCost {
            memory_kib: 0,
            iterations: 1,
        });
        assert!(matches!(result, Err(KeeperError::Internal { .. })));
    }

    #[test]
    fn tokens_are_prefixed_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert!(a.starts_with(TOKEN_PREFIX));
        assert_eq!(a.len(), TOKEN_PREFIX.len() + 32);
        assert_ne!(a, b);
    }

    #[test]
    fn token_hash_is_stable_hex() {
        let h = hash_token("kpr_abc");
        assert_eq!(h.len(), 64);
        assert_eq!(h, hash_token("kpr_abc"));
        assert_ne!(h, hash_token("kpr_abd"));
    }
}
