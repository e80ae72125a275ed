//! Token service for Keeper.
//!
//! Bearer tokens are the only session mechanism. Each successful register or
//! login mints a new one; a user may hold any number at once.
//!
//! # Expiry
//!
//! Expiry is checked lazily at read time. A token resolves only while
//! `now - created_at < lifetime`. The first read past that point deletes the
//! record and fails with [`KeeperError::TokenExpired`]; every later read of
//! the same token fails with [`KeeperError::TokenNotFound`]. Tokens that are
//! never presented again stay in storage indefinitely.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::crypto::{generate_token, hash_token};
use crate::entity::{Token, User};
use crate::error::KeeperError;
use crate::repository::{TokenRepository, UserRepository};

/// Issues bearer tokens and resolves them back to users.
pub struct TokenService {
    users: Arc<dyn UserRepository>,
    tokens: Arc<dyn TokenRepository>,
    clock: Arc<dyn Clock>,
    lifetime: Duration,
}

impl TokenService {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserRepository>,
        tokens: Arc<dyn TokenRepository>,
        clock: Arc<dyn Clock>,
        lifetime: Duration,
    ) -> Self {
        Self {
            users,
            tokens,
            clock,
            lifetime,
        }
    }

    /// Mint a token for `user` and persist its hash.
    ///
    /// Returns the plaintext token. It is never stored.
    ///
    /// # Errors
    ///
    /// Returns [`KeeperError::Storage`] if the record cannot be persisted.
    pub async fn issue(&self, user: &User) -> Result<String, KeeperError> {
        let plaintext = generate_token();
        let record = Token {
            id: hash_token(&plaintext),
            user_login: user.login.clone(),
            created_at: self.clock.now(),
        };
        self.tokens.create(record).await?;
        info!(login = %user.login, "token issued");
        Ok(plaintext)
    }

    /// Resolve a bearer token to its owning user.
    ///
    /// # Errors
    ///
    /// - [`KeeperError::TokenNotFound`] if the token is unknown or was evicted.
    /// - [`KeeperError::TokenExpired`] if the token just outlived its lifetime.
    ///   The record is deleted as part of this call.
    /// - [`KeeperError::UserNotFound`] if the owning user no longer resolves.
    pub async fn get_user(&self, plaintext: &str) -> Result<User, KeeperError> {
        let id = hash_token(plaintext);
        let record = self.tokens.get(&id).await?;

        let age = self.clock.now() - record.created_at;
        if age >= self.lifetime {
            self.tokens.delete(&id).await?;
            debug!(login = %record.user_login, "expired token evicted");
            return Err(KeeperError::TokenExpired);
        }

        self.users.get_by_login(&record.user_login).await
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}
