//! Registration and login.
//!
//! Registration validates every field before touching storage and reports
//! all violations together. Login failures collapse "no such user" and
//! "wrong password" into [`KeeperError::InvalidCredentials`], so callers
//! cannot probe which logins exist.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::crypto::PasswordHasher;
use crate::entity::User;
use crate::error::{FieldErrors, KeeperError};
use crate::repository::UserRepository;
use crate::token::TokenService;

/// Field length requirements for registration, counted in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthPolicy {
    pub login_min_len: usize,
    pub password_min_len: usize,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            login_min_len: 3,
            password_min_len: 8,
        }
    }
}

/// Registers users and logs them in.
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    tokens: Arc<TokenService>,
    hasher: Arc<dyn PasswordHasher>,
    clock: Arc<dyn Clock>,
    policy: AuthPolicy,
}

impl AuthService {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserRepository>,
        tokens: Arc<TokenService>,
        hasher: Arc<dyn PasswordHasher>,
        clock: Arc<dyn Clock>,
        policy: AuthPolicy,
    ) -> Self {
        Self {
            users,
            tokens,
            hasher,
            clock,
            policy,
        }
    }

    /// Create a user and return a fresh bearer token for it.
    ///
    /// # Errors
    ///
    /// - [`KeeperError::Validation`] naming every field that is too short.
    /// - [`KeeperError::UserAlreadyExists`] if the login is taken.
    /// - [`KeeperError::Storage`] / [`KeeperError::Internal`] on backend or
    ///   hashing failure.
    pub async fn register(&self, login: &str, password: &str) -> Result<String, KeeperError> {
        self.validate(login, password)?;

        let password_hash = self.hash(password).await?;
        let user = User {
            id: Uuid::new_v4().to_string(),
            login: login.to_owned(),
            password_hash,
            created_at: self.clock.now(),
        };
        self.users.create(user.clone()).await?;
        info!(login = %user.login, user_id = %user.id, "user registered");

        self.tokens.issue(&user).await
    }

    /// Verify credentials and return a fresh bearer token.
    ///
    /// # Errors
    ///
    /// - [`KeeperError::InvalidCredentials`] if the login is unknown or the
    ///   password does not match.
    /// - [`KeeperError::Storage`] on backend failure.
    pub async fn login(&self, login: &str, password: &str) -> Result<String, KeeperError> {
        let user = match self.users.get_by_login(login).await {
            Ok(user) => user,
            Err(KeeperError::UserNotFound { .. }) => {
                warn!(login, "login attempt for unknown user");
                return Err(KeeperError::InvalidCredentials);
            }
            Err(e) => return Err(e),
        };

        if !self.verify(password, &user.password_hash).await? {
            warn!(login, "login attempt with wrong password");
            return Err(KeeperError::InvalidCredentials);
        }

        info!(login, "user logged in");
        self.tokens.issue(&user).await
    }

    fn validate(&self, login: &str, password: &str) -> Result<(), KeeperError> {
        let mut errors = FieldErrors::new();
        if login.chars().count() < self.policy.login_min_len {
            errors.push(
                "login",
                format!(
                    "length should be greater or equal {}",
                    self.policy.login_min_len
                ),
            );
        }
        if password.chars().count() < self.policy.password_min_len {
            errors.push(
                "password",
                format!(
                    "length should be greater or equal {}",
                    self.policy.password_min_len
                ),
            );
        }
        errors.into_result()
    }

    /// Argon2 is deliberately slow; keep it off the async workers.
    async fn hash(&self, password: &str) -> Result<String, KeeperError> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| KeeperError::Internal {
                reason: format!("password hashing task failed: {e}"),
            })?
    }

    async fn verify(&self, password: &str, hash: &str) -> Result<bool, KeeperError> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_owned();
        let hash = hash.to_owned();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| KeeperError::Internal {
                reason: format!("password verification task failed: {e}"),
            })
    }
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::clock::SystemClock;
    use crate::crypto::{Argon2Hasher, HashCost};
    use crate::error::ErrorKind;
    use crate::repository::Repositories;

    struct Fixture {
        auth: AuthService,
        tokens: Arc<TokenService>,
        repos: Repositories,
        hasher: Arc<Argon2Hasher>,
    }

    fn fixture() -> Fixture {
        let repos = Repositories::in_memory();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let hasher = Arc::new(
            Argon2Hasher::new(HashCost {
                memory_kib: 8,
                iterations: 1,
            })
            .unwrap(),
        );
        let tokens = Arc::new(TokenService::new(
            Arc::clone(&repos.users),
            Arc::clone(&repos.tokens),
            Arc::clone(&clock),
            Duration::hours(24),
        ));
        let auth = AuthService::new(
            Arc::clone(&repos.users),
            Arc::clone(&tokens),
            hasher.clone(),
            clock,
            AuthPolicy::default(),
        );
        Fixture {
            auth,
            tokens,
            repos,
            hasher,
        }
    }

    #[tokio::test]
    async fn register_returns_resolvable_token() {
        let f = fixture();
        let token = f.auth.register("alice", "password1").await.unwrap();
        let user = f.tokens.get_user(&token).await.unwrap();
        assert_eq!(user.login, "alice");
        assert_ne!(user.password_hash, "password1");
    }

    #[tokio::test]
    async fn register_reports_every_short_field() {
        let f = fixture();
        let err = f.auth.register("al", "short").await.unwrap_err();
        let KeeperError::Validation(fields) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert_eq!(fields.len(), 2);
        assert!(fields.contains("login"));
        assert!(fields.contains("password"));
        assert!(f.repos.users.get_by_login("al").await.is_err());
    }

    #[tokio::test]
    async fn register_reports_single_short_field() {
        let f = fixture();
        let err = f.auth.register("alice", "short").await.unwrap_err();
        let KeeperError::Validation(fields) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert_eq!(fields.len(), 1);
        assert!(fields.contains("password"));
    }

    #[tokio::test]
    async fn lengths_count_characters_not_bytes() {
        let f = fixture();
        // three characters, six bytes
        assert!(f.auth.register("äöü", "pässwörd").await.is_ok());
        let err = f.auth.register("äö", "password1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn duplicate_register_keeps_original_password() {
        let f = fixture();
        f.auth.register("alice", "password1").await.unwrap();
        let err = f.auth.register("alice", "password2").await.unwrap_err();
        assert!(matches!(err, KeeperError::UserAlreadyExists { .. }));

        let stored = f.repos.users.get_by_login("alice").await.unwrap();
        assert!(f.hasher.verify("password1", &stored.password_hash));
        assert!(!f.hasher.verify("password2", &stored.password_hash));
    }

    #[tokio::test]
    async fn login_issues_independent_tokens() {
        let f = fixture();
        let first = f.auth.register("alice", "password1").await.unwrap();
        let second = f.auth.login("alice", "password1").await.unwrap();
        assert_ne!(first, second);
        assert_eq!(f.tokens.get_user(&first).await.unwrap().login, "alice");
        assert_eq!(f.tokens.get_user(&second).await.unwrap().login, "alice");
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_login_look_the_same() {
        let f = fixture();
        f.auth.register("alice", "password1").await.unwrap();

        let wrong = f.auth.login("alice", "password2").await.unwrap_err();
        let unknown = f.auth.login("mallory", "password1").await.unwrap_err();
        assert!(matches!(wrong, KeeperError::InvalidCredentials));
        assert!(matches!(unknown, KeeperError::InvalidCredentials));
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn logins_are_case_sensitive() {
        let f = fixture();
        f.auth.register("alice", "password1").await.unwrap();
        assert!(f.auth.register("Alice", "password1").await.is_ok());
        assert!(matches!(
            f.auth.login("ALICE", "password1").await,
            Err(KeeperError::InvalidCredentials)
        ));
    }
}
