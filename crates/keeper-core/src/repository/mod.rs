//! Persistence contracts for users, tokens and items.
//!
//! Two interchangeable backends satisfy every contract with the same
//! semantics and the same errors:
//!
//! - [`memory`] keeps one map per entity kind behind its own `RwLock`.
//!   Existence checks and writes share a critical section, so creates are
//!   atomic.
//! - [`object`] stores each entity as one JSON object in a
//!   [`StorageBackend`]. Creates go through
//!   [`StorageBackend::put_if_absent`], which is only as atomic as the
//!   backend's conditional write.
//!
//! There are no cross-entity transactions in either backend.

pub mod memory;
pub mod object;

use std::sync::Arc;

use keeper_storage::StorageBackend;

use crate::entity::{Item, Token, User};
use crate::error::KeeperError;

/// Users, keyed by login.
#[async_trait::async_trait]
pub trait UserRepository: Send + Sync + 'static {
    /// Persist a new user.
    ///
    /// # Errors
    ///
    /// Returns [`KeeperError::UserAlreadyExists`] if the login is taken.
    async fn create(&self, user: User) -> Result<(), KeeperError>;

    /// Fetch a user by login.
    ///
    /// # Errors
    ///
    /// Returns [`KeeperError::UserNotFound`] if no such user exists.
    async fn get_by_login(&self, login: &str) -> Result<User, KeeperError>;
}

/// Token records, keyed by the hash of the bearer value.
#[async_trait::async_trait]
pub trait TokenRepository: Send + Sync + 'static {
    /// Persist a token record. Ids are digests of fresh random values, so
    /// an existing record under the same id is overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`KeeperError::Storage`] if persistence fails.
    async fn create(&self, token: Token) -> Result<(), KeeperError>;

    /// Fetch a token record by id.
    ///
    /// # Errors
    ///
    /// Returns [`KeeperError::TokenNotFound`] if no such record exists.
    async fn get(&self, id: &str) -> Result<Token, KeeperError>;

    /// Remove a token record. Removing a missing record is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`KeeperError::Storage`] if persistence fails.
    async fn delete(&self, id: &str) -> Result<(), KeeperError>;
}

/// Items, partitioned by owning user id and keyed by name.
#[async_trait::async_trait]
pub trait ItemRepository: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns [`KeeperError::ItemAlreadyExists`] if `(user_id, name)` is taken.
    async fn create(&self, item: Item) -> Result<(), KeeperError>;

    /// Replace the stored item with the same `(user_id, name)`.
    ///
    /// # Errors
    ///
    /// Returns [`KeeperError::ItemNotFound`] if there is nothing to replace.
    async fn update(&self, item: Item) -> Result<(), KeeperError>;

    /// # Errors
    ///
    /// Returns [`KeeperError::ItemNotFound`] if the item does not exist.
    async fn get(&self, user_id: &str, name: &str) -> Result<Item, KeeperError>;

    /// # Errors
    ///
    /// Returns [`KeeperError::ItemNotFound`] if the item does not exist.
    async fn delete(&self, user_id: &str, name: &str) -> Result<(), KeeperError>;

    /// Names of every item the user owns, sorted. Empty when there are none.
    ///
    /// # Errors
    ///
    /// Returns [`KeeperError::Storage`] if listing fails.
    async fn list(&self, user_id: &str) -> Result<Vec<String>, KeeperError>;
}

/// The three repositories a server instance runs against, chosen once at
/// startup.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub tokens: Arc<dyn TokenRepository>,
    pub items: Arc<dyn ItemRepository>,
}

impl Repositories {
    /// Volatile repositories that live in process memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(memory::MemoryUserRepository::new()),
            tokens: Arc::new(memory::MemoryTokenRepository::new()),
            items: Arc::new(memory::MemoryItemRepository::new()),
        }
    }

    /// Repositories that keep one object per entity in `backend`.
    #[must_use]
    pub fn object_store(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            users: Arc::new(object::ObjectUserRepository::new(Arc::clone(&backend))),
            tokens: Arc::new(object::ObjectTokenRepository::new(Arc::clone(&backend))),
            items: Arc::new(object::ObjectItemRepository::new(backend)),
        }
    }
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}
