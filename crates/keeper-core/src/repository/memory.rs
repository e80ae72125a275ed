//! In-memory repositories.
//!
//! One map per entity kind, each behind its own `RwLock`. Nothing survives a
//! restart.

use std::collections::btree_map::Entry as ItemEntry;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;

use super::{ItemRepository, TokenRepository, UserRepository};
use crate::entity::{Item, Token, User};
use crate::error::KeeperError;

/// Users keyed by login.
#[derive(Debug, Default)]
pub struct MemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

impl MemoryUserRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create(&self, user: User) -> Result<(), KeeperError> {
        let mut users = self.users.write().await;
        match users.entry(user.login.clone()) {
            Entry::Occupied(_) => Err(KeeperError::UserAlreadyExists { login: user.login }),
            Entry::Vacant(slot) => {
                slot.insert(user);
                Ok(())
            }
        }
    }

    async fn get_by_login(&self, login: &str) -> Result<User, KeeperError> {
        let users = self.users.read().await;
        users
            .get(login)
            .cloned()
            .ok_or_else(|| KeeperError::UserNotFound {
                login: login.to_owned(),
            })
    }
}

/// Token records keyed by id.
#[derive(Debug, Default)]
pub struct MemoryTokenRepository {
    tokens: RwLock<HashMap<String, Token>>,
}

impl MemoryTokenRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TokenRepository for MemoryTokenRepository {
    async fn create(&self, token: Token) -> Result<(), KeeperError> {
        self.tokens.write().await.insert(token.id.clone(), token);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Token, KeeperError> {
        let tokens = self.tokens.read().await;
        tokens.get(id).cloned().ok_or(KeeperError::TokenNotFound)
    }

    async fn delete(&self, id: &str) -> Result<(), KeeperError> {
        self.tokens.write().await.remove(id);
        Ok(())
    }
}

/// Items as `user id -> name -> item`. Names are kept sorted per user.
#[derive(Debug, Default)]
pub struct MemoryItemRepository {
    items: RwLock<HashMap<String, BTreeMap<String, Item>>>,
}

impl MemoryItemRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ItemRepository for MemoryItemRepository {
    async fn create(&self, item: Item) -> Result<(), KeeperError> {
        let mut items = self.items.write().await;
        let owned = items.entry(item.user_id.clone()).or_default();
        match owned.entry(item.name.clone()) {
            ItemEntry::Occupied(_) => Err(KeeperError::ItemAlreadyExists { name: item.name }),
            ItemEntry::Vacant(slot) => {
                slot.insert(item);
                Ok(())
            }
        }
    }

    async fn update(&self, item: Item) -> Result<(), KeeperError> {
        let mut items = self.items.write().await;
        match items
            .get_mut(&item.user_id)
            .and_then(|owned| owned.get_mut(&item.name))
        {
            Some(stored) => {
                *stored = item;
                Ok(())
            }
            None => Err(KeeperError::ItemNotFound { name: item.name }),
        }
    }

    async fn get(&self, user_id: &str, name: &str) -> Result<Item, KeeperError> {
        let items = self.items.read().await;
        items
            .get(user_id)
            .and_then(|owned| owned.get(name))
            .cloned()
            .ok_or_else(|| KeeperError::ItemNotFound {
                name: name.to_owned(),
            })
    }

    async fn delete(&self, user_id: &str, name: &str) -> Result<(), KeeperError> {
        let mut items = self.items.write().await;
        items
            .get_mut(user_id)
            .and_then(|owned| owned.remove(name))
            .map(|_| ())
            .ok_or_else(|| KeeperError::ItemNotFound {
                name: name.to_owned(),
            })
    }

    async fn list(&self, user_id: &str) -> Result<Vec<String>, KeeperError> {
        let items = self.items.read().await;
        Ok(items
            .get(user_id)
            .map(|owned| owned.keys().cloned().collect())
            .unwrap_or_default())
    }
}
