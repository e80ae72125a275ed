//! Object-storage repositories.
//!
//! Each entity is one JSON object:
//!
//! | Entity | Key |
//! |---|---|
//! | user | `users/<login>.json` |
//! | token | `tokens/<id>.json` |
//! | item | `items/<user id>/<name>.json` |
//!
//! Logins, user ids and names are percent-encoded so a `/` inside a name
//! cannot escape its partition. Listing a user's items is a prefix scan of
//! their partition.
//!
//! Creates use [`StorageBackend::put_if_absent`]. Updates and deletes check
//! for the object first and then write; that pair is not atomic, so an
//! update racing a delete of the same item may resurrect it.

use std::sync::Arc;

use keeper_storage::StorageBackend;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use super::{ItemRepository, TokenRepository, UserRepository};
use crate::entity::{Item, Token, User};
use crate::error::KeeperError;

const USERS: &str = "users/";
const TOKENS: &str = "tokens/";
const ITEMS: &str = "items/";
const SUFFIX: &str = ".json";

fn user_key(login: &str) -> String {
    format!("{USERS}{}{SUFFIX}", urlencoding::encode(login))
}

fn token_key(id: &str) -> String {
    format!("{TOKENS}{}{SUFFIX}", urlencoding::encode(id))
}

fn item_partition(user_id: &str) -> String {
    format!("{ITEMS}{}/", urlencoding::encode(user_id))
}

fn item_key(user_id: &str, name: &str) -> String {
    format!(
        "{}{}{SUFFIX}",
        item_partition(user_id),
        urlencoding::encode(name)
    )
}

/// Recover an item name from a key inside `partition`. Anything that does
/// not look like `<partition><encoded name>.json` is ignored.
fn item_name(partition: &str, key: &str) -> Option<String> {
    let encoded = key.strip_prefix(partition)?.strip_suffix(SUFFIX)?;
    if encoded.is_empty() || encoded.contains('/') {
        return None;
    }
    match urlencoding::decode(encoded) {
        Ok(name) => Some(name.into_owned()),
        Err(e) => {
            warn!(key, error = %e, "skipping object with undecodable item name");
            None
        }
    }
}

async fn load<T: DeserializeOwned>(
    backend: &dyn StorageBackend,
    key: &str,
) -> Result<Option<T>, KeeperError> {
    match backend.get(key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, KeeperError> {
    Ok(serde_json::to_vec(value)?)
}

/// Users stored as `users/<login>.json`.
pub struct ObjectUserRepository {
    backend: Arc<dyn StorageBackend>,
}

impl ObjectUserRepository {
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait::async_trait]
impl UserRepository for ObjectUserRepository {
    async fn create(&self, user: User) -> Result<(), KeeperError> {
        let bytes = encode(&user)?;
        if self
            .backend
            .put_if_absent(&user_key(&user.login), &bytes)
            .await?
        {
            Ok(())
        } else {
            Err(KeeperError::UserAlreadyExists { login: user.login })
        }
    }

    async fn get_by_login(&self, login: &str) -> Result<User, KeeperError> {
        load(&*self.backend, &user_key(login))
            .await?
            .ok_or_else(|| KeeperError::UserNotFound {
                login: login.to_owned(),
            })
    }
}

/// Token records stored as `tokens/<id>.json`.
pub struct ObjectTokenRepository {
    backend: Arc<dyn StorageBackend>,
}

impl ObjectTokenRepository {
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait::async_trait]
impl TokenRepository for ObjectTokenRepository {
    async fn create(&self, token: Token) -> Result<(), KeeperError> {
        let bytes = encode(&token)?;
        self.backend.put(&token_key(&token.id), &bytes).await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Token, KeeperError> {
        load(&*self.backend, &token_key(id))
            .await?
            .ok_or(KeeperError::TokenNotFound)
    }

    async fn delete(&self, id: &str) -> Result<(), KeeperError> {
        self.backend.delete(&token_key(id)).await?;
        Ok(())
    }
}

/// Items stored as `items/<user id>/<name>.json`.
pub struct ObjectItemRepository {
    backend: Arc<dyn StorageBackend>,
}

impl ObjectItemRepository {
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    async fn require(&self, key: &str, name: &str) -> Result<(), KeeperError> {
        if self.backend.exists(key).await? {
            Ok(())
        } else {
            Err(KeeperError::ItemNotFound {
                name: name.to_owned(),
            })
        }
    }
}

#[async_trait::async_trait]
impl ItemRepository for ObjectItemRepository {
    async fn create(&self, item: Item) -> Result<(), KeeperError> {
        let bytes = encode(&item)?;
        let key = item_key(&item.user_id, &item.name);
        if self.backend.put_if_absent(&key, &bytes).await? {
            Ok(())
        } else {
            Err(KeeperError::ItemAlreadyExists { name: item.name })
        }
    }

    async fn update(&self, item: Item) -> Result<(), KeeperError> {
        let key = item_key(&item.user_id, &item.name);
        self.require(&key, &item.name).await?;
        let bytes = encode(&item)?;
        self.backend.put(&key, &bytes).await?;
        Ok(())
    }

    async fn get(&self, user_id: &str, name: &str) -> Result<Item, KeeperError> {
        load(&*self.backend, &item_key(user_id, name))
            .await?
            .ok_or_else(|| KeeperError::ItemNotFound {
                name: name.to_owned(),
            })
    }

    async fn delete(&self, user_id: &str, name: &str) -> Result<(), KeeperError> {
        let key = item_key(user_id, name);
        self.require(&key, name).await?;
        self.backend.delete(&key).await?;
        Ok(())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<String>, KeeperError> {
        let partition = item_partition(user_id);
        let keys = self.backend.list(&partition).await?;
        let mut names: Vec<String> = keys
            .iter()
            .filter_map(|key| item_name(&partition, key))
            .collect();
        names.sort();
        Ok(names)
    }
}
