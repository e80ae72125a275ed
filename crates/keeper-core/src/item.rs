//! Item service.
//!
//! Every operation takes the caller's user id, resolved by the auth stage,
//! and never an owner from the request body. Cross-user access is therefore
//! impossible by construction.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::entity::{Item, ItemDraft};
use crate::error::{FieldErrors, KeeperError};
use crate::repository::ItemRepository;

/// CRUD over a single user's items.
pub struct ItemService {
    items: Arc<dyn ItemRepository>,
    clock: Arc<dyn Clock>,
}

impl ItemService {
    #[must_use]
    pub fn new(items: Arc<dyn ItemRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { items, clock }
    }

    /// Store a new item under `user_id`.
    ///
    /// # Errors
    ///
    /// - [`KeeperError::Validation`] if the name is empty.
    /// - [`KeeperError::ItemAlreadyExists`] if the user already has an item
    ///   with this name.
    pub async fn create(&self, user_id: &str, draft: ItemDraft) -> Result<Item, KeeperError> {
        let mut errors = FieldErrors::new();
        if draft.name.is_empty() {
            errors.push("item.name", "length should be greater or equal 1");
        }
        errors.into_result()?;

        let now = self.clock.now();
        let item = Item {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_owned(),
            name: draft.name,
            kind: draft.kind,
            data: draft.data,
            metadata: draft.metadata,
            created_at: now,
            updated_at: now,
        };
        self.items.create(item.clone()).await?;
        info!(user_id, item = %item.name, "item created");
        Ok(item)
    }

    /// Replace the type, data and metadata of an existing item.
    ///
    /// Id, name, owner and creation time are carried over from the stored
    /// copy.
    ///
    /// # Errors
    ///
    /// Returns [`KeeperError::ItemNotFound`] if the user has no item with
    /// this name. Storage is left untouched in that case.
    pub async fn update(&self, user_id: &str, draft: ItemDraft) -> Result<Item, KeeperError> {
        let stored = self.items.get(user_id, &draft.name).await?;
        let item = Item {
            kind: draft.kind,
            data: draft.data,
            metadata: draft.metadata,
            updated_at: self.clock.now(),
            ..stored
        };
        self.items.update(item.clone()).await?;
        info!(user_id, item = %item.name, "item updated");
        Ok(item)
    }

    /// # Errors
    ///
    /// Returns [`KeeperError::ItemNotFound`] if the user has no such item.
    pub async fn get(&self, user_id: &str, name: &str) -> Result<Item, KeeperError> {
        self.items.get(user_id, name).await
    }

    /// # Errors
    ///
    /// Returns [`KeeperError::ItemNotFound`] if the user has no such item.
    pub async fn delete(&self, user_id: &str, name: &str) -> Result<(), KeeperError> {
        self.items.delete(user_id, name).await?;
        info!(user_id, item = name, "item deleted");
        Ok(())
    }

    /// Sorted names of the user's items; empty if there are none.
    ///
    /// # Errors
    ///
    /// Returns [`KeeperError::Storage`] if listing fails.
    pub async fn list(&self, user_id: &str) -> Result<Vec<String>, KeeperError> {
        self.items.list(user_id).await
    }
}

impl std::fmt::Debug for ItemService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemService").finish_non_exhaustive()
    }
}
