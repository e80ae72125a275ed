//! Persisted entities.
//!
//! Repositories own the stored copies; services hand them around by value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::encoding::base64_bytes;

/// A registered account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable identifier, used to partition items.
    pub id: String,
    /// Case-sensitive, globally unique login.
    pub login: String,
    /// Argon2id PHC string.
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("login", &self.login)
            .field("password_hash", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// A session record. The bearer value itself is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// SHA-256 of the bearer value, hex encoded.
    pub id: String,
    /// Login of the owning user.
    pub user_login: String,
    pub created_at: DateTime<Utc>,
}

/// One free-form key/value tag on an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub key: String,
    pub value: String,
}

/// A stored secret record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    /// Owning user's [`User::id`].
    pub user_id: String,
    /// Unique within the owner's namespace and immutable after creation.
    pub name: String,
    /// Client-defined type tag (`password`, `text`, `card`, `binary`).
    /// The server never interprets it.
    pub kind: String,
    /// Client-side ciphertext.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    pub metadata: Vec<Metadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The caller-controlled part of an item, as received from a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemDraft {
    pub name: String,
    pub kind: String,
    pub data: Vec<u8>,
    pub metadata: Vec<Metadata>,
}
