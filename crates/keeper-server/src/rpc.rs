//! The `keeper.KeeperService` call surface.
//!
//! | Method | Request body | Reply body | Token |
//! |---|---|---|---|
//! | `Register` | `{login, password}` | `{token}` | no |
//! | `Login` | `{login, password}` | `{token}` | no |
//! | `CreateItem` | `{item}` | `{}` | yes |
//! | `UpdateItem` | `{item}` | `{}` | yes |
//! | `GetItem` | `{name}` | `{item}` | yes |
//! | `DeleteItem` | `{name}` | `{}` | yes |
//! | `ListItems` | empty | `{names}` | yes |
//!
//! Item payloads travel as base64 inside JSON.

use std::fmt;

use axum::Json;
use axum::response::{IntoResponse, Response};
use keeper_core::encoding::base64_bytes;
use keeper_core::{Item, ItemDraft, Metadata};
use serde::{Deserialize, Serialize};

/// Fully-qualified service name used as the route prefix.
pub const SERVICE: &str = "keeper.KeeperService";

/// One remote method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Register,
    Login,
    CreateItem,
    UpdateItem,
    GetItem,
    DeleteItem,
    ListItems,
}

impl Method {
    pub const ALL: [Self; 7] = [
        Self::Register,
        Self::Login,
        Self::CreateItem,
        Self::UpdateItem,
        Self::GetItem,
        Self::DeleteItem,
        Self::ListItems,
    ];

    /// Short method name, e.g. `GetItem`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Register => "Register",
            Self::Login => "Login",
            Self::CreateItem => "CreateItem",
            Self::UpdateItem => "UpdateItem",
            Self::GetItem => "GetItem",
            Self::DeleteItem => "DeleteItem",
            Self::ListItems => "ListItems",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }

    /// Methods callable without a bearer token.
    pub fn public() -> impl Iterator<Item = Self> {
        [Self::Register, Self::Login].into_iter()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{SERVICE}/{}", self.name())
    }
}

/// Login and password, as sent to `Register` and `Login`.
#[derive(Clone, Deserialize, Serialize)]
pub struct CredentialsRequest {
    pub login: String,
    pub password: String,
}

impl fmt::Debug for CredentialsRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsRequest")
            .field("login", &self.login)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// An item as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ItemMessage {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    #[serde(default)]
    pub metadata: Vec<Metadata>,
}

impl From<ItemMessage> for ItemDraft {
    fn from(msg: ItemMessage) -> Self {
        Self {
            name: msg.name,
            kind: msg.kind,
            data: msg.data,
            metadata: msg.metadata,
        }
    }
}

impl From<Item> for ItemMessage {
    fn from(item: Item) -> Self {
        Self {
            name: item.name,
            kind: item.kind,
            data: item.data,
            metadata: item.metadata,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ItemRequest {
    pub item: ItemMessage,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NameRequest {
    pub name: String,
}

/// A decoded inbound call.
#[derive(Debug, Clone)]
pub enum Call {
    Register(CredentialsRequest),
    Login(CredentialsRequest),
    CreateItem(ItemRequest),
    UpdateItem(ItemRequest),
    GetItem(NameRequest),
    DeleteItem(NameRequest),
    ListItems,
}

impl Call {
    pub fn method(&self) -> Method {
        match self {
            Self::Register(_) => Method::Register,
            Self::Login(_) => Method::Login,
            Self::CreateItem(_) => Method::CreateItem,
            Self::UpdateItem(_) => Method::UpdateItem,
            Self::GetItem(_) => Method::GetItem,
            Self::DeleteItem(_) => Method::DeleteItem,
            Self::ListItems => Method::ListItems,
        }
    }

    /// Decode the JSON request body for `method`.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the body does not match the method's schema.
    pub fn decode(method: Method, body: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(match method {
            Method::Register => Self::Register(serde_json::from_slice(body)?),
            Method::Login => Self::Login(serde_json::from_slice(body)?),
            Method::CreateItem => Self::CreateItem(serde_json::from_slice(body)?),
            Method::UpdateItem => Self::UpdateItem(serde_json::from_slice(body)?),
            Method::GetItem => Self::GetItem(serde_json::from_slice(body)?),
            Method::DeleteItem => Self::DeleteItem(serde_json::from_slice(body)?),
            Method::ListItems => Self::ListItems,
        })
    }
}

/// A successful call's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Token(String),
    Ack,
    Item(ItemMessage),
    Names(Vec<String>),
}

#[derive(Serialize)]
struct TokenReply<'a> {
    token: &'a str,
}

#[derive(Serialize)]
struct ItemReply<'a> {
    item: &'a ItemMessage,
}

#[derive(Serialize)]
struct NamesReply<'a> {
    names: &'a [String],
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match &self {
            Self::Token(token) => Json(TokenReply { token }).into_response(),
            Self::Ack => Json(serde_json::json!({})).into_response(),
            Self::Item(item) => Json(ItemReply { item }).into_response(),
            Self::Names(names) => Json(NamesReply { names }).into_response(),
        }
    }
}
