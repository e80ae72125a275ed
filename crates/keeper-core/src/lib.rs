//! Core library for Keeper.
//!
//! Holds the entities, the error taxonomy, the repository contracts with
//! their in-memory and object-storage implementations, and the auth, token
//! and item services. Nothing here knows about the transport; the server
//! crate maps [`error::KeeperError`] onto wire statuses.

pub mod auth;
pub mod clock;
pub mod crypto;
pub mod encoding;
pub mod entity;
pub mod error;
pub mod item;
pub mod repository;
pub mod token;

pub use auth::{AuthPolicy, AuthService};
pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::{Item, ItemDraft, Metadata, Token, User};
pub use error::{ErrorKind, FieldError, FieldErrors, KeeperError};
pub use item::ItemService;
pub use repository::Repositories;
pub use token::TokenService;
