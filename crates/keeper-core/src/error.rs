//! Error types for `keeper-core`.
//!
//! Services and repositories return [`KeeperError`] unwrapped; nothing in
//! this crate decides how an error looks on the wire. [`KeeperError::kind`]
//! folds the variants onto the small set of [`ErrorKind`]s the transport
//! layer translates.
//!
//! Errors never carry passwords, tokens, or payload bytes.

use std::fmt;

use keeper_storage::StorageError;
use serde::Serialize;

/// One violated field constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Name of the offending field (e.g. `login`, `item.name`).
    pub field: String,
    /// Human-readable description of the violation.
    pub description: String,
}

/// Every field constraint violated by one request, in check order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a violation for `field`.
    pub fn push(&mut self, field: impl Into<String>, description: impl Into<String>) {
        self.0.push(FieldError {
            field: field.into(),
            description: description.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldError> {
        self.0.iter()
    }

    /// Whether a violation was recorded for `field`.
    pub fn contains(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    /// `Ok(())` when nothing was recorded, otherwise a
    /// [`KeeperError::Validation`] carrying every violation.
    ///
    /// # Errors
    ///
    /// Returns [`KeeperError::Validation`] if at least one violation was pushed.
    pub fn into_result(self) -> Result<(), KeeperError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(KeeperError::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", e.field, e.description)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a FieldErrors {
    type Item = &'a FieldError;
    type IntoIter = std::slice::Iter<'a, FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Coarse classification used by the transport to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    AlreadyExists,
    NotFound,
    InvalidCredentials,
    TokenExpired,
    Unauthenticated,
    DeadlineExceeded,
    Internal,
}

/// Domain errors raised by repositories and services.
#[derive(Debug, thiserror::Error)]
pub enum KeeperError {
    /// One or more request fields failed validation.
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    /// A user with this login is already registered.
    #[error("user '{login}' already exists")]
    UserAlreadyExists { login: String },

    /// No user is registered under this login.
    #[error("user '{login}' not found")]
    UserNotFound { login: String },

    /// The caller already owns an item with this name.
    #[error("item '{name}' already exists")]
    ItemAlreadyExists { name: String },

    /// The caller owns no item with this name.
    #[error("item '{name}' not found")]
    ItemNotFound { name: String },

    /// The presented token is unknown (never issued, or already evicted).
    #[error("token not found")]
    TokenNotFound,

    /// The presented token outlived its lifetime and has been evicted.
    #[error("token expired")]
    TokenExpired,

    /// Login failed. Deliberately silent about which half was wrong.
    #[error("invalid login or password")]
    InvalidCredentials,

    /// The call needs an authenticated caller and none could be established.
    #[error("authentication required: {reason}")]
    Unauthenticated { reason: String },

    /// The call did not finish before its deadline.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// A panic was contained while handling the call.
    #[error("panic while handling call: {message}\n{backtrace}")]
    Panic { message: String, backtrace: String },

    /// The storage backend failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// An entity could not be encoded or decoded.
    #[error("serialization failed: {reason}")]
    Serialization { reason: String },

    /// Any other unexpected failure.
    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl KeeperError {
    /// Classify this error for status translation.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::UserAlreadyExists { .. } | Self::ItemAlreadyExists { .. } => {
                ErrorKind::AlreadyExists
            }
            Self::UserNotFound { .. } | Self::ItemNotFound { .. } | Self::TokenNotFound => {
                ErrorKind::NotFound
            }
            Self::InvalidCredentials => ErrorKind::InvalidCredentials,
            Self::TokenExpired => ErrorKind::TokenExpired,
            Self::Unauthenticated { .. } => ErrorKind::Unauthenticated,
            Self::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            Self::Panic { .. }
            | Self::Storage(_)
            | Self::Serialization { .. }
            | Self::Internal { .. } => ErrorKind::Internal,
        }
    }
}

impl From<serde_json::Error> for KeeperError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }
}
