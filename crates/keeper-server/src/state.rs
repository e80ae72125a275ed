//! Shared application state for the Keeper server.
//!
//! A single [`AppState`] is built at startup and shared across every
//! request through `Arc`. It owns the composed pipeline and the transport
//! limits the gateway applies before a call enters it.

use std::sync::Arc;
use std::time::Duration;

use keeper_core::crypto::{Argon2Hasher, PasswordHasher};
use keeper_core::{AuthService, Clock, ItemService, KeeperError, Repositories, TokenService};

use crate::config::ServerConfig;
use crate::endpoint::KeeperEndpoint;
use crate::middleware::Pipeline;

/// Shared state passed to the gateway handler.
#[derive(Debug)]
pub struct AppState {
    pub pipeline: Pipeline,
    /// Server-side deadline applied to every call.
    pub call_timeout: Option<Duration>,
    pub max_message_bytes: usize,
}

impl AppState {
    /// Wire services and the standard pipeline over `repos`.
    ///
    /// # Errors
    ///
    /// Returns [`KeeperError::Internal`] if the hash cost or token lifetime
    /// is out of range.
    pub fn build(
        config: &ServerConfig,
        repos: Repositories,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, KeeperError> {
        let lifetime =
            chrono::Duration::from_std(config.token_lifetime).map_err(|e| KeeperError::Internal {
                reason: format!("token lifetime out of range: {e}"),
            })?;
        let hasher: Arc<dyn PasswordHasher> = Arc::new(Argon2Hasher::new(config.hash_cost)?);

        let tokens = Arc::new(TokenService::new(
            Arc::clone(&repos.users),
            Arc::clone(&repos.tokens),
            Arc::clone(&clock),
            lifetime,
        ));
        let auth = Arc::new(AuthService::new(
            Arc::clone(&repos.users),
            Arc::clone(&tokens),
            hasher,
            Arc::clone(&clock),
            config.auth_policy,
        ));
        let items = Arc::new(ItemService::new(Arc::clone(&repos.items), Arc::clone(&clock)));

        let pipeline = Pipeline::standard(
            clock,
            tokens,
            config.auth_skip.clone(),
            KeeperEndpoint::new(auth, items),
        );

        Ok(Self {
            pipeline,
            call_timeout: config.call_timeout,
            max_message_bytes: config.max_message_bytes,
        })
    }
}
