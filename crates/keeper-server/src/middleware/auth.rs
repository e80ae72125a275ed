//! Bearer token authentication.

use std::collections::HashSet;
use std::sync::Arc;

use keeper_core::{KeeperError, TokenService};
use tracing::debug;

use super::{CallError, Middleware, Next};
use crate::context::RequestContext;
use crate::rpc::{Call, Method, Reply};

/// Metadata key carrying the bearer token.
pub const TOKEN_FIELD: &str = "token";

/// Resolves the caller's token to a user id before the endpoint runs.
///
/// Methods in the skip set pass straight through.
pub struct AuthStage {
    tokens: Arc<TokenService>,
    skip: HashSet<Method>,
}

impl AuthStage {
    pub fn new(tokens: Arc<TokenService>, skip: HashSet<Method>) -> Self {
        Self { tokens, skip }
    }

    fn unauthenticated(reason: &str) -> CallError {
        KeeperError::Unauthenticated {
            reason: reason.to_owned(),
        }
        .into()
    }
}

#[async_trait::async_trait]
impl Middleware for AuthStage {
    async fn handle(
        &self,
        mut ctx: RequestContext,
        call: Call,
        next: Next,
    ) -> Result<Reply, CallError> {
        if self.skip.contains(&ctx.method()) {
            return next.run(ctx, call).await;
        }

        let token = match ctx.metadata(TOKEN_FIELD) {
            None => return Err(Self::unauthenticated("token not provided")),
            Some(t) if t.trim().is_empty() => {
                return Err(Self::unauthenticated("empty token provided"));
            }
            Some(t) => t.trim().to_owned(),
        };

        let user = match self.tokens.get_user(&token).await {
            Ok(user) => user,
            Err(KeeperError::TokenNotFound) => {
                return Err(Self::unauthenticated("token not found"));
            }
            Err(KeeperError::UserNotFound { .. }) => {
                return Err(Self::unauthenticated("token owner not found"));
            }
            Err(err) => return Err(err.into()),
        };

        debug!(trace_id = %ctx.trace_id(), login = %user.login, "caller authenticated");
        ctx.set_user_id(user.id);
        next.run(ctx, call).await
    }
}
