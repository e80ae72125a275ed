//! Dispatches decoded calls to the auth and item services.

use std::sync::Arc;

use keeper_core::{AuthService, ItemService, KeeperError};

use crate::context::RequestContext;
use crate::middleware::Endpoint;
use crate::rpc::{Call, ItemMessage, Reply};

pub struct KeeperEndpoint {
    auth: Arc<AuthService>,
    items: Arc<ItemService>,
}

impl KeeperEndpoint {
    pub fn new(auth: Arc<AuthService>, items: Arc<ItemService>) -> Self {
        Self { auth, items }
    }
}

/// The user id the auth stage attached to `ctx`.
fn require_user(ctx: &RequestContext) -> Result<&str, KeeperError> {
    ctx.user_id().ok_or_else(|| KeeperError::Unauthenticated {
        reason: "no authenticated user in context".to_owned(),
    })
}

#[async_trait::async_trait]
impl Endpoint for KeeperEndpoint {
    async fn call(&self, ctx: RequestContext, call: Call) -> Result<Reply, KeeperError> {
        match call {
            Call::Register(req) => Ok(Reply::Token(
                self.auth.register(&req.login, &req.password).await?,
            )),
            Call::Login(req) => Ok(Reply::Token(
                self.auth.login(&req.login, &req.password).await?,
            )),
            Call::CreateItem(req) => {
                let user_id = require_user(&ctx)?;
                self.items.create(user_id, req.item.into()).await?;
                Ok(Reply::Ack)
            }
            Call::UpdateItem(req) => {
                let user_id = require_user(&ctx)?;
                self.items.update(user_id, req.item.into()).await?;
                Ok(Reply::Ack)
            }
            Call::GetItem(req) => {
                let user_id = require_user(&ctx)?;
                let item = self.items.get(user_id, &req.name).await?;
                Ok(Reply::Item(ItemMessage::from(item)))
            }
            Call::DeleteItem(req) => {
                let user_id = require_user(&ctx)?;
                self.items.delete(user_id, &req.name).await?;
                Ok(Reply::Ack)
            }
            Call::ListItems => {
                let user_id = require_user(&ctx)?;
                Ok(Reply::Names(self.items.list(user_id).await?))
            }
        }
    }
}
