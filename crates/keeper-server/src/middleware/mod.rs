//! The call pipeline.
//!
//! A [`Pipeline`] is an ordered list of [`Middleware`] stages around one
//! [`Endpoint`], composed once at startup. Each stage receives the request
//! context, the decoded call and a [`Next`] handle for the rest of the chain.
//!
//! [`Pipeline::standard`] builds the production order, outermost first:
//!
//! 1. [`ContextStage`]: trace id and start time
//! 2. [`LoggingStage`]: start and completion lines with the final code
//! 3. [`ErrorStage`]: domain error to [`Status`]
//! 4. [`PanicStage`]: panic containment, deadline and cancellation
//! 5. [`AuthStage`]: bearer token check with a per-method skip set
//!
//! Stages inside the error stage see [`CallError::Domain`]; stages outside
//! it only ever see [`CallError::Status`].

mod auth;
mod context;
mod errors;
mod logging;
mod panics;

use std::collections::HashSet;
use std::sync::Arc;

use keeper_core::{Clock, KeeperError, TokenService};
use tracing::error;

pub use auth::{AuthStage, TOKEN_FIELD};
pub use context::ContextStage;
pub use errors::{ErrorStage, translate};
pub use logging::LoggingStage;
pub use panics::PanicStage;

use crate::context::RequestContext;
use crate::rpc::{Call, Method, Reply};
use crate::status::{Code, Status};

/// Failure travelling back out through the pipeline.
#[derive(Debug)]
pub enum CallError {
    /// Untranslated domain error.
    Domain(KeeperError),
    /// Error already translated into its wire form.
    Status(Status),
}

impl CallError {
    /// Final code if the error is already translated.
    pub fn code(&self) -> Option<Code> {
        match self {
            Self::Domain(_) => None,
            Self::Status(s) => Some(s.code),
        }
    }
}

impl From<KeeperError> for CallError {
    fn from(err: KeeperError) -> Self {
        Self::Domain(err)
    }
}

impl From<Status> for CallError {
    fn from(status: Status) -> Self {
        Self::Status(status)
    }
}

/// One wrapping stage.
#[async_trait::async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(
        &self,
        ctx: RequestContext,
        call: Call,
        next: Next,
    ) -> Result<Reply, CallError>;
}

/// The handler at the centre of the pipeline.
#[async_trait::async_trait]
pub trait Endpoint: Send + Sync + 'static {
    async fn call(&self, ctx: RequestContext, call: Call) -> Result<Reply, KeeperError>;
}

struct Chain {
    stages: Vec<Arc<dyn Middleware>>,
    endpoint: Arc<dyn Endpoint>,
}

/// The remainder of the pipeline after the current stage.
///
/// Owns its position in the chain, so it can be moved into a spawned task.
#[derive(Clone)]
pub struct Next {
    chain: Arc<Chain>,
    position: usize,
}

impl Next {
    /// Run the remaining stages and the endpoint.
    pub async fn run(self, ctx: RequestContext, call: Call) -> Result<Reply, CallError> {
        match self.chain.stages.get(self.position) {
            Some(stage) => {
                let stage = Arc::clone(stage);
                let next = Self {
                    chain: Arc::clone(&self.chain),
                    position: self.position + 1,
                };
                stage.handle(ctx, call, next).await
            }
            None => Ok(self.chain.endpoint.call(ctx, call).await?),
        }
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("position", &self.position)
            .field("stages", &self.chain.stages.len())
            .finish()
    }
}

/// A composed, immutable pipeline.
#[derive(Clone)]
pub struct Pipeline {
    chain: Arc<Chain>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder { stages: Vec::new() }
    }

    /// The production stage order around `endpoint`. Methods in `skip_auth`
    /// bypass the token check.
    pub fn standard(
        clock: Arc<dyn Clock>,
        tokens: Arc<TokenService>,
        skip_auth: HashSet<Method>,
        endpoint: impl Endpoint,
    ) -> Self {
        Self::builder()
            .stage(ContextStage::new(clock))
            .stage(LoggingStage)
            .stage(ErrorStage)
            .stage(PanicStage::new())
            .stage(AuthStage::new(tokens, skip_auth))
            .build(endpoint)
    }

    /// Run one call through every stage.
    ///
    /// # Errors
    ///
    /// Returns the translated [`Status`] of a failed call. A domain error
    /// that escapes untranslated becomes a generic internal status.
    pub async fn dispatch(&self, ctx: RequestContext, call: Call) -> Result<Reply, Status> {
        let next = Next {
            chain: Arc::clone(&self.chain),
            position: 0,
        };
        next.run(ctx, call).await.map_err(|e| match e {
            CallError::Status(status) => status,
            CallError::Domain(err) => {
                error!(error = %err, "untranslated error reached the gateway");
                Status::internal()
            }
        })
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.chain.stages.len())
            .finish_non_exhaustive()
    }
}

/// Collects stages in outermost-first order.
pub struct PipelineBuilder {
    stages: Vec<Arc<dyn Middleware>>,
}

impl PipelineBuilder {
    /// Append a stage inside the ones added so far.
    #[must_use]
    pub fn stage(mut self, stage: impl Middleware) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn build(self, endpoint: impl Endpoint) -> Pipeline {
        Pipeline {
            chain: Arc::new(Chain {
                stages: self.stages,
                endpoint: Arc::new(endpoint),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests;
