//! Outermost stage: stamps every call with a trace id and start time.

use std::sync::Arc;
use std::time::Instant;

use keeper_core::Clock;
use uuid::Uuid;

use super::{CallError, Middleware, Next};
use crate::context::{RequestContext, TraceValues};
use crate::rpc::{Call, Reply};

pub struct ContextStage {
    clock: Arc<dyn Clock>,
}

impl ContextStage {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait::async_trait]
impl Middleware for ContextStage {
    async fn handle(
        &self,
        mut ctx: RequestContext,
        call: Call,
        next: Next,
    ) -> Result<Reply, CallError> {
        ctx.set_trace(TraceValues {
            trace_id: Uuid::new_v4(),
            started_at: Instant::now(),
            now: self.clock.now(),
        });
        next.run(ctx, call).await
    }
}
