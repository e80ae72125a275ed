//! Logs the start and completion of every call.
//!
//! Sits outside the error stage, so the completion line always carries the
//! final wire code.

use std::time::Instant;

use tracing::info;

use super::{CallError, Middleware, Next};
use crate::context::RequestContext;
use crate::rpc::{Call, Reply};
use crate::status::Code;

pub struct LoggingStage;

#[async_trait::async_trait]
impl Middleware for LoggingStage {
    async fn handle(
        &self,
        ctx: RequestContext,
        call: Call,
        next: Next,
    ) -> Result<Reply, CallError> {
        let trace_id = ctx.trace_id();
        let method = ctx.method();
        let (started, started_at) = ctx
            .trace()
            .map_or_else(|| (Instant::now(), None), |t| (t.started_at, Some(t.now)));
        let client = ctx
            .peer()
            .map_or_else(|| "unknown".to_owned(), |p| p.to_string());

        info!(
            %trace_id,
            %method,
            %client,
            started_at = started_at.map(tracing::field::display),
            "request started"
        );

        let result = next.run(ctx, call).await;

        let code = match &result {
            Ok(_) => Code::Ok,
            Err(e) => e.code().unwrap_or(Code::Unknown),
        };
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(%trace_id, %method, %client, %code, elapsed_ms, "request completed");

        result
    }
}
