//! Translates domain errors into wire statuses.
//!
//! This is the only place a [`KeeperError`] becomes a [`Status`]. Internal
//! failures reach the caller as a generic message; the real cause is logged
//! here under the call's trace id.

use keeper_core::{ErrorKind, KeeperError};
use tracing::{error, info};

use super::{CallError, Middleware, Next};
use crate::context::RequestContext;
use crate::rpc::{Call, Reply};
use crate::status::{Code, Status};

pub struct ErrorStage;

/// Map a domain error onto the status the caller sees.
pub fn translate(err: &KeeperError) -> Status {
    match err.kind() {
        ErrorKind::Validation => {
            let status = Status::invalid_argument("invalid request");
            match err {
                KeeperError::Validation(fields) => status.with_details(fields),
                _ => status,
            }
        }
        ErrorKind::AlreadyExists => Status::new(Code::AlreadyExists, err.to_string()),
        ErrorKind::NotFound => Status::new(Code::NotFound, err.to_string()),
        ErrorKind::InvalidCredentials => {
            Status::new(Code::Unauthenticated, "invalid login or password")
        }
        ErrorKind::TokenExpired | ErrorKind::Unauthenticated => {
            Status::new(Code::Unauthenticated, "authentication required")
        }
        ErrorKind::DeadlineExceeded => Status::new(Code::DeadlineExceeded, "deadline exceeded"),
        ErrorKind::Internal => Status::internal(),
    }
}

#[async_trait::async_trait]
impl Middleware for ErrorStage {
    async fn handle(
        &self,
        ctx: RequestContext,
        call: Call,
        next: Next,
    ) -> Result<Reply, CallError> {
        let trace_id = ctx.trace_id();
        let method = ctx.method();

        match next.run(ctx, call).await {
            Ok(reply) => Ok(reply),
            Err(CallError::Status(status)) => Err(CallError::Status(status)),
            Err(CallError::Domain(err)) => {
                let status = translate(&err);
                if status.code == Code::Internal {
                    error!(%trace_id, %method, error = %err, "call failed");
                } else {
                    info!(%trace_id, %method, error = %err, code = %status.code, "call rejected");
                }
                Err(CallError::Status(status))
            }
        }
    }
}
