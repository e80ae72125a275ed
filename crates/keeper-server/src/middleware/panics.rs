//! Panic containment, deadline enforcement and cancellation.
//!
//! The inner chain runs on its own task. A panic there surfaces as a
//! [`JoinError`](tokio::task::JoinError) instead of unwinding through the
//! server, and is turned into [`KeeperError::Panic`] with the backtrace
//! captured at the panic site. The task is aborted if the deadline passes or
//! if this future is dropped because the caller went away.

use std::backtrace::Backtrace;
use std::panic;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use keeper_core::KeeperError;
use tokio::task::AbortHandle;
use tracing::warn;

use super::{CallError, Middleware, Next};
use crate::context::RequestContext;
use crate::rpc::{Call, Reply};

tokio::task_local! {
    static PANIC_SLOT: Arc<Mutex<Option<String>>>;
}

static HOOK: Once = Once::new();

/// Chain a hook that records the backtrace of panics raised inside a
/// contained call. Panics elsewhere go to the previous hook untouched.
fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let recorded = PANIC_SLOT.try_with(|slot| {
                if let Ok(mut guard) = slot.lock() {
                    *guard = Some(Backtrace::force_capture().to_string());
                }
            });
            if recorded.is_err() {
                previous(info);
            }
        }));
    });
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct PanicStage;

impl PanicStage {
    pub fn new() -> Self {
        install_hook();
        Self
    }
}

impl Default for PanicStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Middleware for PanicStage {
    async fn handle(
        &self,
        ctx: RequestContext,
        call: Call,
        next: Next,
    ) -> Result<Reply, CallError> {
        let remaining = ctx.remaining();
        if remaining == Some(Duration::ZERO) {
            return Err(KeeperError::DeadlineExceeded.into());
        }

        let trace_id = ctx.trace_id();
        let method = ctx.method();
        let slot = Arc::new(Mutex::new(None));
        let task = tokio::spawn(PANIC_SLOT.scope(Arc::clone(&slot), next.run(ctx, call)));
        let _guard = AbortOnDrop(task.abort_handle());

        let joined = match remaining {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(%trace_id, %method, "deadline passed, call aborted");
                    return Err(KeeperError::DeadlineExceeded.into());
                }
            },
            None => task.await,
        };

        match joined {
            Ok(result) => result,
            Err(err) if err.is_panic() => {
                let message = panic_message(err.into_panic());
                let backtrace = slot
                    .lock()
                    .ok()
                    .and_then(|mut recorded| recorded.take())
                    .unwrap_or_default();
                Err(KeeperError::Panic { message, backtrace }.into())
            }
            Err(err) => Err(KeeperError::Internal {
                reason: format!("call task failed: {err}"),
            }
            .into()),
        }
    }
}
