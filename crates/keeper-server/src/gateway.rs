//! HTTP transport for the RPC surface.
//!
//! Every method is `POST /keeper.KeeperService/{Method}` with a JSON body.
//! Request headers become call metadata (the bearer token travels in the
//! `token` header). A failed call answers with a [`Status`] body and the
//! matching HTTP status.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::context::RequestContext;
use crate::rpc::{Call, Method, SERVICE};
use crate::state::AppState;
use crate::status::{Code, Status};

/// Header carrying the caller's deadline in milliseconds.
pub const TIMEOUT_HEADER: &str = "x-keeper-timeout-ms";

/// Build the router serving every method.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&format!("/{SERVICE}/{{method}}"), post(handle))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}

async fn handle(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    request: Request,
) -> Response {
    let Some(method) = Method::from_name(&name) else {
        return Status::new(Code::Unimplemented, format!("unknown method '{name}'")).into_response();
    };

    let (parts, body) = request.into_parts();

    let mut ctx = RequestContext::new(method);
    if let Some(ConnectInfo(peer)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
        ctx = ctx.with_peer(*peer);
    }
    for (key, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            ctx = ctx.with_metadata(key.as_str(), value);
        }
    }
    if let Some(deadline) = deadline(&parts.headers, state.call_timeout) {
        ctx = ctx.with_deadline(deadline);
    }

    let bytes = match axum::body::to_bytes(body, state.max_message_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(%method, error = %e, "request body rejected");
            return Status::invalid_argument(format!("request body rejected: {e}")).into_response();
        }
    };
    let call = match Call::decode(method, &bytes) {
        Ok(call) => call,
        Err(e) => {
            warn!(%method, error = %e, "malformed request");
            return Status::invalid_argument(format!("malformed {} request: {e}", method.name()))
                .into_response();
        }
    };

    match state.pipeline.dispatch(ctx, call).await {
        Ok(reply) => reply.into_response(),
        Err(status) => status.into_response(),
    }
}

/// The earlier of the caller's deadline and the server's own call timeout.
fn deadline(headers: &HeaderMap, server: Option<Duration>) -> Option<Instant> {
    let client = headers
        .get(TIMEOUT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis);
    let budget = match (client, server) {
        (Some(c), Some(s)) => Some(c.min(s)),
        (c, s) => c.or(s),
    };
    budget.and_then(|b| Instant::now().checked_add(b))
}
