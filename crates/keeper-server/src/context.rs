//! Request-scoped value bag.
//!
//! The gateway creates a [`RequestContext`] per call with the transport
//! facts (method, peer, metadata, deadline). Pipeline stages then add the
//! trace values and the authenticated user id. Nothing here is shared
//! between calls.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::rpc::Method;

/// Values attached by the context stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceValues {
    pub trace_id: Uuid,
    /// Monotonic start, for elapsed time.
    pub started_at: Instant,
    /// Wall-clock start, logged by the logging stage.
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    peer: Option<SocketAddr>,
    metadata: HashMap<String, String>,
    deadline: Option<Instant>,
    trace: Option<TraceValues>,
    user_id: Option<String>,
}

impl RequestContext {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            peer: None,
            metadata: HashMap::new(),
            deadline: None,
            trace: None,
            user_id: None,
        }
    }

    #[must_use]
    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Add one metadata entry. Keys are case-insensitive and stored
    /// lowercase.
    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_ascii_lowercase(), value.into());
        self
    }

    /// Fail the call once `deadline` passes.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Time left before the deadline, `None` when the call has none.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn trace(&self) -> Option<&TraceValues> {
        self.trace.as_ref()
    }

    pub fn set_trace(&mut self, values: TraceValues) {
        self.trace = Some(values);
    }

    /// Trace id, or the nil UUID before the context stage ran.
    pub fn trace_id(&self) -> Uuid {
        self.trace.map_or_else(Uuid::nil, |t| t.trace_id)
    }

    /// Id of the authenticated caller, set by the auth stage.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn set_user_id(&mut self, user_id: impl Into<String>) {
        self.user_id = Some(user_id.into());
    }
}
