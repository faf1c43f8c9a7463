//! Per-request context.
//!
//! # Responsibilities
//! - Generate a unique request ID for every inbound request
//! - Resolve the client identity once, at chain entry
//! - Carry both to later stages as a typed request extension
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - An inbound `X-Request-ID` is never trusted; a fresh ID is always issued
//! - Stages read the context explicitly via `Extension<RequestContext>`

use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

use axum::http::{HeaderName, HeaderValue};
use uuid::Uuid;

use crate::security::ClientId;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn header_value(&self) -> HeaderValue {
        // A hyphenated UUID is plain ASCII.
        HeaderValue::from_str(&self.0.to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Everything later stages need to know about who sent a request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub client: ClientId,
    /// TCP peer, absent when the server was not started with connect info.
    pub peer: Option<SocketAddr>,
    pub received_at: Instant,
}

impl RequestContext {
    pub fn new(client: ClientId, peer: Option<SocketAddr>) -> Self {
        Self {
            request_id: RequestId::new(),
            client,
            peer,
            received_at: Instant::now(),
        }
    }
}
