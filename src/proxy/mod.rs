//! Proxy core: forward one request to one backend.
//!
//! # Request lifecycle
//! ```text
//! received → backend selected (round robin)
//!          → rewritten (scheme, authority, Host, hop-by-hop, X-Forwarded-For)
//!          → dispatched over the pooled client
//!          → completed | failed
//!          → instrumented (log line + metrics)
//!          → responded (backend response, or 502)
//! ```
//!
//! # Design Decisions
//! - No retries; a failed exchange is a 502 and nothing else
//! - The response-header timeout and the global deadline race the exchange;
//!   the deadline keeps running while the body streams
//! - Failures never escape as faults to the middleware chain

pub mod body;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{self, HeaderValue};
use axum::http::uri::PathAndQuery;
use axum::http::{Request, StatusCode, Uri, Version};
use axum::response::{IntoResponse, Response};
use hyper::body::Body as _;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::TransportConfig;
use crate::http::request::{RequestContext, X_REQUEST_ID};
use crate::load_balancer::{Backend, BackendPool};
use crate::observability::metrics;
use crate::security::headers::{append_forwarded_for, strip_hop_by_hop};

pub use body::DeadlineBody;
pub use transport::{build_client, HandshakeTimeout, UpstreamClient};

/// Why an upstream exchange produced no usable response.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("no response headers within {0:?}")]
    Timeout(Duration),

    #[error("request deadline of {0:?} exceeded")]
    Deadline(Duration),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("could not build upstream request: {0}")]
    InvalidRequest(#[from] axum::http::Error),
}

impl ProxyError {
    /// Low-cardinality label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Deadline(_) => "deadline",
            Self::Upstream(e) if e.is_connect() => "connect",
            Self::Upstream(_) => "upstream",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }
}

#[derive(Debug)]
pub struct ProxyCore {
    pool: Arc<BackendPool>,
    client: UpstreamClient,
    response_header_timeout: Duration,
    request_timeout: Duration,
}

impl ProxyCore {
    pub fn new(config: &TransportConfig, pool: Arc<BackendPool>) -> Result<Self, rustls::Error> {
        let client = build_client(config, pool.len())?;
        Ok(Self {
            pool,
            client,
            response_header_timeout: config.response_header_timeout(),
            request_timeout: config.request_timeout(),
        })
    }

    pub fn pool(&self) -> &BackendPool {
        &self.pool
    }

    /// Forward `req` to the next backend. Always yields a response.
    pub async fn forward(&self, ctx: &RequestContext, req: Request<Body>) -> Response {
        let backend = self.pool.select();
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        let start = Instant::now();

        tracing::debug!(
            request_id = %ctx.request_id,
            backend = %backend,
            method = %method,
            path = %path,
            "Forwarding request"
        );

        match self.dispatch(ctx, &backend, req, start + self.request_timeout).await {
            Ok(response) => {
                let elapsed = start.elapsed();
                let status = response.status();
                let size = response_size(&response);

                tracing::info!(
                    request_id = %ctx.request_id,
                    client = %ctx.client,
                    method = %method,
                    path = %path,
                    backend = %backend,
                    status = status.as_u16(),
                    duration_ms = elapsed.as_millis() as u64,
                    size = ?size,
                    "Upstream response"
                );
                metrics::record_upstream(backend.label(), status.as_u16(), elapsed);
                response
            }
            Err(e) => {
                let elapsed = start.elapsed();
                tracing::error!(
                    request_id = %ctx.request_id,
                    client = %ctx.client,
                    method = %method,
                    path = %path,
                    backend = %backend,
                    duration_ms = elapsed.as_millis() as u64,
                    error = %e,
                    "Upstream error"
                );
                metrics::record_upstream_failure(backend.label(), e.kind(), elapsed);
                (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
            }
        }
    }

    async fn dispatch(
        &self,
        ctx: &RequestContext,
        backend: &Backend,
        req: Request<Body>,
        deadline: Instant,
    ) -> Result<Response, ProxyError> {
        let upstream = rewrite_request(ctx, backend, req)?;

        let exchange = tokio::time::timeout(self.response_header_timeout, self.client.request(upstream));
        let response = match tokio::time::timeout_at(deadline, exchange).await {
            Err(_) => return Err(ProxyError::Deadline(self.request_timeout)),
            Ok(Err(_)) => return Err(ProxyError::Timeout(self.response_header_timeout)),
            Ok(Ok(result)) => result?,
        };

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(DeadlineBody::new(body, deadline))))
    }
}

/// Point `req` at `backend` and apply proxy header hygiene.
fn rewrite_request(
    ctx: &RequestContext,
    backend: &Backend,
    req: Request<Body>,
) -> Result<Request<Body>, ProxyError> {
    let (mut parts, body) = req.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));
    parts.uri = Uri::builder()
        .scheme(backend.scheme().clone())
        .authority(backend.authority().clone())
        .path_and_query(path_and_query)
        .build()?;
    // The pooled client negotiates h2 itself where the backend offers it.
    parts.version = Version::HTTP_11;

    strip_hop_by_hop(&mut parts.headers);
    let host = HeaderValue::from_str(backend.authority().as_str()).map_err(axum::http::Error::from)?;
    parts.headers.insert(header::HOST, host);
    if let Some(peer) = ctx.peer {
        append_forwarded_for(&mut parts.headers, peer.ip());
    }
    parts.headers.insert(X_REQUEST_ID, ctx.request_id.header_value());

    Ok(Request::from_parts(parts, body))
}

fn response_size(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .or_else(|| response.body().size_hint().exact())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::headers::X_FORWARDED_FOR;
    use crate::security::ClientId;

    fn context() -> RequestContext {
        RequestContext::new(
            ClientId::new("203.0.113.9"),
            Some("203.0.113.9:40000".parse().unwrap()),
        )
    }

    #[test]
    fn test_rewrite_targets_backend() {
        let backend = Backend::parse("https://api.internal:8443").unwrap();
        let ctx = context();
        let req = Request::builder()
            .method("POST")
            .uri("http://proxy.example.com/v1/items?page=2")
            .version(Version::HTTP_2)
            .header(header::HOST, "proxy.example.com")
            .header(header::CONNECTION, "close, x-trace-hop")
            .header("x-trace-hop", "1")
            .header(X_FORWARDED_FOR, "198.51.100.1")
            .header(X_REQUEST_ID, "client-chosen")
            .body(Body::empty())
            .unwrap();

        let out = rewrite_request(&ctx, &backend, req).unwrap();

        assert_eq!(out.uri(), "https://api.internal:8443/v1/items?page=2");
        assert_eq!(out.method(), "POST");
        assert_eq!(out.version(), Version::HTTP_11);
        assert_eq!(out.headers()[header::HOST], "api.internal:8443");
        assert_eq!(out.headers()[X_FORWARDED_FOR], "198.51.100.1, 203.0.113.9");
        assert_eq!(
            out.headers()[X_REQUEST_ID].to_str().unwrap(),
            ctx.request_id.to_string()
        );
        assert!(out.headers().get(header::CONNECTION).is_none());
        assert!(out.headers().get("x-trace-hop").is_none());
    }

    #[test]
    fn test_rewrite_origin_form_root() {
        let backend = Backend::parse("http://127.0.0.1:9001").unwrap();
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();

        let out = rewrite_request(&context(), &backend, req).unwrap();
        assert_eq!(out.uri(), "http://127.0.0.1:9001/");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_bad_gateway() {
        // Port 9 (discard) on loopback is closed in test environments.
        let pool = Arc::new(BackendPool::new(&["http://127.0.0.1:9"]).unwrap());
        let core = ProxyCore::new(&TransportConfig::default(), pool).unwrap();

        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = core.forward(&context(), req).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
