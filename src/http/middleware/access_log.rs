//! Access logging.

use axum::{
    body::Body,
    extract::Extension,
    http::Request,
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

use crate::http::request::RequestContext;

/// Run the rest of the chain inside a per-request span and log completion.
pub async fn access_log_middleware(
    Extension(ctx): Extension<RequestContext>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let span = tracing::info_span!(
        "request",
        request_id = %ctx.request_id,
        client = %ctx.client,
    );

    let response = next.run(req).instrument(span.clone()).await;

    span.in_scope(|| {
        tracing::info!(
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            duration_ms = ctx.received_at.elapsed().as_millis() as u64,
            "Request completed"
        );
    });
    response
}
