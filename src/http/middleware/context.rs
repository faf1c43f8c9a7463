//! Chain entry: request ID and client identity.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::http::request::{RequestContext, X_REQUEST_ID};
use crate::http::server::AppState;
use crate::security::headers::client_identity;

/// Attach a [`RequestContext`] to the request and echo its ID on the response.
pub async fn request_context_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_identity(req.headers(), peer, state.trust_forwarded_for);
    let ctx = RequestContext::new(client, peer);
    let request_id = ctx.request_id.header_value();

    req.extensions_mut().insert(ctx);
    let mut response = next.run(req).await;
    response.headers_mut().insert(X_REQUEST_ID, request_id);
    response
}
