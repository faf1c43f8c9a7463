//! Response cache stage.
//!
//! Serves fresh entries for `GET` requests and captures cacheable upstream
//! responses on the way back out.

use axum::{
    body::Body,
    extract::{Extension, State},
    http::{header, HeaderMap, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    middleware::Next,
};
use http_body_util::BodyExt;
use hyper::body::Body as _;

use crate::cache::CachedResponse;
use crate::http::request::RequestContext;
use crate::http::server::AppState;
use crate::observability::metrics;

pub async fn cache_middleware(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(cache) = state.cache.clone() else {
        return next.run(req).await;
    };
    if req.method() != Method::GET {
        return next.run(req).await;
    }

    let key = cache_key(&req);
    if let Some(hit) = cache.lookup(&key) {
        tracing::debug!(request_id = %ctx.request_id, key = %key, "Cache hit");
        metrics::record_cache_lookup(true);
        return replay(hit);
    }
    metrics::record_cache_lookup(false);

    let response = next.run(req).await;
    if !is_cacheable(response.status(), response.headers()) {
        return response;
    }
    match response.body().size_hint().exact() {
        Some(len) if len <= state.cache_max_body_bytes => {}
        _ => return response,
    }

    let (parts, body) = response.into_parts();
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            tracing::error!(
                request_id = %ctx.request_id,
                key = %key,
                error = %e,
                "Failed to buffer upstream response"
            );
            return (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response();
        }
    };

    let entry = CachedResponse::new(parts.status, parts.headers.clone(), bytes.clone());
    if cache.store(key, entry) {
        metrics::record_cache_eviction();
    }
    Response::from_parts(parts, Body::from(bytes))
}

fn cache_key(req: &Request<Body>) -> String {
    req.uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned())
}

fn is_cacheable(status: StatusCode, headers: &HeaderMap) -> bool {
    if status.is_server_error() || headers.contains_key(header::SET_COOKIE) {
        return false;
    }
    !headers
        .get_all(header::CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|directive| directive.trim().to_ascii_lowercase())
        .any(|directive| directive == "no-store" || directive == "private")
}

fn replay(hit: CachedResponse) -> Response {
    let mut response = Response::new(Body::from(hit.body));
    *response.status_mut() = hit.status;
    *response.headers_mut() = hit.headers;
    response
}
