//! Abuse filter stage.

use axum::{
    body::Body,
    extract::{Extension, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::request::RequestContext;
use crate::http::server::AppState;
use crate::security::Verdict;

/// Reject banned clients with 403; feed every other outcome back to the filter.
pub async fn abuse_filter_middleware(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(filter) = state.filter.as_ref() else {
        return next.run(req).await;
    };

    if filter.check(&ctx.client) == Verdict::Reject {
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    }

    let response = next.run(req).await;
    filter.record_outcome(&ctx.client, response.status());
    response
}
