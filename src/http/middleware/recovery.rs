//! Fault containment.
//!
//! A panic anywhere below this stage becomes a 500 for that request only;
//! the connection task and the process keep serving.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use axum::{
    body::Body,
    extract::Extension,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures_util::FutureExt;

use crate::http::request::RequestContext;

pub async fn recovery_middleware(
    Extension(ctx): Extension<RequestContext>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            tracing::error!(
                request_id = %ctx.request_id,
                client = %ctx.client,
                method = %method,
                path = %path,
                panic = panic_message(panic.as_ref()),
                "Request handler panicked"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}
