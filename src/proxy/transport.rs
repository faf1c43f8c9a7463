//! Pooled upstream transport.
//!
//! # Responsibilities
//! - Build the shared HTTP(S) client with connection reuse
//! - Bound TCP connect and TLS handshake time
//! - Cap idle connections per backend and process-wide
//!
//! # Design Decisions
//! - One client for all backends; hyper keys its pool by scheme + authority
//! - The process-wide idle cap is spread evenly over the backends, since the
//!   pool only knows a per-host limit

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::uri::Scheme;
use axum::http::Uri;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tower::{BoxError, Service};

use crate::config::TransportConfig;

pub type UpstreamClient = Client<HandshakeTimeout<HttpsConnector<HttpConnector>>, Body>;

/// Build the upstream client for a pool of `backends` servers.
pub fn build_client(
    config: &TransportConfig,
    backends: usize,
) -> Result<UpstreamClient, rustls::Error> {
    let mut http = HttpConnector::new();
    http.set_connect_timeout(Some(config.connect_timeout()));
    http.set_nodelay(true);
    // The HTTPS connector decides per URI whether to wrap in TLS.
    http.enforce_http(false);

    let https = HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())?
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .wrap_connector(http);

    let connector = HandshakeTimeout::new(
        https,
        config.connect_timeout() + config.tls_handshake_timeout(),
    );

    let idle_per_host = idle_per_backend(config, backends);
    tracing::debug!(
        idle_per_host,
        idle_timeout_secs = config.idle_timeout_secs,
        "Upstream connection pool configured"
    );

    Ok(Client::builder(TokioExecutor::new())
        .pool_timer(TokioTimer::new())
        .pool_idle_timeout(config.idle_timeout())
        .pool_max_idle_per_host(idle_per_host)
        .build(connector))
}

fn idle_per_backend(config: &TransportConfig, backends: usize) -> usize {
    let share = config.max_idle_connections / backends.max(1);
    config.max_idle_per_backend.min(share).max(1)
}

/// Connector wrapper bounding connection setup to `https` destinations.
#[derive(Debug, Clone)]
pub struct HandshakeTimeout<C> {
    inner: C,
    timeout: Duration,
}

impl<C> HandshakeTimeout<C> {
    pub fn new(inner: C, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl<C> Service<Uri> for HandshakeTimeout<C>
where
    C: Service<Uri>,
    C::Response: Send + 'static,
    C::Error: Into<BoxError>,
    C::Future: Send + 'static,
{
    type Response = C::Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let secure = dst.scheme() == Some(&Scheme::HTTPS);
        let timeout = self.timeout;
        let connecting = self.inner.call(dst);

        Box::pin(async move {
            if !secure {
                return connecting.await.map_err(Into::into);
            }
            match tokio::time::timeout(timeout, connecting).await {
                Ok(result) => result.map_err(Into::into),
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("TLS handshake not completed within {timeout:?}"),
                )
                .into()),
            }
        })
    }
}
