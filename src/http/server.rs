//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the catch-all proxy handler
//! - Wire up the middleware chain in its fixed order
//! - Bind server to listener with connect info (peer addresses)
//! - Own the ban sweep task for the server's lifetime
//! - Drain in-flight requests on shutdown

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Extension, State},
    http::{header, Request},
    middleware::{from_fn, from_fn_with_state},
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::cache::ResponseCache;
use crate::config::ProxyConfig;
use crate::http::middleware::{
    abuse_filter_middleware, access_log_middleware, cache_middleware, metrics_middleware,
    recovery_middleware, request_context_middleware,
};
use crate::http::request::RequestContext;
use crate::lifecycle::{build_components, Components, CorsHeaders, Shutdown, StartupError};
use crate::proxy::ProxyCore;
use crate::security::AbuseFilter;

/// Application state injected into handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub proxy: Arc<ProxyCore>,
    pub filter: Option<Arc<AbuseFilter>>,
    pub cache: Option<Arc<ResponseCache>>,
    pub cache_max_body_bytes: u64,
    pub trust_forwarded_for: bool,
}

impl AppState {
    pub fn new(components: &Components, config: &ProxyConfig) -> Self {
        Self {
            proxy: components.proxy.clone(),
            filter: components.filter.clone(),
            cache: components.cache.clone(),
            cache_max_body_bytes: config.cache.max_body_bytes as u64,
            trust_forwarded_for: config.abuse_filter.trust_forwarded_for,
        }
    }
}

/// HTTP server for the reverse proxy.
pub struct HttpServer {
    router: Router,
    state: AppState,
    config: ProxyConfig,
}

impl HttpServer {
    /// Build every component from `config`. Fails if any of them is invalid.
    pub fn new(config: ProxyConfig) -> Result<Self, StartupError> {
        let components = build_components(&config)?;
        let state = AppState::new(&components, &config);
        let router = with_middleware(proxy_routes(), state.clone(), &components.cors);

        Ok(Self {
            router,
            state,
            config,
        })
    }

    /// The fully layered router, for driving the proxy without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backends = self.config.backends.len(),
            "HTTP server starting"
        );

        let sweeper = self
            .state
            .filter
            .as_ref()
            .map(|filter| filter.spawn_sweeper(shutdown.clone()));

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.wait())
            .await;

        // Also stops the sweep when serving ended on an I/O error.
        shutdown.trigger();
        if let Some(handle) = sweeper {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Abuse filter sweep task failed");
            }
        }

        served?;
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Catch-all routes handing every method and path to the proxy core.
pub fn proxy_routes() -> Router<AppState> {
    Router::new()
        .route("/", any(proxy_handler))
        .route("/{*path}", any(proxy_handler))
}

/// Wrap `routes` in the request pipeline, outermost stage first.
pub fn with_middleware(routes: Router<AppState>, state: AppState, cors: &CorsHeaders) -> Router {
    routes
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(state.clone(), request_context_middleware))
                .layer(from_fn_with_state(state.clone(), abuse_filter_middleware))
                .layer(from_fn(recovery_middleware))
                .layer(from_fn(access_log_middleware))
                .layer(from_fn(metrics_middleware))
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::ACCESS_CONTROL_ALLOW_ORIGIN,
                    cors.allow_origin.clone(),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::ACCESS_CONTROL_ALLOW_METHODS,
                    cors.allow_methods.clone(),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::ACCESS_CONTROL_ALLOW_HEADERS,
                    cors.allow_headers.clone(),
                ))
                .layer(from_fn_with_state(state.clone(), cache_middleware)),
        )
        .with_state(state)
}

async fn proxy_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    request: Request<Body>,
) -> Response {
    state.proxy.forward(&ctx, request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::http::{HeaderValue, StatusCode};
    use axum::routing::get;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::http::request::X_REQUEST_ID;
    use crate::security::headers::X_FORWARDED_FOR;

    fn config() -> ProxyConfig {
        let mut config = ProxyConfig {
            backends: vec!["http://127.0.0.1:9".to_string()],
            ..ProxyConfig::default()
        };
        config.abuse_filter.trusted_clients.clear();
        config
    }

    fn app(config: &ProxyConfig, routes: Router<AppState>) -> Router {
        let components = build_components(config).unwrap();
        let state = AppState::new(&components, config);
        with_middleware(routes, state, &components.cors)
    }

    fn request(method: &str, uri: &str, client: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(X_FORWARDED_FOR, client)
            .body(Body::empty())
            .unwrap()
    }

    async fn explode() -> &'static str {
        panic!("handler exploded")
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let routes = Router::new()
            .route("/boom", get(explode))
            .route("/ok", get(|| async { "fine" }));
        let app = app(&config(), routes);

        let response = app.clone().oneshot(request("GET", "/boom", "198.51.100.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().contains_key(X_REQUEST_ID));

        let response = app.oneshot(request("GET", "/ok", "198.51.100.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_request_limit_yields_forbidden() {
        let mut config = config();
        config.abuse_filter.request_limit = 2;
        let app = app(&config, Router::new().route("/ok", get(|| async { "fine" })));

        for _ in 0..2 {
            let response = app.clone().oneshot(request("GET", "/ok", "198.51.100.2")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = app.clone().oneshot(request("GET", "/ok", "198.51.100.2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app.oneshot(request("GET", "/ok", "198.51.100.3")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_error_responses_lead_to_ban() {
        let mut config = config();
        config.abuse_filter.error_limit = 2;
        let routes = Router::new().route("/missing", get(|| async { StatusCode::NOT_FOUND }));
        let app = app(&config, routes);

        for _ in 0..2 {
            let response = app.clone().oneshot(request("GET", "/missing", "198.51.100.4")).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
        let response = app.oneshot(request("GET", "/missing", "198.51.100.4")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_cors_headers_fill_gaps_only() {
        let routes = Router::new()
            .route("/plain", get(|| async { "plain" }))
            .route(
                "/own",
                get(|| async {
                    ([(header::ACCESS_CONTROL_ALLOW_ORIGIN, "https://app.example")], "own")
                }),
            );
        let app = app(&config(), routes);

        let response = app.clone().oneshot(request("GET", "/plain", "198.51.100.5")).await.unwrap();
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS],
            "GET, POST, PUT, DELETE, OPTIONS"
        );

        let response = app.oneshot(request("GET", "/own", "198.51.100.5")).await.unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://app.example"
        );
    }

    #[tokio::test]
    async fn test_get_responses_are_cached() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let routes = Router::new().route(
            "/items",
            any(move || {
                let counter = counter.clone();
                async move { format!("hit {}", counter.fetch_add(1, Ordering::SeqCst) + 1) }
            }),
        );
        let app = app(&config(), routes);

        for _ in 0..3 {
            let response = app.clone().oneshot(request("GET", "/items", "198.51.100.6")).await.unwrap();
            let body = response.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(&body[..], b"hit 1");
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Another query string is another key; other methods bypass the cache.
        app.clone().oneshot(request("GET", "/items?page=2", "198.51.100.6")).await.unwrap();
        app.oneshot(request("POST", "/items", "198.51.100.6")).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_request_ids_are_fresh() {
        let app = app(&config(), Router::new().route("/ok", get(|| async { "fine" })));

        let mut req = request("GET", "/ok", "198.51.100.7");
        req.headers_mut().insert(X_REQUEST_ID, HeaderValue::from_static("chosen-by-client"));
        let first = app.clone().oneshot(req).await.unwrap();
        let second = app.oneshot(request("GET", "/ok", "198.51.100.7")).await.unwrap();

        let a = first.headers()[X_REQUEST_ID].clone();
        let b = second.headers()[X_REQUEST_ID].clone();
        assert_ne!(a, "chosen-by-client");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_unreachable_backend_through_full_chain() {
        let server = HttpServer::new(config()).unwrap();
        let response = server
            .router()
            .oneshot(request("GET", "/anything", "198.51.100.8"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
