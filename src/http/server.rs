//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router and wire up middleware (request ID, tracing,
//!   CORS)
//! - Dispatch `/ping`, the bundled documents and proxied requests
//! - Refuse disallowed destinations before anything is sent upstream
//! - Bind to a plain or TLS listener with graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use url::Url;

use crate::config::{DocumentConfig, ProxyConfig, TlsConfig};
use crate::error::ProxyError;
use crate::http::cors::{cors_middleware, CorsPolicy};
use crate::http::documents;
use crate::http::forward::{ProxyRequest, RequestForwarder};
use crate::http::redirect::authority;
use crate::http::request::{self, UuidRequestId};
use crate::lifecycle::shutdown;
use crate::net::tls::load_tls_config;
use crate::observability::metrics;
use crate::policy::{CidrParseError, DisallowedRanges, NetworkPolicy};

/// Query parameter naming the upstream URL.
pub const TARGET_PARAM: &str = "scalar_url";

/// How long in-flight requests get to finish on a TLS listener at shutdown.
const TLS_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors building the server from configuration.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid blocked range: {0}")]
    Policy(#[from] CidrParseError),

    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Application state injected into handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub policy: Arc<NetworkPolicy>,
    pub forwarder: Arc<RequestForwarder>,
    pub documents: Arc<DocumentConfig>,
}

/// HTTP server for the forwarding proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a server whose policy comes entirely from `config`.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let ranges = DisallowedRanges::with_extra(&config.policy.extra_blocked_cidrs)?;
        let policy = NetworkPolicy::new(ranges)
            .with_lookup_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .with_bypass(config.policy.bypass);
        Self::with_policy(config, policy)
    }

    /// Create a server with an explicitly built policy (custom resolver or
    /// ranges).
    pub fn with_policy(config: ProxyConfig, policy: NetworkPolicy) -> Result<Self, ServerError> {
        if policy.is_bypassed() {
            tracing::warn!("Destination policy is bypassed; private addresses are reachable");
        }

        let policy = Arc::new(policy);
        let forwarder = RequestForwarder::new(policy.clone(), &config)?;
        let state = AppState {
            policy,
            forwarder: Arc::new(forwarder),
            documents: Arc::new(config.documents.clone()),
        };

        let router = Self::build_router(&config, state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// There is no router-wide timeout: the only slow path is forwarding,
    /// which enforces its own deadline and answers `503`.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(dispatch))
            .route("/", any(dispatch))
            .with_state(state)
            .layer(middleware::from_fn_with_state(
                CorsPolicy::from_config(&config.cors),
                cors_middleware,
            ))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(request::make_span))
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
    }

    /// The fully layered router, for serving or in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server over TLS on `addr` until `shutdown` fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: &TlsConfig,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let rustls = load_tls_config(tls).await?;
        let handle = axum_server::Handle::new();

        let drain = handle.clone();
        tokio::spawn(async move {
            shutdown::wait(shutdown).await;
            drain.graceful_shutdown(Some(TLS_DRAIN_TIMEOUT));
        });

        tracing::info!(address = %addr, "HTTPS server starting");
        axum_server::bind_rustls(addr, rustls)
            .handle(handle)
            .serve(self.router.into_make_service())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

/// Single entry point for every path and method.
async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().clone();
    let request_id = request::request_id(request.headers()).to_string();

    let response = match route(&state, request, &request_id).await {
        Ok(response) => response,
        Err(err) => {
            match &err {
                ProxyError::MissingTarget | ProxyError::BlockedDestination => {
                    tracing::debug!(request_id = %request_id, error = %err, "Request refused")
                }
                ProxyError::InvalidTargetUrl(_) | ProxyError::RedirectBlocked(_) => {
                    tracing::warn!(request_id = %request_id, error = %err, "Request refused")
                }
                _ => tracing::error!(request_id = %request_id, error = %err, "Request failed"),
            }
            err.into_response()
        }
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), start_time);
    response
}

async fn route(
    state: &AppState,
    request: Request<Body>,
    request_id: &str,
) -> Result<Response, ProxyError> {
    let path = request.uri().path();
    let query = request.uri().query().unwrap_or_default();

    match path {
        "/ping" => return Ok("pong".into_response()),
        "/" if query.is_empty() => {
            return documents::serve(&state.documents.index_path, "text/html", "index.html").await
        }
        "/openapi.yaml" => {
            return documents::serve(&state.documents.openapi_path, "text/yaml", "openapi.yaml")
                .await
        }
        _ => {}
    }

    proxy(state, request, request_id).await
}

async fn proxy(
    state: &AppState,
    request: Request<Body>,
    request_id: &str,
) -> Result<Response, ProxyError> {
    let raw = target_param(request.uri().query()).ok_or(ProxyError::MissingTarget)?;
    let target = Url::parse(&raw)?;

    if !state.policy.is_bypassed() {
        let destination = authority(&target);
        if state.policy.is_blocked(&destination).await {
            metrics::record_blocked("request");
            tracing::warn!(request_id = %request_id, target = %destination, "Blocked destination");
            return Err(ProxyError::BlockedDestination);
        }
    }

    tracing::debug!(request_id = %request_id, method = %request.method(), target = %target, "Proxying request");

    let (parts, body) = request.into_parts();
    state
        .forwarder
        .forward(ProxyRequest {
            method: parts.method,
            headers: parts.headers,
            body,
            target,
            request_id: request_id.to_string(),
        })
        .await
}

/// The first `scalar_url` value of a query string, percent-decoded.
///
/// `None` when the parameter is absent or its first occurrence is empty;
/// later occurrences are never consulted.
pub fn target_param(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == TARGET_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}
