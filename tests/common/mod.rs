//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    http::{header, HeaderMap, Method, StatusCode},
    response::IntoResponse,
    routing::{any, get},
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use futures_util::future::BoxFuture;
use scalar_proxy::config::ProxyConfig;
use scalar_proxy::policy::{DisallowedRanges, NetworkPolicy, Resolver, StaticResolver};
use scalar_proxy::{HttpServer, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Address the metadata service would live at.
pub const METADATA_IP: &str = "169.254.169.254";

/// Serve `router` on an ephemeral loopback port.
pub async fn start_upstream(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// Serve `router` over TLS with a self-signed certificate on an ephemeral
/// loopback port.
pub async fn start_tls_upstream(router: Router) -> SocketAddr {
    let tls = RustlsConfig::from_pem_file(fixture("upstream-cert.pem"), fixture("upstream-key.pem"))
        .await
        .unwrap();
    let handle = axum_server::Handle::new();
    let server = axum_server::bind_rustls("127.0.0.1:0".parse().unwrap(), tls).handle(handle.clone());
    tokio::spawn(async move {
        let _ = server.serve(router.into_make_service()).await;
    });
    handle.listening().await.unwrap()
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Backend that promises 100 body bytes, sends a few and hangs up.
pub async fn start_truncating_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\npartial")
                    .await;
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_millis(200)).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// Mock upstream exercising echo, redirects and header behavior.
///
/// `hits` counts every request the upstream receives.
pub fn upstream_router(hits: Arc<AtomicUsize>) -> Router {
    Router::new()
        .route("/echo", any(echo))
        .route(
            "/cors",
            get(|| async {
                (
                    [
                        (header::ACCESS_CONTROL_ALLOW_ORIGIN, "https://evil.example"),
                        (header::ACCESS_CONTROL_ALLOW_METHODS, "GET"),
                        (header::HeaderName::from_static("x-custom-header"), "custom-value"),
                    ],
                    "test response",
                )
            }),
        )
        .route("/redirect-echo", any(|| async { redirect(StatusCode::FOUND, "/echo") }))
        .route("/see-other", any(|| async { redirect(StatusCode::SEE_OTHER, "/echo") }))
        .route(
            "/temporary",
            any(|| async { redirect(StatusCode::TEMPORARY_REDIRECT, "/echo") }),
        )
        .route(
            "/redirect-metadata",
            get(|| async {
                redirect(
                    StatusCode::FOUND,
                    &format!("http://{METADATA_IP}/latest/meta-data"),
                )
            }),
        )
        .route(
            "/redirect-named-metadata",
            get(|| async { redirect(StatusCode::FOUND, "http://metadata.test/latest/meta-data") }),
        )
        .route("/loop", get(|| async { redirect(StatusCode::FOUND, "/loop") }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                "late"
            }),
        )
        .route(
            "/teapot",
            get(|| async { (StatusCode::IM_A_TEAPOT, "short and stout") }),
        )
        .layer(axum::middleware::from_fn(
            move |request: axum::extract::Request, next: axum::middleware::Next| {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    next.run(request).await
                }
            },
        ))
}

/// Echo method, headers (lowercase `name: value` lines) and body.
async fn echo(method: Method, headers: HeaderMap, body: Bytes) -> String {
    let mut out = format!("{method}\n");
    for (name, value) in &headers {
        out.push_str(&format!("{}: {}\n", name, value.to_str().unwrap_or("<binary>")));
    }
    out.push('\n');
    out.push_str(&String::from_utf8_lossy(&body));
    out
}

fn redirect(status: StatusCode, location: &str) -> impl IntoResponse {
    (status, [(header::LOCATION, location.to_string())])
}

/// Policy used by the suite: loopback is allowed so mock upstreams are
/// reachable, while private and link-local ranges stay blocked.
pub fn test_policy(resolver: Arc<dyn Resolver>) -> NetworkPolicy {
    let ranges =
        DisallowedRanges::from_cidrs(["10.0.0.0/8", "169.254.0.0/16", "192.168.0.0/16"]).unwrap();
    NetworkPolicy::new(ranges).with_resolver(resolver)
}

/// Resolver with fixed names for the suite.
pub fn test_resolver() -> StaticResolver {
    StaticResolver::new()
        .with_host("upstream.test", vec!["127.0.0.1".parse().unwrap()])
        .with_host("metadata.test", vec![METADATA_IP.parse().unwrap()])
        .with_host("internal.test", vec!["10.0.0.5".parse().unwrap()])
}

/// Start a proxy on an ephemeral port.
pub async fn spawn_proxy(config: ProxyConfig, policy: NetworkPolicy) -> (SocketAddr, Shutdown) {
    let server = HttpServer::with_policy(config, policy).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });
    (addr, shutdown)
}

/// Start a proxy with the suite's policy and default configuration.
pub async fn spawn_default_proxy() -> (SocketAddr, Shutdown) {
    spawn_proxy(ProxyConfig::default(), test_policy(Arc::new(test_resolver()))).await
}

/// Client that never follows redirects and ignores environment proxies.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}

/// `http://proxy/?scalar_url=<target, percent-encoded>`.
pub fn proxy_url(proxy: SocketAddr, target: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
    format!("http://{proxy}/?scalar_url={encoded}")
}

/// Answers the first lookup of every name with `first` and all later
/// lookups with `then`, like a rebinding DNS server.
pub struct RebindingResolver {
    first: IpAddr,
    then: IpAddr,
    calls: AtomicUsize,
}

impl RebindingResolver {
    pub fn new(first: &str, then: &str) -> Self {
        Self {
            first: first.parse().unwrap(),
            then: then.parse().unwrap(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Resolver for RebindingResolver {
    fn lookup<'a>(&'a self, _host: &'a str) -> BoxFuture<'a, io::Result<Vec<IpAddr>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let ip = if call == 0 { self.first } else { self.then };
        Box::pin(async move { Ok(vec![ip]) })
    }
}
