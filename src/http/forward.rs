//! Upstream forwarding.
//!
//! # Data Flow
//! ```text
//! ProxyRequest (method, headers, body, target URL)
//!     → headers::outbound_headers (Origin dropped, cookie remapped)
//!     → per hop: scheme check, literal-IP check, send
//!         (named hosts are resolved and checked by SafeDialer)
//!     → 3xx? RedirectValidator decides and re-validates the next hop
//!     → final response: filtered headers, X-Forwarded-Host, streamed body
//! ```
//!
//! # Design Decisions
//! - The client never follows redirects itself; every hop passes through
//!   this loop so the policy sees it
//! - No idle connections are pooled, so every hop dials through the
//!   dialer; a reused connection would skip the dial-time check
//! - Upstream TLS certificates are not verified
//! - Bodies are streamed both ways, never buffered
//! - The whole redirect chain shares one deadline that ends when the final
//!   response head arrives; streaming the body afterwards is unbounded

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, HttpBody},
    http::{HeaderMap, Method},
    response::Response,
};
use futures_util::TryStreamExt;
use url::Url;

use crate::config::ProxyConfig;
use crate::error::{error_chain, ProxyError};
use crate::http::redirect::RedirectValidator;
use crate::net::SafeDialer;
use crate::observability::metrics;
use crate::policy::NetworkPolicy;
use crate::security::headers::{self, X_FORWARDED_HOST};

/// One proxied request, owned by its handler for its whole lifetime.
pub struct ProxyRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Body,
    pub target: Url,
    pub request_id: String,
}

/// Sends proxied requests upstream and relays the responses.
#[derive(Debug, Clone)]
pub struct RequestForwarder {
    client: reqwest::Client,
    dialer: SafeDialer,
    redirects: RedirectValidator,
    request_timeout: Duration,
}

impl RequestForwarder {
    /// Build the upstream client. Unless the policy is bypassed, every
    /// name lookup the client makes goes through the dialer.
    pub fn new(policy: Arc<NetworkPolicy>, config: &ProxyConfig) -> Result<Self, reqwest::Error> {
        let dialer = SafeDialer::new(policy.clone());

        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .pool_max_idle_per_host(0)
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .danger_accept_invalid_certs(true);
        if !policy.is_bypassed() {
            builder = builder.dns_resolver(Arc::new(dialer.clone()));
        }

        Ok(Self {
            client: builder.build()?,
            dialer,
            redirects: RedirectValidator::new(policy, config.redirects.max_redirects),
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
        })
    }

    /// Forward `request`, following allowed redirects.
    ///
    /// Fails with [`ProxyError::UpstreamTimeout`] when no final response
    /// head arrives within the request timeout.
    pub async fn forward(&self, request: ProxyRequest) -> Result<Response, ProxyError> {
        tokio::time::timeout(self.request_timeout, self.follow(request))
            .await
            .map_err(|_| ProxyError::UpstreamTimeout(self.request_timeout.as_secs()))?
    }

    async fn follow(&self, request: ProxyRequest) -> Result<Response, ProxyError> {
        let ProxyRequest {
            mut method,
            headers,
            body,
            target,
            request_id,
        } = request;

        let outbound = headers::outbound_headers(&headers);
        let mut body_sent = !body.is_end_stream();
        let mut body = body_sent.then(|| reqwest::Body::wrap_stream(body.into_data_stream()));
        let mut url = target;
        let mut followed = 0;

        loop {
            let upstream = self
                .send_hop(&method, &url, &outbound, body.take())
                .await?;

            let status = upstream.status();
            let Some(hop) =
                self.redirects
                    .next_hop(status, upstream.headers(), &url, &method, body_sent)?
            else {
                tracing::info!(
                    request_id = %request_id,
                    method = %method,
                    target = %url,
                    status = status.as_u16(),
                    redirects = followed,
                    "Forwarded request"
                );
                return Ok(relay(upstream, request_id));
            };

            self.redirects.validate(&hop.url, followed).await?;
            drop(upstream);

            tracing::debug!(
                request_id = %request_id,
                from = %url,
                to = %hop.url,
                status = status.as_u16(),
                "Following redirect"
            );
            metrics::record_redirect();
            followed += 1;
            url = hop.url;
            method = hop.method;
            body_sent = false;
        }
    }

    async fn send_hop(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        body: Option<reqwest::Body>,
    ) -> Result<reqwest::Response, ProxyError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ProxyError::UnsupportedScheme(url.scheme().to_string()));
        }
        self.dialer
            .check_literal(url)
            .map_err(|e| ProxyError::upstream(&e))?;

        let mut builder = self
            .client
            .request(method.clone(), url.clone())
            .headers(headers.clone());
        if let Some(body) = body {
            builder = builder.body(body);
        }
        let request = builder
            .build()
            .map_err(|e| ProxyError::RequestConstruction(error_chain(&e)))?;

        self.client
            .execute(request)
            .await
            .map_err(|e| ProxyError::upstream(&e))
    }
}

/// Turn the final upstream response into the client response.
fn relay(upstream: reqwest::Response, request_id: String) -> Response {
    let status = upstream.status();
    let final_url = upstream.url().clone();

    let mut headers = HeaderMap::with_capacity(upstream.headers().len() + 1);
    headers::copy_response_headers(upstream.headers(), &mut headers);
    if let Some(value) = headers::forwarded_host_value(&final_url) {
        headers.insert(X_FORWARDED_HOST, value);
    }

    // Failures after the head was sent can only truncate the body.
    let stream = upstream.bytes_stream().inspect_err(move |e| {
        tracing::warn!(request_id = %request_id, target = %final_url, error = %e, "Upstream body stream failed");
    });

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
