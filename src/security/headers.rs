//! Header manipulation between client, proxy and upstream.
//!
//! # Responsibilities
//! - Build the outbound header set from the inbound request
//! - Remap the browser-settable cookie header onto `Cookie`
//! - Filter upstream response headers (CORS family, hop-by-hop)
//!
//! # Design Decisions
//! - `Origin` never reaches the upstream
//! - Framing headers are recomputed by the HTTP client, never copied
//! - The proxy's own CORS policy always replaces the upstream's

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

/// Request header browsers may set in place of `Cookie`.
pub const X_SCALAR_COOKIE: HeaderName = HeaderName::from_static("x-scalar-cookie");

/// Response header carrying the final URL after redirects.
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

const CORS_PREFIX: &str = "access-control-";

/// Connection-scoped headers that never cross the proxy.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Headers describing the inbound message framing rather than its content.
fn is_framing(name: &HeaderName) -> bool {
    *name == header::HOST || *name == header::CONTENT_LENGTH || is_hop_by_hop(name)
}

/// True for any `Access-Control-*` header (names are lowercase in `http`).
pub fn is_cors_header(name: &HeaderName) -> bool {
    name.as_str().starts_with(CORS_PREFIX)
}

/// Derive the headers sent upstream from the client's headers.
pub fn outbound_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut outbound = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        if *name == header::ORIGIN || is_framing(name) {
            continue;
        }
        outbound.append(name.clone(), value.clone());
    }

    let cookie = outbound
        .get(&X_SCALAR_COOKIE)
        .filter(|v| !v.is_empty())
        .cloned();
    if let Some(cookie) = cookie {
        outbound.insert(header::COOKIE, cookie);
        outbound.remove(&X_SCALAR_COOKIE);
    }

    outbound
}

/// Copy upstream response headers that the client should see.
pub fn copy_response_headers(upstream: &HeaderMap, into: &mut HeaderMap) {
    for (name, value) in upstream {
        if is_cors_header(name) || is_hop_by_hop(name) {
            continue;
        }
        into.append(name.clone(), value.clone());
    }
}

/// Build the `X-Forwarded-Host` value; `None` if the URL is not a valid header value.
pub fn forwarded_host_value(final_url: &url::Url) -> Option<HeaderValue> {
    HeaderValue::from_str(final_url.as_str()).ok()
}
