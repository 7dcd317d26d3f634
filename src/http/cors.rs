//! Cross-origin policy applied to every response.
//!
//! Wraps all routes. Preflight `OPTIONS` requests are answered here and
//! never reach routing; every other response gets the header set overlaid
//! after the handler ran, so upstream values can never survive.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::CorsConfig;

const ALLOW_METHODS: &str = "POST, GET, OPTIONS, PUT, DELETE, PATCH";

/// The proxy's CORS header policy.
#[derive(Debug, Clone, Copy)]
pub struct CorsPolicy {
    echo_origin: bool,
}

impl CorsPolicy {
    pub fn new(echo_origin: bool) -> Self {
        Self { echo_origin }
    }

    pub fn from_config(config: &CorsConfig) -> Self {
        Self::new(config.echo_origin)
    }

    /// Overwrite the CORS header set on `headers`.
    pub fn apply(&self, origin: Option<&HeaderValue>, headers: &mut HeaderMap) {
        let wildcard = HeaderValue::from_static("*");
        let allow_origin = match origin {
            Some(origin) if self.echo_origin => {
                headers.append(header::VARY, HeaderValue::from_static("Origin"));
                origin.clone()
            }
            _ => wildcard.clone(),
        };

        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, wildcard.clone());
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, wildcard);
    }
}

/// CORS middleware. Short-circuits preflight requests with an empty `200`.
pub async fn cors_middleware(
    State(policy): State<CorsPolicy>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let origin = request.headers().get(header::ORIGIN).cloned();

    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(request).await
    };

    policy.apply(origin.as_ref(), response.headers_mut());
    response
}
