//! Redirect following with destination re-validation.
//!
//! # Responsibilities
//! - Decide whether an upstream 3xx is followed and with which method
//! - Re-apply the destination policy to every hop before it is sent
//! - Bound the length of a redirect chain
//!
//! # Design Decisions
//! - 301/302/303 continue as `GET` (except `HEAD`) without a body
//! - 307/308 keep the method; a streamed body cannot be replayed, so such a
//!   redirect is handed back to the client as-is
//! - A 3xx without `Location` is an ordinary response

use std::sync::Arc;

use axum::http::{header, HeaderMap, Method, StatusCode};
use url::Url;

use crate::error::ProxyError;
use crate::observability::metrics;
use crate::policy::NetworkPolicy;

/// The request to send for the next hop of a redirect chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextHop {
    pub url: Url,
    pub method: Method,
}

/// Validates redirect hops against the destination policy.
#[derive(Debug, Clone)]
pub struct RedirectValidator {
    policy: Arc<NetworkPolicy>,
    max_redirects: usize,
}

impl RedirectValidator {
    pub fn new(policy: Arc<NetworkPolicy>, max_redirects: usize) -> Self {
        Self {
            policy,
            max_redirects,
        }
    }

    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    /// Work out the next hop for an upstream response, if it is a redirect
    /// the proxy follows.
    ///
    /// `body_sent` is true when the current hop carried a non-empty body.
    pub fn next_hop(
        &self,
        status: StatusCode,
        headers: &HeaderMap,
        current: &Url,
        method: &Method,
        body_sent: bool,
    ) -> Result<Option<NextHop>, ProxyError> {
        let method = match status {
            StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER => {
                if *method == Method::GET || *method == Method::HEAD {
                    method.clone()
                } else {
                    Method::GET
                }
            }
            StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT => {
                if body_sent {
                    tracing::debug!(status = %status, "Not following redirect: body cannot be replayed");
                    return Ok(None);
                }
                method.clone()
            }
            _ => return Ok(None),
        };

        let Some(location) = headers.get(header::LOCATION) else {
            return Ok(None);
        };
        let location = location.to_str().map_err(|e| {
            ProxyError::UpstreamConnection(format!("failed to parse Location header: {e}"))
        })?;
        let url = current.join(location).map_err(|e| {
            ProxyError::UpstreamConnection(format!(
                "failed to parse Location header {location:?}: {e}"
            ))
        })?;

        Ok(Some(NextHop { url, method }))
    }

    /// Check a hop before it is sent. `followed` counts hops already taken.
    pub async fn validate(&self, next: &Url, followed: usize) -> Result<(), ProxyError> {
        if followed >= self.max_redirects {
            return Err(ProxyError::TooManyRedirects(self.max_redirects));
        }

        let target = authority(next);
        if self.policy.is_blocked(&target).await {
            metrics::record_blocked("redirect");
            tracing::warn!(target = %target, "Redirect to blocked destination refused");
            return Err(ProxyError::RedirectBlocked(target));
        }
        Ok(())
    }
}

/// `host[:port]` of a URL, with IPv6 hosts bracketed.
pub fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}
