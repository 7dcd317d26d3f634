//! Client-visible failure taxonomy.
//!
//! Every error is decided locally and mapped to a status code here; the
//! body is always plain text.

use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Instructional text returned when the target query parameter is missing.
pub const MISSING_TARGET_MESSAGE: &str = "The `scalar_url` query parameter is required. Try to add `?scalar_url=https%3A%2F%2Fgalaxy.scalar.com%2Fplanets` to the URL.";

/// Text returned when the target is in a disallowed network location.
pub const BLOCKED_DESTINATION_MESSAGE: &str =
    "Forbidden: access to private addresses is not allowed";

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("{}", MISSING_TARGET_MESSAGE)]
    MissingTarget,

    #[error("{0}")]
    InvalidTargetUrl(#[from] url::ParseError),

    #[error("{}", BLOCKED_DESTINATION_MESSAGE)]
    BlockedDestination,

    #[error("{0}")]
    RequestConstruction(String),

    #[error("unsupported protocol scheme \"{0}\"")]
    UnsupportedScheme(String),

    #[error("{0}")]
    UpstreamConnection(String),

    #[error("upstream did not respond within {0}s")]
    UpstreamTimeout(u64),

    #[error("redirect to blocked host: {0}")]
    RedirectBlocked(String),

    #[error("stopped after {0} redirects")]
    TooManyRedirects(usize),

    #[error("Error reading {0}")]
    DocumentUnavailable(&'static str),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingTarget => StatusCode::BAD_REQUEST,
            ProxyError::BlockedDestination => StatusCode::FORBIDDEN,
            ProxyError::RequestConstruction(_) | ProxyError::DocumentUnavailable(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProxyError::InvalidTargetUrl(_)
            | ProxyError::UnsupportedScheme(_)
            | ProxyError::UpstreamConnection(_)
            | ProxyError::UpstreamTimeout(_)
            | ProxyError::RedirectBlocked(_)
            | ProxyError::TooManyRedirects(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Wrap an upstream failure, keeping the whole source chain in the text.
    pub fn upstream(err: &(dyn StdError + 'static)) -> Self {
        ProxyError::UpstreamConnection(error_chain(err))
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Render an error and all of its sources as `outer: inner: root`.
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        // transparent wrappers repeat their inner message
        if !text.ends_with(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}
