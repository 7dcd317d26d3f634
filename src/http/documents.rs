//! Locally served documents: the reference page and the OpenAPI document.

use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::error::ProxyError;

/// Serve the file at `path` with a fixed content type.
pub async fn serve(
    path: &str,
    content_type: &'static str,
    name: &'static str,
) -> Result<Response, ProxyError> {
    match tokio::fs::read(path).await {
        Ok(content) => Ok(([(header::CONTENT_TYPE, content_type)], content).into_response()),
        Err(e) => {
            tracing::error!(path = %path, error = %e, "Failed to read document");
            Err(ProxyError::DocumentUnavailable(name))
        }
    }
}
