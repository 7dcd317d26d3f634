//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Destination policy settings.
    pub policy: PolicyConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Redirect following.
    pub redirects: RedirectConfig,

    /// Cross-origin response headers.
    pub cors: CorsConfig,

    /// Locally served documents.
    pub documents: DocumentConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:1337").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:1337".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Destination policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PolicyConfig {
    /// Disable all destination checks. Development only.
    pub bypass: bool,

    /// Ranges blocked in addition to the built-in set.
    pub extra_blocked_cidrs: Vec<String>,
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Name resolution and connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Upstream deadline in seconds: time until the final response head
    /// arrives, across all redirect hops.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            request_secs: 60,
        }
    }
}

/// Redirect configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedirectConfig {
    /// Maximum number of redirects followed per request.
    pub max_redirects: usize,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self { max_redirects: 10 }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Echo the request's `Origin` instead of `*` when one is present.
    pub echo_origin: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self { echo_origin: true }
    }
}

/// Static documents served by the proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// HTML reference page served on `/`.
    pub index_path: String,

    /// OpenAPI document served on `/openapi.yaml`.
    pub openapi_path: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            index_path: "public/index.html".to_string(),
            openapi_path: "public/openapi.yaml".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter used when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Metrics listener address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "scalar_proxy=info,tower_http=info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

impl ProxyConfig {
    /// Apply `PORT` and `ENV` from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// `PORT` replaces the listen port on all interfaces; `ENV=dev` enables
    /// bypass mode. Any other `ENV` value leaves enforcement on.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT").filter(|p| !p.is_empty()) {
            self.listener.bind_address = format!("0.0.0.0:{port}");
        }
        if lookup("ENV").as_deref() == Some("dev") {
            self.policy.bypass = true;
        }
    }
}
