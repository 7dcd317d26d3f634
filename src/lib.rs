//! SSRF-hardened HTTP forwarding proxy.
//!
//! Browsers call `/?scalar_url=<url>`; the proxy forwards the request to
//! that URL and streams back the answer with permissive CORS headers, but
//! never to loopback, link-local, private or otherwise internal networks.
//! Destinations are checked up front, again at connection time, and on
//! every redirect hop.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod policy;
pub mod security;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use policy::NetworkPolicy;
